use crate::error::PagemarkError;
use crate::geometry::{BBox, ScaleFactor, SoftMargin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Anything placed on a page by a rectangle.
pub trait Positioned {
    fn bbox(&self) -> &BBox;
    fn bbox_mut(&mut self) -> &mut BBox;
}

/// One extracted word on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    #[serde(flatten)]
    pub bbox: BBox,
}

impl Token {
    pub fn new(text: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Token {
            text: text.into(),
            bbox: BBox::new(x, y, width, height),
        }
    }
}

impl Positioned for Token {
    fn bbox(&self) -> &BBox {
        &self.bbox
    }

    fn bbox_mut(&mut self) -> &mut BBox {
        &mut self.bbox
    }
}

/// A labeled region, predicted by a layout model or drawn by an annotator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub label: String,
    #[serde(flatten)]
    pub bbox: BBox,
}

impl Block {
    pub fn new(label: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Block {
            label: label.into(),
            bbox: BBox::new(x, y, width, height),
        }
    }
}

impl Positioned for Block {
    fn bbox(&self) -> &BBox {
        &self.bbox
    }

    fn bbox_mut(&mut self) -> &mut BBox {
        &mut self.bbox
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub width: f64,
    pub height: f64,
    pub index: usize,
}

/// One page and the items laid out on it, all in the same coordinate space
/// as `page.width` / `page.height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub page: PageInfo,
    pub tokens: Vec<T>,
}

/// A page of extracted words, as stored in `pdf_structure.json`.
pub type TokenPage = Page<Token>;

/// A page of predicted regions, in the predicting model's resolution.
pub type BlockPage = Page<Block>;

impl<T: Positioned> Page<T> {
    /// Scale the page extent and every item on it.
    ///
    /// The factor is validated before anything is touched, so a rejected
    /// factor leaves the page as it was.
    pub fn scale(&mut self, factor: impl Into<ScaleFactor>) -> Result<(), PagemarkError> {
        let factor = factor.into().validate()?;

        self.page.width *= factor.x;
        self.page.height *= factor.y;
        for token in &mut self.tokens {
            token.bbox_mut().scale(factor)?;
        }
        Ok(())
    }

    /// Rescale this page into the coordinate space of `reference`.
    pub fn scale_like<U>(&mut self, reference: &Page<U>) -> Result<(), PagemarkError> {
        let scale_x = reference.page.width / self.page.width;
        let scale_y = reference.page.height / self.page.height;
        self.scale((scale_x, scale_y))
    }

    /// Items whose center falls inside `region` grown by `soft_margin`,
    /// keyed by their position in the page's item list.
    pub fn filter_tokens_by(&self, region: &BBox, soft_margin: &SoftMargin) -> BTreeMap<usize, &T> {
        self.tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| token.bbox().is_in(region, soft_margin))
            .collect()
    }

    pub fn token(&self, index: usize) -> Option<&T> {
        self.tokens.get(index)
    }
}

/// Locate the page whose `page.index` equals `index`.
pub fn find_page<T>(pages: &[Page<T>], index: usize) -> Option<&Page<T>> {
    pages.iter().find(|p| p.page.index == index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> TokenPage {
        Page {
            page: PageInfo {
                width: 100.0,
                height: 200.0,
                index: 0,
            },
            tokens: vec![
                Token::new("Fig.", 0.0, 0.0, 20.0, 10.0),
                Token::new("1", 22.0, 0.0, 10.0, 10.0),
                Token::new("body", 0.0, 100.0, 30.0, 10.0),
            ],
        }
    }

    #[test]
    fn test_token_json_shape() {
        let json = r#"{"text": "Fig.", "x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0}"#;
        let token: Token = serde_json::from_str(json).unwrap();
        assert_eq!(token, Token::new("Fig.", 1.0, 2.0, 3.0, 4.0));

        let back = serde_json::to_value(&token).unwrap();
        assert_eq!(back["width"], 3.0);
        assert_eq!(back["text"], "Fig.");
    }

    #[test]
    fn test_scale_propagates_to_tokens() {
        let mut page = sample_page();
        page.scale((2.0, 0.5)).unwrap();
        assert_eq!(page.page.width, 200.0);
        assert_eq!(page.page.height, 100.0);
        assert_eq!(page.tokens[1].bbox, BBox::new(44.0, 0.0, 20.0, 5.0));
    }

    #[test]
    fn test_invalid_scale_leaves_page_untouched() {
        let mut page = sample_page();
        let before = page.clone();
        assert!(page.scale((0.0, 1.0)).is_err());
        assert!(page.scale(f64::NAN).is_err());
        assert_eq!(page, before);
    }

    #[test]
    fn test_scale_like() {
        let mut predicted: BlockPage = Page {
            page: PageInfo {
                width: 200.0,
                height: 400.0,
                index: 0,
            },
            tokens: vec![Block::new("Title", 20.0, 40.0, 100.0, 20.0)],
        };
        predicted.scale_like(&sample_page()).unwrap();
        assert_eq!(predicted.page.width, 100.0);
        assert_eq!(predicted.page.height, 200.0);
        assert_eq!(predicted.tokens[0].bbox, BBox::new(10.0, 20.0, 50.0, 10.0));
    }

    #[test]
    fn test_filter_tokens_by_keeps_list_order() {
        let page = sample_page();
        let region = BBox::new(0.0, 0.0, 40.0, 12.0);
        let found = page.filter_tokens_by(&region, &SoftMargin::default());
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(found[&1].text, "1");
    }

    #[test]
    fn test_filter_tokens_by_no_match_is_empty() {
        let page = sample_page();
        let region = BBox::new(60.0, 60.0, 10.0, 10.0);
        assert!(page
            .filter_tokens_by(&region, &SoftMargin::uniform(3.0))
            .is_empty());
    }

    #[test]
    fn test_find_page_by_index() {
        let mut second = sample_page();
        second.page.index = 3;
        let pages = vec![sample_page(), second];
        assert_eq!(find_page(&pages, 3).unwrap().page.index, 3);
        assert!(find_page(&pages, 1).is_none());
    }
}
