//! Object-detection (COCO-style) dataset assembly.

use crate::config::schema::CategorySet;
use crate::consolidate::{ConsolidatedAnnotation, PageRegion};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::PagemarkError;
use crate::export::ids::IdAllocator;
use crate::export::PaperSource;
use crate::extraction::PageRenderer;
use crate::model::{find_page, PageInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const SUPERCATEGORY: &str = "layout";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: usize,
    pub name: String,
    pub supercategory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoPaper {
    pub id: usize,
    pub paper_sha: String,
    /// Number of pages in the paper.
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: usize,
    pub file_name: String,
    pub height: f64,
    pub width: f64,
    pub paper_id: usize,
    pub page_number: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub id: usize,
    /// `[x, y, width, height]`.
    pub bbox: [f64; 4],
    pub category_id: usize,
    pub image_id: usize,
    pub area: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CocoDataset {
    pub categories: Vec<CocoCategory>,
    pub papers: Vec<CocoPaper>,
    pub images: Vec<CocoImage>,
    pub annotations: Vec<CocoAnnotation>,
}

/// File name of the rendered image of a page.
pub fn image_file_name(paper_sha: &str, page_index: usize) -> String {
    format!("{paper_sha}_{page_index}.jpg")
}

impl CocoDataset {
    /// An empty dataset listing `categories` in order.
    pub fn with_categories(categories: &CategorySet) -> Self {
        CocoDataset {
            categories: categories
                .labels()
                .iter()
                .enumerate()
                .map(|(id, label)| CocoCategory {
                    id,
                    name: label.text.clone(),
                    supercategory: SUPERCATEGORY.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Append a dataset built by an independent builder.
    ///
    /// Papers and images already present (same sha / file name) are reused;
    /// everything else is renumbered to continue this dataset's ids.
    pub fn merge(&mut self, other: CocoDataset) -> Result<(), PagemarkError> {
        if self.categories != other.categories {
            return Err(PagemarkError::ConfigInvalid(
                "cannot merge datasets built with different categories".into(),
            ));
        }

        let mut paper_ids = HashMap::new();
        for paper in other.papers {
            let id = match self.papers.iter().find(|p| p.paper_sha == paper.paper_sha) {
                Some(existing) => existing.id,
                None => {
                    let id = self.papers.len();
                    self.papers.push(CocoPaper { id, ..paper.clone() });
                    id
                }
            };
            paper_ids.insert(paper.id, id);
        }

        let mut image_ids = HashMap::new();
        for image in other.images {
            let id = match self.images.iter().find(|i| i.file_name == image.file_name) {
                Some(existing) => existing.id,
                None => {
                    let id = self.images.len();
                    let paper_id = paper_ids.get(&image.paper_id).copied().ok_or_else(|| {
                        PagemarkError::ConfigInvalid(format!(
                            "image '{}' references unknown paper {}",
                            image.file_name, image.paper_id
                        ))
                    })?;
                    self.images.push(CocoImage {
                        id,
                        paper_id,
                        ..image.clone()
                    });
                    id
                }
            };
            image_ids.insert(image.id, id);
        }

        for annotation in other.annotations {
            let image_id = image_ids.get(&annotation.image_id).copied().ok_or_else(|| {
                PagemarkError::ConfigInvalid(format!(
                    "annotation {} references unknown image {}",
                    annotation.id, annotation.image_id
                ))
            })?;
            self.annotations.push(CocoAnnotation {
                id: self.annotations.len(),
                image_id,
                ..annotation
            });
        }

        Ok(())
    }
}

/// Accumulates one annotator's dataset across papers.
pub struct CocoBuilder<'a> {
    categories: CategorySet,
    dataset: CocoDataset,
    ids: IdAllocator,
    images_by_name: HashMap<String, usize>,
    image_dir: Option<PathBuf>,
    renderer: Option<&'a dyn PageRenderer>,
    diagnostics: Diagnostics,
}

impl<'a> CocoBuilder<'a> {
    pub fn new(categories: CategorySet) -> Self {
        let dataset = CocoDataset::with_categories(&categories);
        Self::resume(categories, dataset)
    }

    /// Continue building on top of an existing dataset; new ids follow the
    /// ones already used.
    pub fn resume(categories: CategorySet, dataset: CocoDataset) -> Self {
        let images_by_name = dataset
            .images
            .iter()
            .map(|i| (i.file_name.clone(), i.id))
            .collect();
        CocoBuilder {
            categories,
            ids: IdAllocator::seeded_from(&dataset),
            dataset,
            images_by_name,
            image_dir: None,
            renderer: None,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Render page images into `dir` for every page that receives an
    /// annotation. Images already on disk are not rendered again.
    pub fn with_images(mut self, dir: impl Into<PathBuf>, renderer: &'a dyn PageRenderer) -> Self {
        self.image_dir = Some(dir.into());
        self.renderer = Some(renderer);
        self
    }

    /// Add one paper and its consolidated annotations.
    ///
    /// A paper whose sha is already in the dataset keeps its id and record;
    /// only the new images and annotations are appended.
    ///
    /// Either the whole paper is added or, on error, nothing is: ids,
    /// records and diagnostics are only committed once every image has been
    /// materialized.
    pub fn add_paper(
        &mut self,
        paper: &PaperSource<'_>,
        annotations: &[ConsolidatedAnnotation],
    ) -> Result<usize, PagemarkError> {
        let mut ids = self.ids;
        let mut diagnostics = Diagnostics::new();
        let mut new_images: Vec<CocoImage> = Vec::new();
        let mut new_annotations = Vec::new();
        let mut pending: HashMap<String, usize> = HashMap::new();

        let existing_paper = self
            .dataset
            .papers
            .iter()
            .find(|p| p.paper_sha == paper.sha)
            .map(|p| p.id);
        let paper_id = match existing_paper {
            Some(id) => id,
            None => ids.paper(),
        };

        for annotation in annotations {
            let Some(category_id) = self.categories.id_of(&annotation.label.text) else {
                diagnostics.push(
                    DiagnosticKind::UnknownCategory,
                    format!(
                        "annotation {} has label '{}', not exported",
                        annotation.id, annotation.label.text
                    ),
                );
                continue;
            };

            let anchor = [PageRegion {
                page: annotation.page,
                bounds: annotation.bounds,
            }];
            let regions: &[PageRegion] = if annotation.regions.is_empty() {
                &anchor
            } else {
                &annotation.regions
            };

            // A group spanning pages yields one box per page.
            for region in regions {
                let Some(page) = find_page(paper.structure, region.page) else {
                    diagnostics.push(
                        DiagnosticKind::MissingReference,
                        format!(
                            "annotation {} is on page {}, which has no token data",
                            annotation.id, region.page
                        ),
                    );
                    continue;
                };

                let file_name = image_file_name(paper.sha, region.page);
                let image_id = match self
                    .images_by_name
                    .get(&file_name)
                    .or_else(|| pending.get(&file_name))
                {
                    Some(&id) => id,
                    None => {
                        let id = ids.image();
                        pending.insert(file_name.clone(), id);
                        new_images.push(image_record(id, file_name, &page.page, paper_id));
                        id
                    }
                };

                let b = &region.bounds;
                let (width, height) = (b.right - b.left, b.bottom - b.top);
                new_annotations.push(CocoAnnotation {
                    id: ids.annotation(),
                    bbox: [b.left, b.top, width, height],
                    category_id,
                    image_id,
                    area: width * height,
                });
            }
        }

        self.materialize_images(paper, &new_images)?;

        if existing_paper.is_none() {
            self.dataset.papers.push(CocoPaper {
                id: paper_id,
                paper_sha: paper.sha.to_string(),
                pages: paper.structure.len(),
            });
        }
        self.images_by_name.extend(pending);
        self.dataset.images.extend(new_images);
        self.dataset.annotations.extend(new_annotations);
        self.diagnostics.absorb(diagnostics, Some(paper.sha), None);
        self.ids = ids;

        tracing::debug!(paper = paper.sha, paper_id, "paper added to dataset");
        Ok(paper_id)
    }

    fn materialize_images(
        &self,
        paper: &PaperSource<'_>,
        images: &[CocoImage],
    ) -> Result<(), PagemarkError> {
        let (Some(dir), Some(renderer)) = (&self.image_dir, self.renderer) else {
            return Ok(());
        };

        std::fs::create_dir_all(dir)?;
        for image in images {
            let target = dir.join(&image.file_name);
            if target.exists() {
                continue;
            }
            let page = find_page(paper.structure, image.page_number)
                .map(|p| p.page)
                .ok_or_else(|| PagemarkError::MissingReference {
                    annotation_id: image.file_name.clone(),
                    page_index: image.page_number,
                    token_index: None,
                })?;
            render_to(renderer, paper.pdf_path, &page, &target)?;
        }
        Ok(())
    }

    pub fn dataset(&self) -> &CocoDataset {
        &self.dataset
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn finish(self) -> (CocoDataset, Diagnostics) {
        (self.dataset, self.diagnostics)
    }
}

fn image_record(id: usize, file_name: String, page: &PageInfo, paper_id: usize) -> CocoImage {
    CocoImage {
        id,
        file_name,
        height: page.height,
        width: page.width,
        paper_id,
        page_number: page.index,
    }
}

fn render_to(
    renderer: &dyn PageRenderer,
    pdf_path: &Path,
    page: &PageInfo,
    target: &Path,
) -> Result<(), PagemarkError> {
    tracing::debug!(
        backend = renderer.backend_name(),
        target = %target.display(),
        "rendering page image"
    );
    renderer.render_page(pdf_path, page, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Label;

    fn categories() -> CategorySet {
        CategorySet::new(vec![Label::new("Title", "#1"), Label::new("Figure", "#2")])
    }

    fn dataset_with_one_image(sha: &str) -> CocoDataset {
        let mut d = CocoDataset::with_categories(&categories());
        d.papers.push(CocoPaper {
            id: 0,
            paper_sha: sha.into(),
            pages: 1,
        });
        d.images.push(CocoImage {
            id: 0,
            file_name: image_file_name(sha, 0),
            height: 10.0,
            width: 10.0,
            paper_id: 0,
            page_number: 0,
        });
        d.annotations.push(CocoAnnotation {
            id: 0,
            bbox: [0.0, 0.0, 1.0, 1.0],
            category_id: 1,
            image_id: 0,
            area: 1.0,
        });
        d
    }

    #[test]
    fn test_categories_follow_configuration() {
        let d = CocoDataset::with_categories(&categories());
        assert_eq!(d.categories.len(), 2);
        assert_eq!(d.categories[1].id, 1);
        assert_eq!(d.categories[1].name, "Figure");
        assert_eq!(d.categories[1].supercategory, SUPERCATEGORY);
    }

    #[test]
    fn test_merge_renumbers_ids() {
        let mut a = dataset_with_one_image("aaa");
        let b = dataset_with_one_image("bbb");
        a.merge(b).unwrap();

        assert_eq!(a.papers.len(), 2);
        assert_eq!(a.papers[1].id, 1);
        assert_eq!(a.images[1].id, 1);
        assert_eq!(a.images[1].paper_id, 1);
        assert_eq!(a.annotations[1].id, 1);
        assert_eq!(a.annotations[1].image_id, 1);
    }

    #[test]
    fn test_merge_reuses_shared_images() {
        let mut a = dataset_with_one_image("aaa");
        let b = dataset_with_one_image("aaa");
        a.merge(b).unwrap();

        assert_eq!(a.papers.len(), 1);
        assert_eq!(a.images.len(), 1);
        assert_eq!(a.annotations.len(), 2);
        assert_eq!(a.annotations[1].image_id, 0);
    }

    #[test]
    fn test_merge_rejects_other_categories() {
        let mut a = dataset_with_one_image("aaa");
        let b = CocoDataset::default();
        assert!(a.merge(b).is_err());
    }

    fn two_pages() -> Vec<crate::model::TokenPage> {
        (0..2)
            .map(|index| crate::model::Page {
                page: PageInfo {
                    width: 100.0,
                    height: 200.0,
                    index,
                },
                tokens: Vec::new(),
            })
            .collect()
    }

    fn bounds(left: f64, top: f64, right: f64, bottom: f64) -> crate::geometry::Bounds {
        crate::geometry::Bounds {
            left,
            top,
            right,
            bottom,
        }
    }

    fn consolidated(page: usize, regions: Vec<PageRegion>) -> ConsolidatedAnnotation {
        ConsolidatedAnnotation {
            id: 0,
            underlying_ids: vec!["a".into()],
            page,
            label: Label::new("Title", "#1"),
            bounds: regions
                .iter()
                .find(|r| r.page == page)
                .map(|r| r.bounds)
                .unwrap_or_default(),
            regions,
            text: String::new(),
            tokens: Vec::new(),
            positions: Vec::new(),
        }
    }

    #[test]
    fn test_group_spanning_pages_gets_a_box_per_page() {
        let structure = two_pages();
        let paper = PaperSource {
            sha: "abc",
            pdf_path: Path::new("abc.pdf"),
            structure: &structure,
        };
        let annotation = consolidated(
            0,
            vec![
                PageRegion {
                    page: 0,
                    bounds: bounds(10.0, 150.0, 90.0, 190.0),
                },
                PageRegion {
                    page: 1,
                    bounds: bounds(10.0, 10.0, 90.0, 40.0),
                },
            ],
        );

        let mut builder = CocoBuilder::new(categories());
        builder.add_paper(&paper, &[annotation]).unwrap();
        let (dataset, diagnostics) = builder.finish();

        assert!(diagnostics.is_empty());
        assert_eq!(dataset.images.len(), 2);
        assert_eq!(dataset.annotations.len(), 2);
        assert_eq!(dataset.images[1].page_number, 1);
        assert_eq!(dataset.annotations[1].image_id, dataset.images[1].id);
        assert_eq!(dataset.annotations[1].bbox, [10.0, 10.0, 80.0, 30.0]);
    }

    #[test]
    fn test_annotation_without_regions_uses_its_page() {
        let structure = two_pages();
        let paper = PaperSource {
            sha: "abc",
            pdf_path: Path::new("abc.pdf"),
            structure: &structure,
        };
        let mut annotation = consolidated(1, Vec::new());
        annotation.bounds = bounds(0.0, 0.0, 5.0, 5.0);

        let mut builder = CocoBuilder::new(categories());
        builder.add_paper(&paper, &[annotation]).unwrap();
        let dataset = builder.dataset();

        assert_eq!(dataset.images.len(), 1);
        assert_eq!(dataset.images[0].page_number, 1);
        assert_eq!(dataset.annotations[0].area, 25.0);
    }

    #[test]
    fn test_resumed_paper_keeps_one_record() {
        let structure = two_pages();
        let paper = PaperSource {
            sha: "aaa",
            pdf_path: Path::new("aaa.pdf"),
            structure: &structure,
        };
        let annotation = consolidated(
            1,
            vec![PageRegion {
                page: 1,
                bounds: bounds(0.0, 0.0, 1.0, 1.0),
            }],
        );

        let mut builder = CocoBuilder::resume(categories(), dataset_with_one_image("aaa"));
        let paper_id = builder.add_paper(&paper, &[annotation]).unwrap();
        let dataset = builder.dataset();

        assert_eq!(paper_id, 0);
        assert_eq!(dataset.papers.len(), 1);
        assert_eq!(dataset.images.len(), 2);
        assert_eq!(dataset.images[1].paper_id, 0);
        assert_eq!(dataset.annotations.len(), 2);
    }

    #[test]
    fn test_image_file_name() {
        assert_eq!(image_file_name("abc", 3), "abc_3.jpg");
    }
}
