//! Mapping model region predictions onto the token layout of a page.
//!
//! Predictions arrive in the resolution of the image the model saw; tokens
//! are in PDF points. A predicted page is first rescaled to its token page,
//! then every block is replaced by the tight union of the tokens it holds.

use crate::annotation::{AnnotationFile, Region, TokenId};
use crate::config::schema::{CategorySet, ResolverConfig};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::PagemarkError;
use crate::geometry::{BBox, Bounds};
use crate::model::{find_page, Block, BlockPage, Page, PageInfo, TokenPage};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// A predicted block after rectification against the token layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBlock {
    pub bounds: Bounds,
    /// Indices of the contained tokens, ascending. Empty when the block
    /// holds no tokens and its own box was kept.
    pub token_indices: Vec<usize>,
}

/// Rectify one block that is already in the token page's resolution.
pub fn resolve_block(
    block: &Block,
    page: &TokenPage,
    config: &ResolverConfig,
) -> Result<ResolvedBlock, PagemarkError> {
    let contained = page.filter_tokens_by(&block.bbox, &config.search_margin);

    let rectified = if contained.is_empty() {
        // Regions without a text layer (figures, scanned art) keep the
        // predicted box.
        block.bbox
    } else {
        BBox::union_of(contained.values().map(|t| t.bbox))?
    };

    Ok(ResolvedBlock {
        bounds: rectified.padded(&config.rectify_margin).as_bounds(),
        token_indices: contained.keys().copied().collect(),
    })
}

/// Token indices of `page` whose centers fall inside `bounds` grown by the
/// search margin.
pub fn search_tokens(bounds: &Bounds, page: &TokenPage, config: &ResolverConfig) -> Vec<usize> {
    page.filter_tokens_by(&BBox::from_bounds(bounds), &config.search_margin)
        .into_keys()
        .collect()
}

/// Outcome of preannotating one document.
#[derive(Debug, Clone, Default)]
pub struct Preannotation {
    pub file: AnnotationFile,
    pub diagnostics: Diagnostics,
}

/// Turn a document's predicted pages into token-aligned annotations.
///
/// Pages with no counterpart in `structure` are skipped with a
/// `MissingReference` diagnostic; blocks whose label is not a configured
/// category are skipped with an `UnknownCategory` diagnostic.
pub fn preannotate_document(
    predictions: Vec<BlockPage>,
    structure: &[TokenPage],
    categories: &CategorySet,
    config: &ResolverConfig,
) -> Result<Preannotation, PagemarkError> {
    let mut out = Preannotation::default();

    for mut predicted in predictions {
        let page_index = predicted.page.index;
        let Some(token_page) = find_page(structure, page_index) else {
            out.diagnostics.push(
                DiagnosticKind::MissingReference,
                format!("no token data for predicted page {page_index}, page skipped"),
            );
            continue;
        };

        predicted.scale_like(token_page)?;

        for (block_idx, block) in predicted.tokens.iter().enumerate() {
            let Some(label) = categories.get(&block.label) else {
                out.diagnostics.push(
                    DiagnosticKind::UnknownCategory,
                    format!(
                        "block {block_idx} on page {page_index} has label '{}', block skipped",
                        block.label
                    ),
                );
                continue;
            };

            let resolved = resolve_block(block, token_page, config)?;
            let region = if resolved.token_indices.is_empty() {
                Region::FreeForm
            } else {
                Region::TokenAligned(
                    resolved
                        .token_indices
                        .iter()
                        .map(|&i| TokenId::new(page_index, i))
                        .collect(),
                )
            };

            out.file
                .add_annotation(page_index, label.clone(), resolved.bounds, region);
        }
    }

    tracing::info!(
        annotations = out.file.annotations.len(),
        skipped = out.diagnostics.len(),
        "preannotation finished"
    );
    Ok(out)
}

/// One predicted page as written by a layout model:
/// `{"page": {...}, "blocks": [[x, y, w, h, "label"], ...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PagePrediction {
    pub page: PageInfo,
    pub blocks: Vec<(f64, f64, f64, f64, String)>,
}

impl From<PagePrediction> for BlockPage {
    fn from(pred: PagePrediction) -> Self {
        Page {
            page: pred.page,
            tokens: pred
                .blocks
                .into_iter()
                .map(|(x, y, w, h, label)| Block::new(label, x, y, w, h))
                .collect(),
        }
    }
}

/// Layout predictions for a set of PDFs, keyed by PDF file name.
#[derive(Debug, Clone, Default)]
pub struct ModelPredictions {
    pub pdfs: BTreeMap<String, Vec<PagePrediction>>,
}

impl ModelPredictions {
    /// Load predictions from either a single JSON file keyed by PDF name, or
    /// a directory of `<pdf-stem>.json` files holding one document each.
    pub fn load(path: &Path) -> Result<Self, PagemarkError> {
        if path.is_dir() {
            Self::load_directory(path)
        } else {
            let content = std::fs::read_to_string(path)?;
            Ok(ModelPredictions {
                pdfs: serde_json::from_str(&content)?,
            })
        }
    }

    fn load_directory(dir: &Path) -> Result<Self, PagemarkError> {
        let mut pdfs = BTreeMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_json = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if !is_json {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            pdfs.insert(format!("{stem}.pdf"), serde_json::from_str(&content)?);
        }
        Ok(ModelPredictions { pdfs })
    }

    /// Predicted pages of one PDF, as block pages.
    pub fn pages(&self, pdf_name: &str) -> Option<Vec<BlockPage>> {
        self.pdfs
            .get(pdf_name)
            .map(|preds| preds.iter().cloned().map(BlockPage::from).collect())
    }
}
