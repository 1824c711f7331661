pub mod coco;
pub mod ids;
pub mod token_table;

use crate::model::TokenPage;
use std::path::Path;

/// One paper as seen by the exporters.
#[derive(Debug, Clone, Copy)]
pub struct PaperSource<'a> {
    pub sha: &'a str,
    pub pdf_path: &'a Path,
    pub structure: &'a [TokenPage],
}
