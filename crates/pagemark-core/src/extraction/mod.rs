pub mod pdftoppm;
pub mod pdftotext;

use crate::error::PagemarkError;
use crate::geometry::Bounds;
use crate::model::{PageInfo, Token};
use std::path::Path;

/// Trait for backends that read the words inside a region of a PDF page.
///
/// Used to give free-form annotations (drawn boxes with no token list) their
/// text.
pub trait WordExtractor: Send + Sync {
    /// Words on page `page_index` (zero-based) whose boxes overlap `bounds`,
    /// in PDF points.
    fn extract_words(
        &self,
        pdf_path: &Path,
        page_index: usize,
        bounds: &Bounds,
    ) -> Result<Vec<Token>, PagemarkError>;

    /// Name of this extraction backend (for diagnostics).
    fn backend_name(&self) -> &str;
}

/// Trait for backends that rasterize a PDF page to an image file.
pub trait PageRenderer: Send + Sync {
    /// Render `page` of the PDF to `output`, sized `page.width` x
    /// `page.height` pixels.
    fn render_page(&self, pdf_path: &Path, page: &PageInfo, output: &Path)
        -> Result<(), PagemarkError>;

    /// Name of this rendering backend (for diagnostics).
    fn backend_name(&self) -> &str;
}

fn require_tool(tool: &'static str, available: bool) -> Result<(), PagemarkError> {
    if available {
        Ok(())
    } else {
        Err(PagemarkError::PopplerNotFound { tool })
    }
}
