use crate::error::PagemarkError;
use crate::extraction::PageRenderer;
use crate::model::PageInfo;
use std::path::Path;
use std::process::Command;

const TOOL: &str = "pdftoppm";

/// Page rendering backend using pdftoppm (from poppler-utils).
///
/// Renders JPEGs scaled to the page's extent in PDF points, so that boxes in
/// token space can be drawn on the image without conversion.
pub struct PdftoppmRenderer;

impl PdftoppmRenderer {
    pub fn new() -> Self {
        PdftoppmRenderer
    }

    pub fn is_available() -> bool {
        Command::new(TOOL)
            .arg("-v")
            .output()
            .map(|o| o.status.success() || !o.stderr.is_empty())
            .unwrap_or(false)
    }

    /// Fail with `PopplerNotFound` unless pdftoppm can be run.
    pub fn require() -> Result<(), PagemarkError> {
        super::require_tool(TOOL, Self::is_available())
    }
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render_page(
        &self,
        pdf_path: &Path,
        page: &PageInfo,
        output: &Path,
    ) -> Result<(), PagemarkError> {
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        // Render into a scratch directory next to the target and move the
        // result into place, so an interrupted render never leaves a partial
        // image behind.
        let scratch = tempfile::Builder::new()
            .prefix(".render-")
            .tempdir_in(parent)?;
        let prefix = scratch.path().join("page");

        let page_number = (page.index + 1).to_string();
        let width = (page.width.round() as u64).max(1).to_string();
        let height = (page.height.round() as u64).max(1).to_string();

        let result = Command::new(TOOL)
            .arg("-jpeg")
            .arg("-singlefile")
            .args(["-f", &page_number, "-l", &page_number])
            .args(["-scale-to-x", &width, "-scale-to-y", &height])
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PagemarkError::PopplerNotFound { tool: TOOL }
                } else {
                    PagemarkError::Extraction(format!("pdftoppm failed: {}", e))
                }
            })?;

        if !result.status.success() {
            let code = result.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&result.stderr).to_string();
            return Err(PagemarkError::PopplerFailed {
                tool: TOOL,
                code,
                stderr,
            });
        }

        std::fs::rename(prefix.with_extension("jpg"), output)?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        TOOL
    }
}
