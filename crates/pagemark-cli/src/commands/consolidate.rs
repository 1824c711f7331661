use pagemark_core::consolidate::{consolidate_file, FreeFormStrategy};
use pagemark_core::error::PagemarkError;
use pagemark_core::extraction::pdftotext::PdftotextWordExtractor;
use pagemark_core::geometry::SoftMargin;
use pagemark_core::project::ProjectFolder;
use std::path::Path;

use crate::output;

pub fn run(
    root: &Path,
    sha: &str,
    annotator: &str,
    extract: bool,
    margin: f64,
) -> Result<(), PagemarkError> {
    if extract {
        PdftotextWordExtractor::require()?;
    }

    let folder = ProjectFolder::new(root);
    let structure = folder.load_structure(sha)?;
    let file = folder.load_annotations(sha, annotator)?.ok_or_else(|| {
        PagemarkError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!(
                "{annotator} has no annotations for {sha} ({})",
                folder.annotations_path(sha, annotator).display()
            ),
        ))
    })?;

    let extractor = PdftotextWordExtractor::new();
    let pdf_path = folder.pdf_path(sha);
    let strategy = if extract {
        FreeFormStrategy::Extract {
            extractor: &extractor,
            pdf_path: &pdf_path,
        }
    } else {
        FreeFormStrategy::Search(SoftMargin::uniform(margin))
    };

    let consolidation = consolidate_file(&file, &structure, &strategy)?;
    output::json::print(&consolidation.annotations)?;
    output::table::print_diagnostics(&consolidation.diagnostics);
    Ok(())
}
