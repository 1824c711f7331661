use pagemark_core::error::PagemarkError;
use pagemark_core::project::ProjectFolder;
use pagemark_core::resolve::ModelPredictions;
use std::path::Path;

use crate::output;

pub fn run(
    root: &Path,
    config_file: &Path,
    predictions_file: &Path,
    annotator: &str,
) -> Result<(), PagemarkError> {
    let config = pagemark_core::config::load_config(config_file)?;
    let predictions = ModelPredictions::load(predictions_file)?;
    let folder = ProjectFolder::new(root);

    let diagnostics =
        pagemark_core::preannotate_project(&folder, &config, &predictions, annotator)?;

    eprintln!(
        "Preannotated {} PDF(s) for {}",
        predictions.pdfs.len(),
        annotator
    );
    output::table::print_diagnostics(&diagnostics);
    Ok(())
}
