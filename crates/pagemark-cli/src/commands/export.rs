use pagemark_core::error::PagemarkError;
use pagemark_core::extraction::pdftoppm::PdftoppmRenderer;
use pagemark_core::project::ProjectFolder;
use pagemark_core::{ExportOptions, ImageOutput};
use std::path::Path;

use crate::output;
use crate::ExportFormat;

const DATASET_FILE: &str = "annotations.json";
const IMAGE_DIR: &str = "images";

pub fn run(
    root: &Path,
    config_file: &Path,
    output_path: &Path,
    options: ExportOptions,
    format: ExportFormat,
    render_images: bool,
) -> Result<(), PagemarkError> {
    let config = pagemark_core::config::load_config(config_file)?;
    let folder = ProjectFolder::new(root);

    match format {
        ExportFormat::Coco => export_coco(&folder, &config, output_path, &options, render_images),
        ExportFormat::Token => export_token(&folder, &config, output_path, &options),
    }
}

fn export_coco(
    folder: &ProjectFolder,
    config: &pagemark_core::config::schema::ProjectConfig,
    output_dir: &Path,
    options: &ExportOptions,
    render_images: bool,
) -> Result<(), PagemarkError> {
    if render_images {
        PdftoppmRenderer::require()?;
    }
    std::fs::create_dir_all(output_dir)?;

    let renderer = PdftoppmRenderer::new();
    let image_dir = output_dir.join(IMAGE_DIR);
    let images = render_images.then_some(ImageOutput {
        dir: &image_dir,
        renderer: &renderer,
    });

    let export = pagemark_core::export_coco(folder, config, options, images)?;

    // A single annotator's dataset sits at the top of the output directory;
    // several annotators get one sub-directory each.
    let single = export.datasets.len() == 1;
    for (annotator, dataset) in &export.datasets {
        let dir = if single {
            output_dir.to_path_buf()
        } else {
            output_dir.join(annotator)
        };
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(DATASET_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(dataset)?)?;
        eprintln!(
            "{}: {} paper(s), {} image(s), {} annotation(s) -> {}",
            annotator,
            dataset.papers.len(),
            dataset.images.len(),
            dataset.annotations.len(),
            path.display()
        );
    }

    output::table::print_diagnostics(&export.diagnostics);
    Ok(())
}

fn export_token(
    folder: &ProjectFolder,
    config: &pagemark_core::config::schema::ProjectConfig,
    output_file: &Path,
    options: &ExportOptions,
) -> Result<(), PagemarkError> {
    let (table, diagnostics) = pagemark_core::export_token_table(folder, config, options)?;

    if let Some(parent) = output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(output_file)?;
    table.write_csv(file)?;

    eprintln!(
        "{} token(s) for {} annotator(s) -> {}",
        table.rows.len(),
        table.annotators.len(),
        output_file.display()
    );
    output::table::print_diagnostics(&diagnostics);
    Ok(())
}
