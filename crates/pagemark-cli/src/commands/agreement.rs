use pagemark_core::agreement::{box_agreement, token_accuracy};
use pagemark_core::error::PagemarkError;
use pagemark_core::export::coco::CocoDataset;
use pagemark_core::export::token_table::TokenTable;
use std::path::{Path, PathBuf};

use crate::output;

/// File name the exporter gives every dataset.
const DATASET_STEM: &str = "annotations";

pub fn run(table_file: &Path, output_format: &str) -> Result<(), PagemarkError> {
    let file = std::fs::File::open(table_file)?;
    let table = TokenTable::read_csv(file)?;
    let matrix = token_accuracy(&table);

    match output_format {
        "json" => output::json::print(&matrix)?,
        _ => println!("{}", output::table::format_agreement(&matrix, table.rows.len())),
    }
    Ok(())
}

pub fn run_coco(dataset_files: &[PathBuf], output_format: &str) -> Result<(), PagemarkError> {
    let mut datasets = Vec::with_capacity(dataset_files.len());
    for path in dataset_files {
        let dataset: CocoDataset = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        datasets.push((dataset_name(path), dataset));
    }

    let names: Vec<String> = datasets.iter().map(|(name, _)| name.clone()).collect();
    let pairs = box_agreement(&datasets)?;

    match output_format {
        "json" => output::json::print(&pairs)?,
        _ => println!("{}", output::table::format_box_agreement(&names, &pairs)),
    }
    Ok(())
}

/// Annotator name for a dataset file: its stem, or the name of its
/// directory for the `<annotator>/annotations.json` layout of an export.
fn dataset_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem != DATASET_STEM {
        return stem;
    }
    path.parent()
        .and_then(Path::file_name)
        .map(|d| d.to_string_lossy().into_owned())
        .unwrap_or(stem)
}
