pub mod agreement;
pub mod annotation;
pub mod config;
pub mod consolidate;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod extraction;
pub mod geometry;
pub mod model;
pub mod project;
pub mod resolve;

use config::schema::{CategorySet, ProjectConfig};
use consolidate::{consolidate_file, ConsolidatedAnnotation, FreeFormStrategy};
use diagnostics::{DiagnosticKind, Diagnostics};
use error::PagemarkError;
use export::coco::{CocoBuilder, CocoDataset};
use export::token_table::{TokenTable, TokenTableBuilder};
use export::PaperSource;
use extraction::PageRenderer;
use model::TokenPage;
use project::ProjectFolder;
use resolve::{preannotate_document, ModelPredictions};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Which part of a project to export.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Annotators to export. Empty means every annotator with a status file.
    pub annotators: Vec<String>,
    /// Category names to keep. Empty means every configured label.
    pub categories: Vec<String>,
    /// Also export papers not yet marked finished.
    pub include_unfinished: bool,
}

/// One dataset per annotator plus everything that was skipped on the way.
#[derive(Debug, Clone, Default)]
pub struct CocoExport {
    pub datasets: BTreeMap<String, CocoDataset>,
    pub diagnostics: Diagnostics,
}

/// Page images to materialize during a COCO export.
#[derive(Clone, Copy)]
pub struct ImageOutput<'a> {
    pub dir: &'a Path,
    pub renderer: &'a dyn PageRenderer,
}

/// Export every selected annotator's finished papers as COCO datasets.
///
/// A paper that fails to load, consolidate or render is recorded as a
/// `PaperFailed` diagnostic and left out of that annotator's dataset.
pub fn export_coco(
    folder: &ProjectFolder,
    config: &ProjectConfig,
    options: &ExportOptions,
    images: Option<ImageOutput<'_>>,
) -> Result<CocoExport, PagemarkError> {
    let categories = config.select_categories(&options.categories)?;
    let annotators = selected_annotators(folder, options)?;
    let strategy = FreeFormStrategy::Search(config.preannotation.search_margin);
    let mut export = CocoExport::default();

    for annotator in &annotators {
        let mut builder = CocoBuilder::new(categories.clone());
        if let Some(images) = images {
            builder = builder.with_images(images.dir, images.renderer);
        }

        for sha in folder.papers_for(annotator, options.include_unfinished)? {
            let result = (|| -> Result<(), PagemarkError> {
                let structure = folder.load_structure(&sha)?;
                let Some(annotations) = consolidated_for(
                    folder,
                    &sha,
                    annotator,
                    &structure,
                    &strategy,
                    &mut export.diagnostics,
                )?
                else {
                    return Ok(());
                };
                let pdf_path = folder.pdf_path(&sha);
                let paper = PaperSource {
                    sha: &sha,
                    pdf_path: &pdf_path,
                    structure: &structure,
                };
                builder.add_paper(&paper, &annotations)?;
                Ok(())
            })();

            if let Err(e) = result {
                export.diagnostics.push_scoped(
                    DiagnosticKind::PaperFailed,
                    Some(sha.as_str()),
                    Some(annotator.as_str()),
                    e.to_string(),
                );
            }
        }

        let (dataset, diagnostics) = builder.finish();
        tracing::info!(
            annotator = annotator.as_str(),
            papers = dataset.papers.len(),
            images = dataset.images.len(),
            annotations = dataset.annotations.len(),
            "dataset built"
        );
        export.diagnostics.absorb(diagnostics, None, Some(annotator.as_str()));
        export.datasets.insert(annotator.clone(), dataset);
    }

    Ok(export)
}

/// Export one token table covering every selected annotator.
///
/// Rows cover the union of the annotators' papers; an annotator's column is
/// only filled on papers selected for them.
pub fn export_token_table(
    folder: &ProjectFolder,
    config: &ProjectConfig,
    options: &ExportOptions,
) -> Result<(TokenTable, Diagnostics), PagemarkError> {
    let categories: CategorySet = config.select_categories(&options.categories)?;
    let annotators = selected_annotators(folder, options)?;
    let strategy = FreeFormStrategy::Search(config.preannotation.search_margin);
    let mut diagnostics = Diagnostics::new();

    let mut assigned: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for annotator in &annotators {
        for sha in folder.papers_for(annotator, options.include_unfinished)? {
            assigned.entry(sha).or_default().insert(annotator.clone());
        }
    }

    let mut builder = TokenTableBuilder::new(annotators.clone(), categories);
    for (sha, paper_annotators) in &assigned {
        let structure = match folder.load_structure(sha) {
            Ok(s) => s,
            Err(e) => {
                diagnostics.push_scoped(
                    DiagnosticKind::PaperFailed,
                    Some(sha.as_str()),
                    None,
                    e.to_string(),
                );
                continue;
            }
        };

        let mut per_annotator: Vec<(&str, Vec<ConsolidatedAnnotation>)> = Vec::new();
        for annotator in paper_annotators {
            match consolidated_for(folder, sha, annotator, &structure, &strategy, &mut diagnostics) {
                Ok(Some(annotations)) => per_annotator.push((annotator.as_str(), annotations)),
                Ok(None) => {}
                Err(e) => diagnostics.push_scoped(
                    DiagnosticKind::PaperFailed,
                    Some(sha.as_str()),
                    Some(annotator.as_str()),
                    e.to_string(),
                ),
            }
        }

        let views: Vec<(&str, &[ConsolidatedAnnotation])> = per_annotator
            .iter()
            .map(|(a, anns)| (*a, anns.as_slice()))
            .collect();
        builder.add_paper(sha, &structure, &views);
    }

    let (table, table_diagnostics) = builder.finish();
    diagnostics.absorb(table_diagnostics, None, None);
    tracing::info!(
        papers = assigned.len(),
        rows = table.rows.len(),
        "token table built"
    );
    Ok((table, diagnostics))
}

/// Write preannotations for `annotator` from layout model predictions,
/// replacing their annotation file on every predicted paper.
pub fn preannotate_project(
    folder: &ProjectFolder,
    config: &ProjectConfig,
    predictions: &ModelPredictions,
    annotator: &str,
) -> Result<Diagnostics, PagemarkError> {
    if !folder.annotators()?.iter().any(|a| a == annotator) {
        return Err(PagemarkError::ConfigInvalid(format!(
            "unknown annotator '{annotator}'"
        )));
    }

    let categories = config.categories();
    let papers: BTreeSet<String> = folder.papers()?.into_iter().collect();
    let mut diagnostics = Diagnostics::new();

    for pdf_name in predictions.pdfs.keys() {
        let sha = pdf_name.strip_suffix(".pdf").unwrap_or(pdf_name);
        if !papers.contains(sha) {
            diagnostics.push_scoped(
                DiagnosticKind::MissingReference,
                Some(sha),
                Some(annotator),
                format!("{pdf_name} is not in the project, skipped"),
            );
            continue;
        }

        let result = (|| -> Result<usize, PagemarkError> {
            let structure = folder.load_structure(sha)?;
            let pages = predictions.pages(pdf_name).unwrap_or_default();
            let out =
                preannotate_document(pages, &structure, &categories, &config.preannotation)?;
            folder.save_annotations(sha, annotator, &out.file)?;
            diagnostics.absorb(out.diagnostics, Some(sha), Some(annotator));
            Ok(out.file.annotations.len())
        })();

        match result {
            Ok(count) => tracing::info!(paper = sha, annotations = count, "preannotations stored"),
            Err(e) => diagnostics.push_scoped(
                DiagnosticKind::PaperFailed,
                Some(sha),
                Some(annotator),
                e.to_string(),
            ),
        }
    }

    Ok(diagnostics)
}

fn selected_annotators(
    folder: &ProjectFolder,
    options: &ExportOptions,
) -> Result<Vec<String>, PagemarkError> {
    if options.annotators.is_empty() {
        folder.annotators()
    } else {
        Ok(options.annotators.clone())
    }
}

/// Consolidated annotations of one annotator on one paper, or `None` when
/// they have no annotation file for it.
fn consolidated_for(
    folder: &ProjectFolder,
    sha: &str,
    annotator: &str,
    structure: &[TokenPage],
    strategy: &FreeFormStrategy<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<Option<Vec<ConsolidatedAnnotation>>, PagemarkError> {
    let Some(file) = folder.load_annotations(sha, annotator)? else {
        tracing::debug!(paper = sha, annotator, "no annotation file");
        return Ok(None);
    };
    let consolidation = consolidate_file(&file, structure, strategy)?;
    diagnostics.absorb(consolidation.diagnostics, Some(sha), Some(annotator));
    Ok(Some(consolidation.annotations))
}
