//! Per-token label table across annotators, for agreement analysis.

use crate::config::schema::CategorySet;
use crate::consolidate::ConsolidatedAnnotation;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::PagemarkError;
use crate::model::TokenPage;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};

const FIXED_COLUMNS: [&str; 4] = ["pdf", "page_index", "index", "text"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenRow {
    pub pdf: String,
    pub page_index: usize,
    pub index: usize,
    pub text: String,
    /// One cell per annotator, in [`TokenTable::annotators`] order.
    pub labels: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenTable {
    pub annotators: Vec<String>,
    pub rows: Vec<TokenRow>,
}

impl TokenTable {
    /// Write as CSV with header `pdf,page_index,index,text,<annotators...>`.
    /// Unlabeled cells are empty fields.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), PagemarkError> {
        let mut wtr = csv::WriterBuilder::new().from_writer(writer);

        let mut header: Vec<&str> = FIXED_COLUMNS.to_vec();
        header.extend(self.annotators.iter().map(String::as_str));
        wtr.write_record(&header)?;

        for row in &self.rows {
            let page_index = row.page_index.to_string();
            let index = row.index.to_string();
            let mut record = vec![
                row.pdf.as_str(),
                page_index.as_str(),
                index.as_str(),
                row.text.as_str(),
            ];
            record.extend(row.labels.iter().map(|l| l.as_deref().unwrap_or("")));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Read a table written by [`TokenTable::write_csv`].
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, PagemarkError> {
        let mut rdr = csv::ReaderBuilder::new().from_reader(reader);

        let headers = rdr.headers()?.clone();
        let fixed: Vec<&str> = headers.iter().take(FIXED_COLUMNS.len()).collect();
        if fixed != FIXED_COLUMNS {
            return Err(PagemarkError::InvalidTable(format!(
                "expected leading columns {}, found {}",
                FIXED_COLUMNS.join(","),
                fixed.join(",")
            )));
        }
        let annotators: Vec<String> = headers
            .iter()
            .skip(FIXED_COLUMNS.len())
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or("");
            let number = |i: usize| {
                field(i).parse::<usize>().map_err(|_| {
                    PagemarkError::InvalidTable(format!(
                        "row {}: '{}' is not a valid {}",
                        line + 1,
                        field(i),
                        FIXED_COLUMNS[i]
                    ))
                })
            };

            rows.push(TokenRow {
                pdf: field(0).to_string(),
                page_index: number(1)?,
                index: number(2)?,
                text: field(3).to_string(),
                labels: (0..annotators.len())
                    .map(|a| match field(FIXED_COLUMNS.len() + a) {
                        "" => None,
                        label => Some(label.to_string()),
                    })
                    .collect(),
            });
        }

        Ok(TokenTable { annotators, rows })
    }
}

/// Builds a [`TokenTable`] paper by paper.
pub struct TokenTableBuilder {
    annotators: Vec<String>,
    categories: CategorySet,
    table: TokenTable,
    diagnostics: Diagnostics,
}

impl TokenTableBuilder {
    pub fn new(annotators: Vec<String>, categories: CategorySet) -> Self {
        TokenTableBuilder {
            table: TokenTable {
                annotators: annotators.clone(),
                rows: Vec::new(),
            },
            annotators,
            categories,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Add every token of one paper, labelled with each annotator's
    /// consolidated annotations.
    ///
    /// Annotators not listed in `per_annotator` leave their column null.
    pub fn add_paper(
        &mut self,
        sha: &str,
        structure: &[TokenPage],
        per_annotator: &[(&str, &[ConsolidatedAnnotation])],
    ) {
        let first_row = self.table.rows.len();
        let mut position_to_row = HashMap::new();
        for page in structure {
            for (index, token) in page.tokens.iter().enumerate() {
                position_to_row.insert((page.page.index, index), self.table.rows.len());
                self.table.rows.push(TokenRow {
                    pdf: format!("{sha}.pdf"),
                    page_index: page.page.index,
                    index,
                    text: token.text.clone(),
                    labels: vec![None; self.annotators.len()],
                });
            }
        }

        for &(annotator, annotations) in per_annotator {
            let Some(column) = self.annotators.iter().position(|a| a == annotator) else {
                continue;
            };
            for annotation in annotations {
                if !self.categories.contains(&annotation.label.text) {
                    self.diagnostics.push_scoped(
                        DiagnosticKind::UnknownCategory,
                        Some(sha),
                        Some(annotator),
                        format!("label '{}' not in the requested categories", annotation.label.text),
                    );
                    continue;
                }
                for position in &annotation.positions {
                    match position_to_row.get(&(position.page_index, position.token_index)) {
                        Some(&row) => {
                            self.table.rows[row].labels[column] =
                                Some(annotation.label.text.clone());
                        }
                        None => self.diagnostics.push_scoped(
                            DiagnosticKind::MissingReference,
                            Some(sha),
                            Some(annotator),
                            format!(
                                "annotation {} covers page {} token {}, which is not in the structure",
                                annotation.id, position.page_index, position.token_index
                            ),
                        ),
                    }
                }
            }
        }

        tracing::debug!(
            paper = sha,
            rows = self.table.rows.len() - first_row,
            "paper added to token table"
        );
    }

    pub fn table(&self) -> &TokenTable {
        &self.table
    }

    pub fn finish(self) -> (TokenTable, Diagnostics) {
        (self.table, self.diagnostics)
    }
}
