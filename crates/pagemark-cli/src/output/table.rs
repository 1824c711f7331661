use pagemark_core::agreement::{AgreementMatrix, BoxAgreement};
use pagemark_core::diagnostics::{DiagnosticKind, Diagnostics, Severity};

const KINDS: [(DiagnosticKind, &str); 4] = [
    (DiagnosticKind::MissingReference, "missing references"),
    (DiagnosticKind::UnknownCategory, "unknown categories"),
    (DiagnosticKind::AmbiguousRelation, "ambiguous relations"),
    (DiagnosticKind::PaperFailed, "failed papers"),
];

/// Summarize diagnostics on stderr: counts per kind, then every error.
pub fn print_diagnostics(diagnostics: &Diagnostics) {
    if diagnostics.is_empty() {
        return;
    }

    eprintln!();
    for (kind, name) in KINDS {
        let count = diagnostics.count(kind);
        if count > 0 {
            eprintln!("  {count:>5} {name}");
        }
    }

    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        eprintln!("\nErrors:");
        for d in errors {
            let scope = match (&d.paper, &d.annotator) {
                (Some(p), Some(a)) => format!("[{p} / {a}] "),
                (Some(p), None) => format!("[{p}] "),
                (None, Some(a)) => format!("[{a}] "),
                (None, None) => String::new(),
            };
            eprintln!("  - {scope}{}", d.message);
        }
    }
}

/// Render the agreement matrix as a square table, `-` on the diagonal.
pub fn format_agreement(matrix: &AgreementMatrix, rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Token accuracy over {rows} token(s), {} annotator(s)\n\n",
        matrix.annotators.len()
    ));

    let width = matrix
        .annotators
        .iter()
        .map(|a| a.len())
        .max()
        .unwrap_or(0)
        .max(6);

    out.push_str(&format!("  {:<width$}", ""));
    for a in &matrix.annotators {
        out.push_str(&format!("  {a:>width$}"));
    }
    out.push('\n');

    for a in &matrix.annotators {
        out.push_str(&format!("  {a:<width$}"));
        for b in &matrix.annotators {
            let cell = if a == b {
                "-".to_string()
            } else {
                match matrix.get(a, b) {
                    Some(acc) => format!("{acc:.3}"),
                    None => "n/a".to_string(),
                }
            };
            out.push_str(&format!("  {cell:>width$}"));
        }
        out.push('\n');
    }

    out
}

/// Render box agreement as one square table for the overall AP and one per
/// category. Rows are the ground truth, columns the predictions.
pub fn format_box_agreement(names: &[String], pairs: &[BoxAgreement]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Box AP (IoU 0.50:0.95) between {} annotator(s); rows are taken as ground truth\n",
        names.len()
    ));

    out.push_str("\nAll categories\n");
    out.push_str(&square(names, |a, b| find_pair(pairs, a, b).and_then(|p| p.scores.ap)));

    let categories: Vec<&str> = pairs
        .first()
        .map(|p| {
            p.scores
                .per_category
                .iter()
                .map(|c| c.category.as_str())
                .collect()
        })
        .unwrap_or_default();
    for category in categories {
        out.push_str(&format!("\n{category}\n"));
        out.push_str(&square(names, |a, b| {
            find_pair(pairs, a, b).and_then(|p| {
                p.scores
                    .per_category
                    .iter()
                    .find(|c| c.category == category)
                    .and_then(|c| c.ap)
            })
        }));
    }

    out
}

fn find_pair<'a>(pairs: &'a [BoxAgreement], truth: &str, predicted: &str) -> Option<&'a BoxAgreement> {
    pairs
        .iter()
        .find(|p| p.truth == truth && p.predicted == predicted)
}

fn square(names: &[String], cell: impl Fn(&str, &str) -> Option<f64>) -> String {
    let width = names.iter().map(|a| a.len()).max().unwrap_or(0).max(6);
    let mut out = format!("  {:<width$}", "");
    for a in names {
        out.push_str(&format!("  {a:>width$}"));
    }
    out.push('\n');

    for a in names {
        out.push_str(&format!("  {a:<width$}"));
        for b in names {
            let value = if a == b {
                "-".to_string()
            } else {
                match cell(a, b) {
                    Some(v) => format!("{v:.3}"),
                    None => "n/a".to_string(),
                }
            };
            out.push_str(&format!("  {value:>width$}"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemark_core::agreement::{BoxScores, CategoryAp, PairAgreement};

    #[test]
    fn test_format_agreement_is_square() {
        let matrix = AgreementMatrix {
            annotators: vec!["alice".into(), "bob".into()],
            pairs: vec![PairAgreement {
                first: "alice".into(),
                second: "bob".into(),
                accuracy: Some(0.75),
            }],
        };
        let text = format_agreement(&matrix, 4);
        assert!(text.starts_with("Token accuracy over 4 token(s), 2 annotator(s)"));
        assert!(text.contains("0.750"));
        assert_eq!(text.matches("0.750").count(), 2);
        assert_eq!(text.matches(" -").count(), 2);
    }

    fn pair(truth: &str, predicted: &str, ap: Option<f64>) -> BoxAgreement {
        BoxAgreement {
            truth: truth.into(),
            predicted: predicted.into(),
            scores: BoxScores {
                shared_images: 1,
                ap,
                ap50: ap,
                ap75: ap,
                per_category: vec![
                    CategoryAp {
                        category: "Title".into(),
                        ap,
                    },
                    CategoryAp {
                        category: "Figure".into(),
                        ap: None,
                    },
                ],
            },
        }
    }

    #[test]
    fn test_format_box_agreement_has_a_table_per_category() {
        let names = vec!["alice".to_string(), "bob".to_string()];
        let pairs = vec![
            pair("alice", "bob", Some(0.5)),
            pair("bob", "alice", Some(0.25)),
        ];
        let text = format_box_agreement(&names, &pairs);

        assert!(text.contains("All categories"));
        assert!(text.contains("\nTitle\n"));
        assert!(text.contains("\nFigure\n"));
        assert_eq!(text.matches("0.500").count(), 2);
        assert_eq!(text.matches("0.250").count(), 2);
        assert_eq!(text.matches("n/a").count(), 2);
    }
}
