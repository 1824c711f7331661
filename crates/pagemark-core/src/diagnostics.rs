//! Non-fatal findings collected while resolving, consolidating and exporting.
//!
//! A bad annotation or paper is skipped rather than aborting a run; what was
//! skipped, and why, ends up here and is reported next to the output.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A page or token index that is not in the page structure.
    MissingReference,
    /// A label outside the configured categories.
    UnknownCategory,
    /// An annotation id claimed by more than one relation group.
    AmbiguousRelation,
    /// A whole paper could not be processed.
    PaperFailed,
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::MissingReference => Severity::Error,
            DiagnosticKind::PaperFailed => Severity::Error,
            DiagnosticKind::AmbiguousRelation => Severity::Warning,
            DiagnosticKind::UnknownCategory => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotator: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding and log it.
    pub fn push(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.push_scoped(kind, None, None, message);
    }

    pub fn push_scoped(
        &mut self,
        kind: DiagnosticKind,
        paper: Option<&str>,
        annotator: Option<&str>,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let severity = kind.severity();
        match severity {
            Severity::Error | Severity::Warning => {
                tracing::warn!(?kind, paper, annotator, "{message}")
            }
            Severity::Info => tracing::debug!(?kind, paper, annotator, "{message}"),
        }
        self.entries.push(Diagnostic {
            kind,
            severity,
            paper: paper.map(str::to_string),
            annotator: annotator.map(str::to_string),
            message,
        });
    }

    /// Merge `other` in, filling in paper/annotator where the entry has none.
    pub fn absorb(&mut self, other: Diagnostics, paper: Option<&str>, annotator: Option<&str>) {
        for mut entry in other.entries {
            if entry.paper.is_none() {
                entry.paper = paper.map(str::to_string);
            }
            if entry.annotator.is_none() {
                entry.annotator = annotator.map(str::to_string);
            }
            self.entries.push(entry);
        }
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}
