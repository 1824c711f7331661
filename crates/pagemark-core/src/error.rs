use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PagemarkError {
    #[error("cannot take the union of zero boxes")]
    EmptyUnion,

    #[error("invalid scale factor ({x}, {y}): factors must be finite and positive")]
    InvalidScale { x: f64, y: f64 },

    #[error("annotation '{annotation_id}' references page {page_index}, token {token_index:?}, which does not exist")]
    MissingReference {
        annotation_id: String,
        page_index: usize,
        token_index: Option<usize>,
    },

    #[error("failed to load configuration from {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("{tool} not found. Install poppler: brew install poppler (macOS) or apt install poppler-utils (Linux)")]
    PopplerNotFound { tool: &'static str },

    #[error("{tool} failed with exit code {code}: {stderr}")]
    PopplerFailed {
        tool: &'static str,
        code: i32,
        stderr: String,
    },

    #[error("PDF extraction failed: {0}")]
    Extraction(String),

    #[error("malformed token table: {0}")]
    InvalidTable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
