pub mod schema;

use crate::error::PagemarkError;
use schema::{CategorySet, ProjectConfig};
use std::collections::HashSet;
use std::path::Path;

/// Load a project configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<ProjectConfig, PagemarkError> {
    let content = std::fs::read_to_string(path).map_err(|e| PagemarkError::ConfigLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_config(&content, path)
}

/// Parse a project configuration from a JSON string.
pub fn parse_config(json: &str, source: &Path) -> Result<ProjectConfig, PagemarkError> {
    let config: ProjectConfig =
        serde_json::from_str(json).map_err(|e| PagemarkError::ConfigLoad {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse a project configuration from a JSON string (no file path context).
pub fn parse_config_str(json: &str) -> Result<ProjectConfig, PagemarkError> {
    let config: ProjectConfig = serde_json::from_str(json).map_err(PagemarkError::Json)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate that a configuration is well-formed.
pub fn validate_config(config: &ProjectConfig) -> Result<(), PagemarkError> {
    if config.labels.is_empty() {
        return Err(PagemarkError::ConfigInvalid(
            "labels must not be empty".into(),
        ));
    }

    let mut seen = HashSet::new();
    for label in &config.labels {
        if label.text.trim().is_empty() {
            return Err(PagemarkError::ConfigInvalid(
                "label text must not be empty".into(),
            ));
        }
        if !seen.insert(label.text.as_str()) {
            return Err(PagemarkError::ConfigInvalid(format!(
                "duplicate label '{}'",
                label.text
            )));
        }
    }

    let margins = [
        ("search_margin", &config.preannotation.search_margin),
        ("rectify_margin", &config.preannotation.rectify_margin),
    ];
    for (name, margin) in margins {
        if !margin.is_finite() {
            return Err(PagemarkError::ConfigInvalid(format!(
                "preannotation.{name} must be finite"
            )));
        }
    }

    Ok(())
}

impl ProjectConfig {
    /// All configured labels as a category set.
    pub fn categories(&self) -> CategorySet {
        CategorySet::new(self.labels.clone())
    }

    /// The configured labels restricted to `names`, kept in configuration
    /// order. An empty `names` selects every label.
    pub fn select_categories(&self, names: &[String]) -> Result<CategorySet, PagemarkError> {
        if names.is_empty() {
            return Ok(self.categories());
        }

        for name in names {
            if !self.labels.iter().any(|l| &l.text == name) {
                return Err(PagemarkError::ConfigInvalid(format!(
                    "unknown category '{}'. Available: {}",
                    name,
                    self.labels
                        .iter()
                        .map(|l| l.text.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        }

        Ok(CategorySet::new(
            self.labels
                .iter()
                .filter(|l| names.contains(&l.text))
                .cloned()
                .collect(),
        ))
    }
}
