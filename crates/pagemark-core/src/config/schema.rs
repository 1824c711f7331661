use crate::annotation::Label;
use crate::geometry::SoftMargin;
use serde::{Deserialize, Serialize};

/// Labeling configuration of an annotation project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Ordered list of region labels. Only `text` identifies a category.
    pub labels: Vec<Label>,
    /// Labels available for relation groups.
    #[serde(default)]
    pub relations: Vec<Label>,
    #[serde(default)]
    pub preannotation: ResolverConfig,
}

/// Tolerances for turning predicted regions into token-aligned annotations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Growth applied to a predicted box when looking for the tokens it holds.
    pub search_margin: SoftMargin,
    /// Padding applied to the rectified box before it is emitted.
    pub rectify_margin: SoftMargin,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            search_margin: SoftMargin::uniform(3.0),
            rectify_margin: SoftMargin::uniform(2.0),
        }
    }
}

/// Ordered set of category labels; a category's id is its position.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySet {
    labels: Vec<Label>,
}

impl CategorySet {
    pub fn new(labels: Vec<Label>) -> Self {
        CategorySet { labels }
    }

    pub fn id_of(&self, text: &str) -> Option<usize> {
        self.labels.iter().position(|l| l.text == text)
    }

    pub fn get(&self, text: &str) -> Option<&Label> {
        self.labels.iter().find(|l| l.text == text)
    }

    pub fn contains(&self, text: &str) -> bool {
        self.id_of(text).is_some()
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
