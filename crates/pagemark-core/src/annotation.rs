//! Annotation files as saved per document and annotator.
//!
//! The wire form keeps the nullable `tokens` field used by the annotation
//! service; in memory it becomes [`Region`], so every consumer has to decide
//! what to do with free-form boxes.

use crate::geometry::Bounds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    pub color: String,
}

impl Label {
    pub fn new(text: impl Into<String>, color: impl Into<String>) -> Self {
        Label {
            text: text.into(),
            color: color.into(),
        }
    }
}

/// Position of a token: page index and index within that page's token list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenId {
    pub page_index: usize,
    pub token_index: usize,
}

impl TokenId {
    pub fn new(page_index: usize, token_index: usize) -> Self {
        TokenId {
            page_index,
            token_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// Only the drawn bounds define the region.
    FreeForm,
    /// The region is exactly these tokens.
    TokenAligned(Vec<TokenId>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireAnnotation", into = "WireAnnotation")]
pub struct Annotation {
    pub id: String,
    pub page: usize,
    pub label: Label,
    pub bounds: Bounds,
    pub region: Region,
}

#[derive(Serialize, Deserialize)]
struct WireAnnotation {
    id: String,
    page: usize,
    label: Label,
    bounds: Bounds,
    #[serde(default)]
    tokens: Option<Vec<TokenId>>,
}

impl From<WireAnnotation> for Annotation {
    fn from(wire: WireAnnotation) -> Self {
        let region = match wire.tokens {
            Some(tokens) if !tokens.is_empty() => Region::TokenAligned(tokens),
            _ => Region::FreeForm,
        };
        Annotation {
            id: wire.id,
            page: wire.page,
            label: wire.label,
            bounds: wire.bounds,
            region,
        }
    }
}

impl From<Annotation> for WireAnnotation {
    fn from(annotation: Annotation) -> Self {
        let tokens = match annotation.region {
            Region::FreeForm => None,
            Region::TokenAligned(tokens) => Some(tokens),
        };
        WireAnnotation {
            id: annotation.id,
            page: annotation.page,
            label: annotation.label,
            bounds: annotation.bounds,
            tokens,
        }
    }
}

/// Links a set of source annotations to a set of target annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationGroup {
    pub source_ids: Vec<String>,
    pub target_ids: Vec<String>,
    pub label: Label,
}

impl RelationGroup {
    /// Source ids followed by target ids, first occurrence kept.
    pub fn members(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for id in self.source_ids.iter().chain(&self.target_ids) {
            if !out.contains(&id.as_str()) {
                out.push(id);
            }
        }
        out
    }
}

/// Everything one annotator saved for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationFile {
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub relations: Vec<RelationGroup>,
}

impl AnnotationFile {
    /// Append an annotation with a freshly generated id and return that id.
    pub fn add_annotation(
        &mut self,
        page: usize,
        label: Label,
        bounds: Bounds,
        region: Region,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.annotations.push(Annotation {
            id: id.clone(),
            page,
            label,
            bounds,
            region,
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }
}

/// An annotator's progress on one paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperStatus {
    pub finished: bool,
    pub junk: bool,
    pub annotations: usize,
    pub comments: String,
}

/// Status file of one annotator, keyed by paper sha.
pub type AnnotatorStatus = BTreeMap<String, PaperStatus>;
