//! Breakdown-tree nodes and their provenance.

use serde::{Deserialize, Serialize};

/// One metadata entry carried on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Where a node's evidence came from within the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    TableCell,
    Paragraph,
    ListItem,
    Heading,
    #[default]
    Unknown,
}

/// The region, location, and verbatim quote justifying a node's existence.
///
/// The quote must be traceable to the source region's text; validation
/// reports (rather than rejects) nodes where it is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    #[serde(default)]
    pub region_id: String,
    #[serde(default)]
    pub page_or_sheet: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub quote: String,
}

/// One item in the output breakdown tree.
///
/// Produced by the region extractor, re-parented by the consolidator,
/// corrected by the verifier, and possibly replaced wholesale by the
/// escalation pass. A dangling `parent_id` is a reported anomaly, not a
/// structural impossibility: the tree is built incrementally across passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,

    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Dotted level label such as "2.2.1", when the document provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(default)]
    pub metadata: Vec<KeyValue>,

    #[serde(default)]
    pub provenance: Provenance,

    #[serde(default)]
    pub inferred: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Node {
    /// A minimal node for tests and fallback paths.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            title: title.into(),
            description: None,
            level: None,
            metadata: Vec::new(),
            provenance: Provenance::default(),
            inferred: false,
            warnings: Vec::new(),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn with_region(mut self, region_id: impl Into<String>) -> Self {
        self.provenance.region_id = region_id.into();
        self
    }

    pub fn with_quote(mut self, quote: impl Into<String>) -> Self {
        self.provenance.quote = quote.into();
        self
    }
}
