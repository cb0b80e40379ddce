//! Regions: segmented, independently extractable chunks of document content.

use serde::{Deserialize, Serialize};

/// The kind of content a region holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegionType {
    Table,
    ParagraphBlock,
    Drawing,
    #[default]
    Unknown,
}

impl RegionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::ParagraphBlock => "paragraph_block",
            Self::Drawing => "drawing",
            Self::Unknown => "unknown",
        }
    }
}

/// A unit of extractable content.
///
/// Produced once by segmentation and read-only thereafter; referenced by id
/// from node provenance and from QC and escalation reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub region_id: String,
    #[serde(rename = "type", default)]
    pub region_type: RegionType,
    /// Label such as "page:3" or "sheet:Costs".
    pub page_or_sheet: String,
    /// Rendered text evidence. Tables arrive pre-rendered to markdown.
    pub text: String,
    /// Backend-specific references to the underlying evidence.
    #[serde(default)]
    pub evidence_refs: serde_json::Value,
    /// `ceil(chars / 4)`, a cheap proxy for model cost and limits.
    pub token_estimate: u32,
}

impl Region {
    /// Evidence units for coverage estimation: non-empty regions count one
    /// unit per line, empty regions still count one.
    pub fn evidence_units(&self) -> usize {
        self.text.lines().count().max(1)
    }
}
