//! Global document analysis output.
//!
//! Everything here deserializes leniently: the shapes come straight out of
//! a model response and a missing field must default, not fail the parse.

use serde::{Deserialize, Serialize};

/// Overall structural classification of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPattern {
    Outline,
    Matrix,
    FlatList,
    Mixed,
    #[default]
    Unknown,
}

impl DocumentPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outline => "outline",
            Self::Matrix => "matrix",
            Self::FlatList => "flat_list",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }
}

/// Document-level structural hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StructuralElements {
    /// Repeating column headers, when the document is matrix-like.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_headers: Option<Vec<String>>,
    #[serde(default)]
    pub has_phase_columns: bool,
    /// e.g. "1.1.1", "A.1.a", "none".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numbering_scheme: Option<String>,
    #[serde(default)]
    pub page_count: u32,
}

/// One entry in the coarse top-level skeleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeletonNode {
    pub title: String,
    #[serde(default)]
    pub suggested_level: String,
    #[serde(default)]
    pub parent_title: Option<String>,
    #[serde(default)]
    pub page_refs: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Skeleton {
    #[serde(default)]
    pub nodes: Vec<SkeletonNode>,
    #[serde(default)]
    pub notes: String,
}

/// Layout classification for a single region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutHint {
    Outline,
    Matrix,
    List,
    Table,
    #[default]
    Unknown,
}

/// Extraction guidance for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegionContext {
    /// Breadcrumb path of section titles leading to this region.
    #[serde(default)]
    pub section_path: Vec<String>,
    /// Suggested numbering prefix for items found here.
    #[serde(default)]
    pub suggested_parent_level: String,
    #[serde(default)]
    pub layout_hint: LayoutHint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_headers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_header: Option<String>,
    /// Free-text guidance for the extraction pass.
    #[serde(default)]
    pub extraction_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionGuidance {
    pub region_id: String,
    #[serde(default)]
    pub page_or_sheet: String,
    #[serde(default)]
    pub context: RegionContext,
}

/// Output of the whole-document analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAnalysis {
    #[serde(default)]
    pub document_pattern: DocumentPattern,
    #[serde(default)]
    pub structural_elements: StructuralElements,
    #[serde(default)]
    pub skeleton: Skeleton,
    #[serde(default)]
    pub region_guidance: Vec<RegionGuidance>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl GlobalAnalysis {
    /// Fallback analysis when the analysis pass produced nothing usable.
    /// Keeps the pipeline alive with no guidance rather than failing the run.
    pub fn unavailable() -> Self {
        Self {
            document_pattern: DocumentPattern::Unknown,
            structural_elements: StructuralElements::default(),
            skeleton: Skeleton {
                nodes: Vec::new(),
                notes: "Global analysis unavailable".to_string(),
            },
            region_guidance: Vec::new(),
            warnings: vec!["global_analysis_unavailable".to_string()],
        }
    }

    pub fn guidance_for(&self, region_id: &str) -> Option<&RegionContext> {
        self.region_guidance
            .iter()
            .find(|g| g.region_id == region_id)
            .map(|g| &g.context)
    }
}
