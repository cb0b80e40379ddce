//! Region extraction: one AI pass per region.
//!
//! The response is parsed leniently: missing node ids are synthesized,
//! missing metadata, warnings, and provenance are defaulted rather than
//! failing the parse. Strict mode forcibly clears any inferred flag the
//! model set anyway.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::hitl::ColumnDecision;
use crate::llm::{generate_json, GenerationClient, GenerationRequest, LlmSelection};
use crate::models::{JobMode, KeyValue, Node, Provenance, Region, RegionContext};
use crate::pipeline::prompts;

/// Warning attached when strict mode strips an inferred flag the model set.
pub const INFERRED_CLEARED_WARNING: &str = "inferred_cleared_strict_mode";

/// Evidence the pass chose not to convert into nodes, with its reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UnmappedContent {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reason: String,
}

/// Output contract of one region extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionExtraction {
    pub region_id: String,
    pub confidence: f64,
    pub notes: String,
    pub nodes: Vec<Node>,
    pub unmapped_content: Vec<UnmappedContent>,
}

/// Extraction output together with the raw response for artifact archival.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub extraction: RegionExtraction,
    pub raw_text: String,
}

// What the model actually returns, before defaulting.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraction {
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    unmapped_content: Vec<UnmappedContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    metadata: Vec<KeyValue>,
    #[serde(default)]
    provenance: Option<Provenance>,
    #[serde(default)]
    inferred: bool,
    #[serde(default)]
    warnings: Vec<String>,
}

/// Run one region extraction.
pub async fn extract_region(
    client: &dyn GenerationClient,
    selection: &LlmSelection,
    mode: JobMode,
    region: &Region,
    guidance: Option<&RegionContext>,
    column_decision: Option<&ColumnDecision>,
) -> Result<ExtractionOutcome, PipelineError> {
    let temperature = match mode {
        JobMode::Strict => 0.1,
        JobMode::BestJudgment => 0.35,
    };
    let request = GenerationRequest::new(selection, temperature);

    let system = prompts::extract_system(mode);
    let user = prompts::extract_user(region, guidance, column_decision);

    let (raw, raw_text): (RawExtraction, String) =
        generate_json(client, &request, &system, &user).await?;

    let nodes = raw
        .nodes
        .into_iter()
        .map(|n| finish_node(n, mode, region))
        .collect();

    Ok(ExtractionOutcome {
        extraction: RegionExtraction {
            region_id: region.region_id.clone(),
            confidence: raw.confidence,
            notes: raw.notes,
            nodes,
            unmapped_content: raw.unmapped_content,
        },
        raw_text,
    })
}

/// Apply the defaulting rules to a raw node.
fn finish_node(raw: RawNode, mode: JobMode, region: &Region) -> Node {
    let mut node = Node {
        id: raw.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        parent_id: raw.parent_id,
        title: raw.title,
        description: raw.description,
        level: raw.level,
        metadata: raw.metadata,
        provenance: raw.provenance.unwrap_or_else(|| Provenance {
            region_id: region.region_id.clone(),
            page_or_sheet: region.page_or_sheet.clone(),
            ..Default::default()
        }),
        inferred: raw.inferred,
        warnings: raw.warnings,
    };

    if mode == JobMode::Strict && node.inferred {
        node.inferred = false;
        node.warnings.push(INFERRED_CLEARED_WARNING.to_string());
    }

    node
}
