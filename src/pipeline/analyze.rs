//! Global analysis: one whole-document AI pass.
//!
//! Produces the document-pattern classification, structural hints, a coarse
//! skeleton, and per-region extraction guidance. Guidance is reconciled
//! against the actual region list afterwards so no region goes silently
//! unaddressed.

use crate::docint::NormalizedDocument;
use crate::error::PipelineError;
use crate::llm::{generate_json, GenerationClient, GenerationRequest, LlmSelection};
use crate::models::{GlobalAnalysis, Region};
use crate::pipeline::prompts;

const ANALYSIS_TEMPERATURE: f32 = 0.2;

/// Analysis output plus the prompts and raw text for artifact archival.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: GlobalAnalysis,
    pub raw_text: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Run the whole-document analysis pass.
pub async fn analyze_document(
    client: &dyn GenerationClient,
    selection: &LlmSelection,
    doc: &NormalizedDocument,
    regions: &[Region],
    user_context: Option<&str>,
) -> Result<AnalysisOutcome, PipelineError> {
    let full_content = prompts::full_document_content(&doc.content, regions);
    let page_count = (doc.pages.len() as u32).max(1);

    let request = GenerationRequest::new(selection, ANALYSIS_TEMPERATURE);
    let system = prompts::analysis_system();
    let user = prompts::analysis_user(&full_content, regions, page_count, user_context);

    let (analysis, raw_text): (GlobalAnalysis, String) =
        generate_json(client, &request, &system, &user).await?;

    let analysis = prompts::ensure_complete_guidance(analysis, regions);
    tracing::info!(
        pattern = analysis.document_pattern.as_str(),
        skeleton_nodes = analysis.skeleton.nodes.len(),
        regions_with_guidance = analysis.region_guidance.len(),
        "global analysis done"
    );

    Ok(AnalysisOutcome {
        analysis,
        raw_text,
        system_prompt: system,
        user_prompt: user,
    })
}
