//! Prompt builders for every AI pass.
//!
//! Wording here is operational, not contractual: the shapes the pipeline
//! relies on are enforced by the lenient parsers in each stage. The
//! analyzer and verifier prompts are archived as artifacts per run.

use crate::hitl::ColumnDecision;
use crate::models::{
    GlobalAnalysis, JobMode, Node, Region, RegionContext, ValidationReport,
};
use crate::pipeline::escalate::Candidate;
use crate::pipeline::verify::VerifierIssue;

pub const ANALYSIS_PROMPT_ID: &str = "global_analysis_v1";
pub const EXTRACT_PROMPT_ID: &str = "extract_region_v1";
pub const VERIFY_PROMPT_ID: &str = "verify_document_v1";
pub const JUDGE_PROMPT_ID: &str = "judge_merge_v1";
pub const SUMMARY_PROMPT_ID: &str = "summary_v1";

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

// ═══════════════════════════════════════════════════════════
// Global analysis
// ═══════════════════════════════════════════════════════════

pub fn analysis_system() -> String {
    "You are a document-structure analyst. Given the full text of a document, \
     classify its overall pattern (outline, matrix, flat_list, mixed, unknown), \
     describe its structural elements (repeating column headers, numbering scheme, \
     page count), sketch a coarse top-level skeleton, and produce one guidance \
     entry per region with a section path, suggested numbering prefix, layout \
     hint, and free-text extraction notes. Output JSON only with keys \
     documentPattern, structuralElements, skeleton, regionGuidance, warnings."
        .to_string()
}

pub fn analysis_user(
    full_content: &str,
    regions: &[Region],
    page_count: u32,
    user_context: Option<&str>,
) -> String {
    let region_index: Vec<serde_json::Value> = regions
        .iter()
        .map(|r| {
            serde_json::json!({
                "regionId": r.region_id,
                "type": r.region_type.as_str(),
                "pageOrSheet": r.page_or_sheet,
                "tokenEstimate": r.token_estimate,
            })
        })
        .collect();

    let context_block = user_context
        .map(|c| format!("UPLOADER CONTEXT:\n{c}\n\n"))
        .unwrap_or_default();

    format!(
        "{context_block}PAGE COUNT: {page_count}\n\nREGIONS:\n{}\n\nFULL DOCUMENT CONTENT:\n{full_content}",
        to_json(&region_index)
    )
}

// ═══════════════════════════════════════════════════════════
// Region extraction
// ═══════════════════════════════════════════════════════════

pub fn extract_system(mode: JobMode) -> String {
    let base = "You are a breakdown-structure extractor. From one region of \
                document evidence, produce a flat list of breakdown nodes. Every \
                node must carry a verbatim quote from the region text as \
                provenance. List any evidence you chose not to convert under \
                unmappedContent with a reason. Output JSON only with keys \
                regionId, confidence, notes, nodes, unmappedContent.";
    match mode {
        JobMode::Strict => format!(
            "{base} STRICT MODE: never infer structure. Set inferred=false on \
             every node. When a parent is ambiguous, leave parentId null and \
             add a warning explaining the ambiguity."
        ),
        JobMode::BestJudgment => format!(
            "{base} BEST-JUDGMENT MODE: you may set inferred=true when hierarchy \
             is implied by layout or numbering, and every inferred node must \
             carry a warning explaining why it was inferred."
        ),
    }
}

pub fn extract_user(
    region: &Region,
    guidance: Option<&RegionContext>,
    column_decision: Option<&ColumnDecision>,
) -> String {
    let guidance_block = match guidance {
        Some(context) => format!("REGION GUIDANCE:\n{}\n\n", to_json(context)),
        None => String::new(),
    };
    let decision_block = match column_decision {
        Some(decision) if decision.treat_as_nodes => {
            "COLUMN DECISION: detected column headers ARE breakdown nodes; \
             extract them as such.\n\n"
        }
        Some(_) => {
            "COLUMN DECISION: detected column headers are informational only; \
             do NOT extract a node for a column header.\n\n"
        }
        None => "",
    };

    format!(
        "REGION:\n{}\n\n{guidance_block}{decision_block}EVIDENCE TEXT:\n{}",
        to_json(&serde_json::json!({
            "regionId": region.region_id,
            "type": region.region_type.as_str(),
            "pageOrSheet": region.page_or_sheet,
        })),
        region.text
    )
}

// ═══════════════════════════════════════════════════════════
// Verification
// ═══════════════════════════════════════════════════════════

pub fn verify_system(mode: JobMode) -> String {
    let base = "You are a breakdown-structure verifier. Given a consolidated \
                draft, its validation report, and the region evidence, correct \
                the node list, report issues, and decide whether any regions \
                need a second-opinion re-extraction. Output JSON only with keys \
                correctedNodes, issues, escalationPlan {needed, targetRegionIds, \
                reason}.";
    match mode {
        JobMode::Strict => format!(
            "{base} STRICT MODE: never set inferred=true on any corrected node."
        ),
        JobMode::BestJudgment => format!(
            "{base} BEST-JUDGMENT MODE: you may set inferred=true, and every \
             inferred node must carry a warning explaining why."
        ),
    }
}

pub fn verify_user(nodes: &[Node], report: &ValidationReport, regions: &[Region]) -> String {
    let evidence: Vec<serde_json::Value> = regions
        .iter()
        .map(|r| {
            serde_json::json!({
                "regionId": r.region_id,
                "pageOrSheet": r.page_or_sheet,
                "markdownContent": r.text,
            })
        })
        .collect();

    format!(
        "DRAFT NODES:\n{}\n\nVALIDATION REPORT:\n{}\n\nREGION EVIDENCE:\n{}",
        to_json(&nodes),
        to_json(report),
        to_json(&evidence)
    )
}

// ═══════════════════════════════════════════════════════════
// Judge
// ═══════════════════════════════════════════════════════════

pub fn judge_system() -> String {
    "You are an evidence-based judge selecting or merging candidate breakdown \
     extractions for a single region. Prefer evidence support over completeness. \
     Output JSON only with keys selected {strategy: \"pick_one\" or \"merge\", \
     winningCandidate, selectedNodes}, rationale, problems."
        .to_string()
}

pub fn judge_user(mode: JobMode, region: &Region, candidates: &[Candidate]) -> String {
    format!(
        "MODE: {mode}\n\nREGION:\n{}\n\nEVIDENCE TEXT:\n{}\n\nEVIDENCE REFS:\n{}\n\nCANDIDATES:\n{}",
        to_json(&serde_json::json!({
            "regionId": region.region_id,
            "pageOrSheet": region.page_or_sheet,
        })),
        region.text,
        to_json(&region.evidence_refs),
        to_json(&candidates)
    )
}

// ═══════════════════════════════════════════════════════════
// Summary
// ═══════════════════════════════════════════════════════════

pub fn summary_system() -> String {
    "You summarize a finished breakdown-extraction run for a human reader. \
     Cover what was extracted, notable quality-control findings, and anything \
     the reader should double-check. Output JSON only with keys summary, \
     highlights, qcNotes."
        .to_string()
}

pub fn summary_user(
    mode: JobMode,
    nodes: &[Node],
    report: &ValidationReport,
    issues: &[VerifierIssue],
) -> String {
    format!(
        "MODE: {mode}\nNODE COUNT: {}\n\nNODES:\n{}\n\nVALIDATION REPORT:\n{}\n\nVERIFIER ISSUES:\n{}",
        nodes.len(),
        to_json(&nodes),
        to_json(report),
        to_json(&issues)
    )
}

// ═══════════════════════════════════════════════════════════
// Shared helpers
// ═══════════════════════════════════════════════════════════

/// Full-document content for the analysis pass: the normalized content
/// string when the backend provided one, otherwise a concatenation of all
/// region texts with page markers.
pub fn full_document_content(content: &str, regions: &[Region]) -> String {
    if !content.is_empty() {
        return content.to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current_page = String::new();
    for region in regions {
        if region.page_or_sheet != current_page {
            current_page = region.page_or_sheet.clone();
            parts.push(format!("\n=== {} ===\n", current_page.to_uppercase()));
        }
        parts.push(region.text.clone());
    }
    parts.join("\n")
}

/// Reconcile analysis guidance against the actual region list: any region
/// missing a guidance entry gets a default entry and a warning. The
/// pipeline never proceeds with a region silently unaddressed.
pub fn ensure_complete_guidance(
    mut analysis: GlobalAnalysis,
    regions: &[Region],
) -> GlobalAnalysis {
    for region in regions {
        if analysis
            .region_guidance
            .iter()
            .any(|g| g.region_id == region.region_id)
        {
            continue;
        }
        analysis
            .region_guidance
            .push(crate::models::RegionGuidance {
                region_id: region.region_id.clone(),
                page_or_sheet: region.page_or_sheet.clone(),
                context: RegionContext {
                    layout_hint: match region.region_type {
                        crate::models::RegionType::Table => crate::models::LayoutHint::Table,
                        _ => crate::models::LayoutHint::Unknown,
                    },
                    extraction_notes:
                        "No specific guidance available. Extract items as found.".to_string(),
                    ..Default::default()
                },
            });
        analysis
            .warnings
            .push(format!("missing_guidance_for_region:{}", region.region_id));
    }
    analysis
}
