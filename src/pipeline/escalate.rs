//! Escalation: multi-candidate re-extraction plus a judged merge.
//!
//! For each region the verifier flagged, the region extractor runs once per
//! candidate provider/model configuration, all in parallel, and a single
//! judge pass either picks one candidate wholesale or merges them. Patches
//! then replace the original nodes for those regions.

use std::collections::{BTreeMap, HashSet};

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::llm::{generate_json, GenerationClient, GenerationRequest, LlmSelection, Provider};
use crate::models::{JobMode, Node, Region};
use crate::pipeline::extract::extract_region;
use crate::pipeline::prompts;

const JUDGE_TEMPERATURE: f32 = 0.1;

/// One provider/model configuration competing in the escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSpec {
    pub name: String,
    pub selection: LlmSelection,
}

impl CandidateSpec {
    pub fn new(selection: LlmSelection) -> Self {
        Self {
            name: format!("{}_candidate", selection.provider),
            selection,
        }
    }
}

/// One candidate's extraction result as presented to the judge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub name: String,
    pub provider: Provider,
    pub model: String,
    pub nodes: Vec<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The judge's decision, validated against the candidate set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum JudgeDecision {
    PickOne { candidate: String },
    Merge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProblem {
    #[serde(default)]
    pub candidate: String,
    #[serde(default)]
    pub issue: String,
}

/// The judged replacement for one escalated region.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionPatch {
    pub decision: JudgeDecision,
    pub nodes: Vec<Node>,
    pub rationale: String,
    pub problems: Vec<CandidateProblem>,
}

// Judge response, before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawJudge {
    #[serde(default)]
    selected: RawSelected,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    problems: Vec<CandidateProblem>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawSelected {
    #[serde(default)]
    strategy: String,
    #[serde(default)]
    winning_candidate: Option<String>,
    #[serde(default)]
    selected_nodes: Vec<Node>,
}

/// Everything the escalation pass needs for one run.
pub struct EscalationRequest<'a> {
    pub mode: JobMode,
    pub target_region_ids: &'a [String],
    pub regions: &'a [Region],
    pub candidates: &'a [CandidateSpec],
    pub judge: &'a LlmSelection,
}

/// Run candidate extractions and the judge for every target region.
///
/// Unknown target region ids are skipped; the verifier may hallucinate one
/// and that must not sink the run.
pub async fn escalate_and_judge(
    client: &dyn GenerationClient,
    request: &EscalationRequest<'_>,
) -> Result<BTreeMap<String, RegionPatch>, PipelineError> {
    let mut patches = BTreeMap::new();

    for region_id in request.target_region_ids {
        let Some(region) = request.regions.iter().find(|r| &r.region_id == region_id) else {
            tracing::warn!(region_id = %region_id, "escalation target not found, skipping");
            continue;
        };

        let extractions = try_join_all(request.candidates.iter().map(|spec| async move {
            let outcome =
                extract_region(client, &spec.selection, request.mode, region, None, None).await?;
            Ok::<Candidate, PipelineError>(Candidate {
                name: spec.name.clone(),
                provider: spec.selection.provider,
                model: spec.selection.model.clone(),
                nodes: outcome.extraction.nodes,
                notes: (!outcome.extraction.notes.is_empty())
                    .then(|| outcome.extraction.notes.clone()),
            })
        }))
        .await?;

        let judge_request = GenerationRequest::new(request.judge, JUDGE_TEMPERATURE);
        let system = prompts::judge_system();
        let user = prompts::judge_user(request.mode, region, &extractions);
        let (raw, _raw_text): (RawJudge, String) =
            generate_json(client, &judge_request, &system, &user).await?;

        let (decision, nodes) = apply_decision(raw.selected, &extractions)?;
        tracing::info!(
            region_id = %region_id,
            nodes = nodes.len(),
            decision = ?decision,
            "escalation judged"
        );

        patches.insert(
            region_id.clone(),
            RegionPatch {
                decision,
                nodes,
                rationale: raw.rationale,
                problems: raw.problems,
            },
        );
    }

    Ok(patches)
}

/// Validate the judge's raw selection against the candidate set and
/// resolve the winning node list.
fn apply_decision(
    selected: RawSelected,
    candidates: &[Candidate],
) -> Result<(JudgeDecision, Vec<Node>), PipelineError> {
    match selected.strategy.as_str() {
        "pick_one" => {
            let name = selected
                .winning_candidate
                .ok_or_else(|| PipelineError::UnknownCandidate("<unspecified>".to_string()))?;
            let candidate = candidates
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| PipelineError::UnknownCandidate(name.clone()))?;
            Ok((
                JudgeDecision::PickOne { candidate: name },
                candidate.nodes.clone(),
            ))
        }
        // An absent strategy means the judge went straight to a node list.
        "merge" | "" => Ok((JudgeDecision::Merge, selected.selected_nodes)),
        other => Err(PipelineError::MalformedModelOutput(format!(
            "unknown judge strategy: {other}"
        ))),
    }
}

/// Merge judged patches into the verifier's corrected node set.
///
/// Every node whose provenance points at an escalated region is removed,
/// the judged nodes are inserted, and the result is de-duplicated by id
/// with the last occurrence winning, so judged nodes beat anything that
/// was previously present under the same id.
pub fn merge_patches(
    corrected: &[Node],
    target_region_ids: &[String],
    patches: &BTreeMap<String, RegionPatch>,
) -> Vec<Node> {
    let targets: HashSet<&str> = target_region_ids.iter().map(String::as_str).collect();

    let mut merged: Vec<Node> = corrected
        .iter()
        .filter(|n| !targets.contains(n.provenance.region_id.as_str()))
        .cloned()
        .collect();
    for patch in patches.values() {
        merged.extend(patch.nodes.iter().cloned());
    }

    // Keep the last occurrence of each id.
    let mut seen: HashSet<&str> = HashSet::new();
    let mut deduped: Vec<Node> = Vec::with_capacity(merged.len());
    for node in merged.iter().rev() {
        if seen.insert(node.id.as_str()) {
            deduped.push(node.clone());
        }
    }
    deduped.reverse();
    deduped
}
