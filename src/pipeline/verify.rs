//! Verification: one AI pass over the consolidated draft.
//!
//! The verifier corrects the node list, reports structured issues, and may
//! emit an escalation plan naming regions that deserve a second opinion.
//! Strict mode never lets an inferred flag through.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::llm::{generate_json, GenerationClient, GenerationRequest, LlmSelection};
use crate::models::{JobMode, Node, Region, ValidationReport};
use crate::pipeline::extract::INFERRED_CLEARED_WARNING;
use crate::pipeline::prompts;

const VERIFY_TEMPERATURE: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerifierIssue {
    #[serde(default)]
    pub severity: IssueSeverity,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub region_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EscalationPlan {
    #[serde(default)]
    pub needed: bool,
    #[serde(default)]
    pub target_region_ids: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutput {
    #[serde(default)]
    pub corrected_nodes: Vec<Node>,
    #[serde(default)]
    pub issues: Vec<VerifierIssue>,
    #[serde(default)]
    pub escalation_plan: EscalationPlan,
}

/// Verifier output plus the prompts and raw text for artifact archival.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub output: VerifyOutput,
    pub raw_text: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Run the verification pass.
pub async fn verify_document(
    client: &dyn GenerationClient,
    selection: &LlmSelection,
    mode: JobMode,
    nodes: &[Node],
    report: &ValidationReport,
    regions: &[Region],
) -> Result<VerifyOutcome, PipelineError> {
    let request = GenerationRequest::new(selection, VERIFY_TEMPERATURE);
    let system = prompts::verify_system(mode);
    let user = prompts::verify_user(nodes, report, regions);

    let (mut output, raw_text): (VerifyOutput, String) =
        generate_json(client, &request, &system, &user).await?;

    if mode == JobMode::Strict {
        for node in &mut output.corrected_nodes {
            if node.inferred {
                node.inferred = false;
                node.warnings.push(INFERRED_CLEARED_WARNING.to_string());
            }
        }
    }

    Ok(VerifyOutcome {
        output,
        raw_text,
        system_prompt: system,
        user_prompt: user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelTier, MockGenerationClient, Provider};
    use crate::pipeline::validate::validate_nodes;

    fn selection() -> LlmSelection {
        LlmSelection::new(Provider::Anthropic, ModelTier::Large)
    }

    fn draft() -> Vec<Node> {
        vec![Node::new("n1", "Foundation")
            .with_level("1")
            .with_region("r1")
            .with_quote("1 Foundation")]
    }

    #[tokio::test]
    async fn parses_corrections_and_escalation_plan() {
        let response = r#"{
            "correctedNodes": [{"id": "n1", "title": "Foundation", "level": "1"}],
            "issues": [{"severity": "warn", "nodeId": "n1", "message": "title shortened", "regionId": "r1"}],
            "escalationPlan": {"needed": true, "targetRegionIds": ["r7"], "reason": "ambiguous table"}
        }"#;
        let client = MockGenerationClient::new(response);

        let outcome = verify_document(
            &client,
            &selection(),
            JobMode::Strict,
            &draft(),
            &validate_nodes(&draft(), &[]),
            &[],
        )
        .await
        .unwrap();

        assert_eq!(outcome.output.corrected_nodes.len(), 1);
        assert_eq!(outcome.output.issues.len(), 1);
        assert_eq!(outcome.output.issues[0].severity, IssueSeverity::Warn);
        assert!(outcome.output.escalation_plan.needed);
        assert_eq!(outcome.output.escalation_plan.target_region_ids, vec!["r7"]);
    }

    #[tokio::test]
    async fn missing_fields_default_to_no_escalation() {
        let response = r#"{"correctedNodes": []}"#;
        let client = MockGenerationClient::new(response);

        let outcome = verify_document(
            &client,
            &selection(),
            JobMode::Strict,
            &draft(),
            &validate_nodes(&draft(), &[]),
            &[],
        )
        .await
        .unwrap();

        assert!(!outcome.output.escalation_plan.needed);
        assert!(outcome.output.issues.is_empty());
    }

    #[tokio::test]
    async fn strict_mode_strips_inferred_from_corrections() {
        let response = r#"{
            "correctedNodes": [{"id": "n1", "title": "Guessed", "inferred": true}]
        }"#;
        let client = MockGenerationClient::new(response);

        let outcome = verify_document(
            &client,
            &selection(),
            JobMode::Strict,
            &draft(),
            &validate_nodes(&draft(), &[]),
            &[],
        )
        .await
        .unwrap();

        let node = &outcome.output.corrected_nodes[0];
        assert!(!node.inferred);
        assert!(node.warnings.contains(&INFERRED_CLEARED_WARNING.to_string()));
    }

    #[tokio::test]
    async fn best_judgment_keeps_inferred_corrections() {
        let response = r#"{
            "correctedNodes": [{"id": "n1", "title": "Implied", "inferred": true, "warnings": ["numbering implies parent"]}]
        }"#;
        let client = MockGenerationClient::new(response);

        let outcome = verify_document(
            &client,
            &selection(),
            JobMode::BestJudgment,
            &draft(),
            &validate_nodes(&draft(), &[]),
            &[],
        )
        .await
        .unwrap();

        assert!(outcome.output.corrected_nodes[0].inferred);
    }

    #[tokio::test]
    async fn uses_verify_temperature() {
        let client = MockGenerationClient::new(r#"{"correctedNodes": []}"#);
        verify_document(
            &client,
            &selection(),
            JobMode::Strict,
            &draft(),
            &validate_nodes(&draft(), &[]),
            &[],
        )
        .await
        .unwrap();
        assert_eq!(client.calls()[0].temperature, VERIFY_TEMPERATURE);
    }
}
