//! Summary: one AI pass producing the human-readable run wrap-up.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::llm::{generate_json, GenerationClient, GenerationRequest, LlmSelection};
use crate::models::{JobMode, Node, ValidationReport};
use crate::pipeline::prompts;
use crate::pipeline::verify::VerifierIssue;

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 2_048;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub qc_notes: Vec<String>,
}

/// Generate the result summary for a finished run.
pub async fn generate_summary(
    client: &dyn GenerationClient,
    selection: &LlmSelection,
    mode: JobMode,
    nodes: &[Node],
    report: &ValidationReport,
    issues: &[VerifierIssue],
) -> Result<(RunSummary, String), PipelineError> {
    let request =
        GenerationRequest::new(selection, SUMMARY_TEMPERATURE).with_max_tokens(SUMMARY_MAX_TOKENS);
    let system = prompts::summary_system();
    let user = prompts::summary_user(mode, nodes, report, issues);
    generate_json(client, &request, &system, &user).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelTier, MockGenerationClient, Provider};
    use crate::pipeline::validate::validate_nodes;

    #[tokio::test]
    async fn parses_summary_with_highlights() {
        let response = r#"{
            "summary": "Extracted 14 nodes across 3 pages.",
            "highlights": ["clean outline numbering"],
            "qcNotes": ["2 duplicate titles merged"]
        }"#;
        let client = MockGenerationClient::new(response);
        let selection = LlmSelection::new(Provider::Openai, ModelTier::Small);

        let (summary, raw) = generate_summary(
            &client,
            &selection,
            JobMode::Strict,
            &[],
            &validate_nodes(&[], &[]),
            &[],
        )
        .await
        .unwrap();

        assert!(summary.summary.contains("14 nodes"));
        assert_eq!(summary.highlights.len(), 1);
        assert_eq!(summary.qc_notes.len(), 1);
        assert!(raw.contains("14 nodes"));
    }

    #[tokio::test]
    async fn bounds_output_tokens() {
        let client = MockGenerationClient::new(r#"{"summary": "ok"}"#);
        let selection = LlmSelection::new(Provider::Openai, ModelTier::Small);
        generate_summary(
            &client,
            &selection,
            JobMode::Strict,
            &[],
            &validate_nodes(&[], &[]),
            &[],
        )
        .await
        .unwrap();

        let call = &client.calls()[0];
        assert_eq!(call.temperature, SUMMARY_TEMPERATURE);
    }
}
