//! Job identity and lifecycle record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// How much latitude extraction passes have.
///
/// `Strict` forbids inference entirely; `BestJudgment` allows nodes whose
/// hierarchy is implied by layout or numbering, flagged and explained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    Strict,
    BestJudgment,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::BestJudgment => "best_judgment",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "strict" => Ok(Self::Strict),
            "best_judgment" => Ok(Self::BestJudgment),
            other => Err(PipelineError::InvalidMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle state. `AwaitingInput` is the only non-linear stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    AwaitingInput,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::AwaitingInput => "awaiting_input",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The durable per-job record.
///
/// Created once at ingestion, mutated only at orchestrator checkpoints
/// (running, completed, failed, final counts). Immutable after a terminal
/// state except for the error text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub mode: JobMode,
    pub state: JobState,

    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub file_hash_sha256: String,

    /// Object-storage key of the uploaded file.
    pub upload_key: String,
    /// Namespace prefix under which this job's artifacts are written.
    pub artifacts_prefix: String,

    pub created_at: String,
    pub updated_at: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferred_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Free-form per-job options. Recognized keys: `user_context`
    /// (threaded into the analysis prompt) and `skip_cache`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl JobRecord {
    /// Extra context the uploader supplied about the document.
    pub fn user_context(&self) -> Option<&str> {
        self.options.get("user_context").and_then(|v| v.as_str())
    }

    /// Whether this job opted out of the document-understanding cache.
    pub fn skip_cache(&self) -> bool {
        self.options
            .get("skip_cache")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Final QC figures recorded on the job at completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub node_count: u32,
    pub inferred_count: u32,
    pub coverage_ratio: f64,
}
