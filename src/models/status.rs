//! Live job status projection.
//!
//! One `JobStatus` per job, owned exclusively by the status hub. Subscribers
//! always receive the full snapshot and reconcile by taking the latest one,
//! never by diffing.

use serde::{Deserialize, Serialize};

use super::job::JobState;
use crate::models::DocumentPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Warn,
    Error,
}

impl StatusLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub ts: String,
    pub level: StatusLevel,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusError {
    pub ts: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A structured question the pipeline is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInput {
    pub question_id: String,
    /// Question kind; currently only "column_decision".
    pub kind: String,
    pub column_headers: Vec<String>,
    pub document_pattern: DocumentPattern,
    /// Human-readable prompt shown to the person answering.
    pub prompt: String,
}

/// Full status snapshot for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    pub step: String,
    pub percent: u8,
    pub messages: Vec<StatusMessage>,
    pub errors: Vec<StatusError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_input: Option<PendingInput>,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serde_roundtrip() {
        let status = JobStatus {
            job_id: "job-1".into(),
            state: JobState::Running,
            step: "extract_regions".into(),
            percent: 42,
            messages: vec![StatusMessage {
                ts: "2026-01-01T00:00:00Z".into(),
                level: StatusLevel::Info,
                text: "Extracting regions 1-3 of 7".into(),
                data: None,
            }],
            errors: vec![],
            pending_input: None,
            updated_at: "2026-01-01T00:00:00Z".into(),
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"jobId\":\"job-1\""));
        assert!(json.contains("\"state\":\"running\""));
        assert!(!json.contains("pendingInput"), "absent question is skipped");

        let parsed: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn pending_input_serializes_headers() {
        let input = PendingInput {
            question_id: "q-1".into(),
            kind: "column_decision".into(),
            column_headers: vec!["Predesign".into(), "DD".into()],
            document_pattern: DocumentPattern::Matrix,
            prompt: "Treat columns as nodes?".into(),
        };
        let json = serde_json::to_string(&input).unwrap();
        assert!(json.contains("\"columnHeaders\":[\"Predesign\",\"DD\"]"));
        assert!(json.contains("\"documentPattern\":\"matrix\""));
    }
}
