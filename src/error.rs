//! Pipeline error taxonomy.
//!
//! Every failure in the pipeline is either transient (network trouble,
//! provider hiccups, malformed model output) and worth retrying, or fatal
//! (bad input, missing records, an unanswered human question) and grounds
//! for aborting the whole run. Data-quality findings are never errors;
//! they travel as report artifacts.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Network-level failure reaching an external service.
    #[error("transport error: {0}")]
    Transport(String),

    /// An external service answered with a non-success status.
    #[error("{service} returned status {status}: {body}")]
    ServiceStatus {
        service: String,
        status: u16,
        body: String,
    },

    /// The model's raw text could not be turned into the expected JSON.
    #[error("model output was not parseable JSON: {0}")]
    MalformedModelOutput(String),

    /// The judge named a candidate that was never run.
    #[error("judge selected unknown candidate: {0}")]
    UnknownCandidate(String),

    /// A storage adapter failed.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid job mode: {0}")]
    InvalidMode(String),

    /// The uploaded file is missing from object storage.
    #[error("upload object missing: {0}")]
    MissingUpload(String),

    /// The human decision never arrived within the wait window.
    #[error("timed out waiting for answer to question {question_id}")]
    AnswerTimeout { question_id: String },

    /// An answer was submitted for a question nobody is waiting on.
    #[error("no pending question {question_id} for job {job_id}")]
    UnknownQuestion { job_id: String, question_id: String },

    /// A status patch tried to move a job out of a terminal state.
    #[error("job {job_id} is already {state}; status is terminal")]
    TerminalStatus { job_id: String, state: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether the step runner should retry after this failure.
    ///
    /// Transient transport and provider conditions are retryable, as is
    /// malformed model output (a fresh generation usually parses).
    /// Everything that reflects bad input or an absent human answer is
    /// fatal and aborts the run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::ServiceStatus { .. }
                | Self::MalformedModelOutput(_)
                | Self::UnknownCandidate(_)
                | Self::Storage(_)
        )
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(PipelineError::Transport("connection reset".into()).is_retryable());
        assert!(PipelineError::ServiceStatus {
            service: "docint".into(),
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(PipelineError::MalformedModelOutput("no JSON".into()).is_retryable());
        assert!(PipelineError::Storage("write failed".into()).is_retryable());
    }

    #[test]
    fn fatal_errors_are_not_retryable() {
        assert!(!PipelineError::JobNotFound("job-1".into()).is_retryable());
        assert!(!PipelineError::InvalidMode("lenient".into()).is_retryable());
        assert!(!PipelineError::MissingUpload("uploads/x".into()).is_retryable());
        assert!(!PipelineError::AnswerTimeout {
            question_id: "q-1".into()
        }
        .is_retryable());
    }

    #[test]
    fn error_messages_carry_context() {
        let err = PipelineError::ServiceStatus {
            service: "anthropic".into(),
            status: 429,
            body: "rate limited".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("anthropic"));
        assert!(msg.contains("429"));
    }
}
