//! Human-in-the-loop answer channel.
//!
//! The column-decision gate is the only long-duration suspension point in
//! the pipeline: the orchestrator registers a question here and waits (with
//! a hard timeout) for an external answer submission to resolve it.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::PipelineError;

/// The answer to a column-decision question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDecision {
    /// Whether detected column headers become breakdown nodes themselves
    /// or stay informational organization.
    pub treat_as_nodes: bool,
}

struct PendingQuestion {
    question_id: String,
    sender: oneshot::Sender<serde_json::Value>,
}

/// Registry of questions currently awaiting an answer, one per job.
#[derive(Default)]
pub struct AnswerHub {
    pending: Mutex<HashMap<String, PendingQuestion>>,
}

impl AnswerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a question and receive the channel its answer arrives on.
    /// A job can only wait on one question at a time; re-asking replaces
    /// the previous registration.
    pub fn ask(&self, job_id: &str, question_id: &str) -> oneshot::Receiver<serde_json::Value> {
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().unwrap().insert(
            job_id.to_string(),
            PendingQuestion {
                question_id: question_id.to_string(),
                sender,
            },
        );
        receiver
    }

    /// Resolve a pending question with its answer.
    pub fn submit(
        &self,
        job_id: &str,
        question_id: &str,
        answer: serde_json::Value,
    ) -> Result<(), PipelineError> {
        let question = {
            let mut pending = self.pending.lock().unwrap();
            match pending.get(job_id) {
                Some(q) if q.question_id == question_id => pending.remove(job_id),
                _ => None,
            }
        };

        match question {
            Some(q) => q
                .sender
                .send(answer)
                .map_err(|_| PipelineError::UnknownQuestion {
                    job_id: job_id.to_string(),
                    question_id: question_id.to_string(),
                }),
            None => Err(PipelineError::UnknownQuestion {
                job_id: job_id.to_string(),
                question_id: question_id.to_string(),
            }),
        }
    }

    /// Whether a job currently has a question outstanding.
    pub fn has_pending(&self, job_id: &str) -> bool {
        self.pending.lock().unwrap().contains_key(job_id)
    }
}
