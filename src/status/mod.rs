//! Job status hub: the single owner of live per-job status.
//!
//! Every other component requests a patch or an append; nothing mutates
//! status directly. Each mutation persists the new snapshot through the
//! `StatusStore` before broadcasting the full snapshot to all subscribers.
//! Subscribers reconcile by taking the latest snapshot, never by diffing,
//! and a late joiner receives the current snapshot immediately.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex};

use crate::error::PipelineError;
use crate::models::{JobState, JobStatus, PendingInput, StatusLevel, StatusMessage};
use crate::models::status::StatusError;

const BROADCAST_CAPACITY: usize = 64;

// ═══════════════════════════════════════════════════════════
// Persistence
// ═══════════════════════════════════════════════════════════

/// Durable backing for status snapshots.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn save(&self, status: &JobStatus) -> Result<(), PipelineError>;
    async fn load(&self, job_id: &str) -> Result<Option<JobStatus>, PipelineError>;
}

#[derive(Default)]
pub struct MemoryStatusStore {
    snapshots: std::sync::Mutex<HashMap<String, JobStatus>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn save(&self, status: &JobStatus) -> Result<(), PipelineError> {
        self.snapshots
            .lock()
            .unwrap()
            .insert(status.job_id.clone(), status.clone());
        Ok(())
    }

    async fn load(&self, job_id: &str) -> Result<Option<JobStatus>, PipelineError> {
        Ok(self.snapshots.lock().unwrap().get(job_id).cloned())
    }
}

// ═══════════════════════════════════════════════════════════
// Patches
// ═══════════════════════════════════════════════════════════

/// A partial status update. Unset fields leave the snapshot untouched;
/// a `message` additionally appends to the message log.
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    pub state: Option<JobState>,
    pub step: Option<String>,
    pub percent: Option<u8>,
    pub message: Option<String>,
    pub pending_input: Option<PendingInput>,
    pub clear_pending_input: bool,
}

impl StatusPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn step(mut self, step: &str) -> Self {
        self.step = Some(step.to_string());
        self
    }

    pub fn percent(mut self, percent: u8) -> Self {
        self.percent = Some(percent);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn pending_input(mut self, input: PendingInput) -> Self {
        self.pending_input = Some(input);
        self
    }

    pub fn clear_pending_input(mut self) -> Self {
        self.clear_pending_input = true;
        self
    }
}

// ═══════════════════════════════════════════════════════════
// Hub
// ═══════════════════════════════════════════════════════════

struct JobEntry {
    status: JobStatus,
    sender: broadcast::Sender<JobStatus>,
}

/// Owns the `job_id -> JobStatus` map and the subscriber fan-out.
pub struct StatusHub {
    entries: Mutex<HashMap<String, JobEntry>>,
    store: Arc<dyn StatusStore>,
}

impl StatusHub {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Create the initial `queued` snapshot for a job.
    pub async fn init(&self, job_id: &str) -> Result<JobStatus, PipelineError> {
        let now = Utc::now().to_rfc3339();
        let status = JobStatus {
            job_id: job_id.to_string(),
            state: JobState::Queued,
            step: "init".to_string(),
            percent: 0,
            messages: vec![StatusMessage {
                ts: now.clone(),
                level: StatusLevel::Info,
                text: "Job initialized".to_string(),
                data: None,
            }],
            errors: Vec::new(),
            pending_input: None,
            updated_at: now,
        };

        let mut entries = self.entries.lock().await;
        self.store.save(&status).await?;
        let entry = entries
            .entry(job_id.to_string())
            .or_insert_with(|| JobEntry {
                status: status.clone(),
                sender: broadcast::channel(BROADCAST_CAPACITY).0,
            });
        entry.status = status.clone();
        let _ = entry.sender.send(status.clone());
        Ok(status)
    }

    /// Merge a partial update into the snapshot.
    ///
    /// Terminal states are sticky: once a job is `completed` or `failed`,
    /// a patch naming a different state is rejected.
    pub async fn set(&self, job_id: &str, patch: StatusPatch) -> Result<JobStatus, PipelineError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(job_id.to_string())
            .or_insert_with(|| JobEntry {
                status: default_snapshot(job_id),
                sender: broadcast::channel(BROADCAST_CAPACITY).0,
            });

        if entry.status.state.is_terminal() && patch.state != Some(entry.status.state) {
            return Err(PipelineError::TerminalStatus {
                job_id: job_id.to_string(),
                state: entry.status.state.as_str().to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        let status = &mut entry.status;
        if let Some(state) = patch.state {
            status.state = state;
        }
        if let Some(step) = patch.step {
            status.step = step;
        }
        if let Some(percent) = patch.percent {
            status.percent = percent;
        }
        if let Some(input) = patch.pending_input {
            status.pending_input = Some(input);
        } else if patch.clear_pending_input {
            status.pending_input = None;
        }
        if let Some(text) = patch.message {
            status.messages.push(StatusMessage {
                ts: now.clone(),
                level: StatusLevel::Info,
                text,
                data: None,
            });
        }
        status.updated_at = now;

        let snapshot = status.clone();
        self.store.save(&snapshot).await?;
        let _ = entry.sender.send(snapshot.clone());
        Ok(snapshot)
    }

    /// Append a log entry without touching step or percent. Errors are
    /// mirrored into the error log.
    pub async fn append(
        &self,
        job_id: &str,
        level: StatusLevel,
        text: &str,
        data: Option<serde_json::Value>,
    ) -> Result<JobStatus, PipelineError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(job_id)
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;

        let now = Utc::now().to_rfc3339();
        entry.status.messages.push(StatusMessage {
            ts: now.clone(),
            level,
            text: text.to_string(),
            data: data.clone(),
        });
        if level == StatusLevel::Error {
            entry.status.errors.push(StatusError {
                ts: now.clone(),
                text: text.to_string(),
                data,
            });
        }
        entry.status.updated_at = now;

        let snapshot = entry.status.clone();
        self.store.save(&snapshot).await?;
        let _ = entry.sender.send(snapshot.clone());
        Ok(snapshot)
    }

    /// The current snapshot, if the job is known.
    pub async fn get(&self, job_id: &str) -> Option<JobStatus> {
        self.entries
            .lock()
            .await
            .get(job_id)
            .map(|e| e.status.clone())
    }

    /// Subscribe to a job's status stream.
    ///
    /// Returns the current snapshot immediately together with the live
    /// receiver; no replay of historical messages beyond what the snapshot
    /// log embeds.
    pub async fn subscribe(
        &self,
        job_id: &str,
    ) -> Option<(JobStatus, broadcast::Receiver<JobStatus>)> {
        self.entries
            .lock()
            .await
            .get(job_id)
            .map(|e| (e.status.clone(), e.sender.subscribe()))
    }
}

fn default_snapshot(job_id: &str) -> JobStatus {
    JobStatus {
        job_id: job_id.to_string(),
        state: JobState::Queued,
        step: "unknown".to_string(),
        percent: 0,
        messages: Vec::new(),
        errors: Vec::new(),
        pending_input: None,
        updated_at: Utc::now().to_rfc3339(),
    }
}
