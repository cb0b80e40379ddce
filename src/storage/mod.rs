//! Storage collaborator contracts.
//!
//! Object storage, the TTL cache, and the job/node records are external
//! services; the pipeline consumes them exclusively through these traits.
//! In-memory adapters live in `memory` for tests and for embedders that
//! bring no external services.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PipelineError;
use crate::models::{JobOutcome, JobRecord, Node};

pub use memory::{MemoryCacheStore, MemoryJobStore, MemoryNodeStore, MemoryObjectStore};

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub uploaded_at: String,
}

/// Durable key-value object storage. Writes are whole-object replaces.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PipelineError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError>;
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, PipelineError>;
}

/// Cache store with TTL. Advisory: a miss is never an error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PipelineError>;
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), PipelineError>;
}

/// The job record database.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &JobRecord) -> Result<(), PipelineError>;
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, PipelineError>;
    async fn mark_running(&self, job_id: &str) -> Result<(), PipelineError>;
    async fn mark_completed(
        &self,
        job_id: &str,
        outcome: &JobOutcome,
    ) -> Result<(), PipelineError>;
    async fn mark_failed(&self, job_id: &str, error: &str) -> Result<(), PipelineError>;
}

/// Persisted breakdown nodes, replaced wholesale per job.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn replace_for_job(&self, job_id: &str, nodes: &[Node]) -> Result<(), PipelineError>;
    async fn list_for_job(&self, job_id: &str) -> Result<Vec<Node>, PipelineError>;
}

// ═══════════════════════════════════════════════════════════
// Artifact writer
// ═══════════════════════════════════════════════════════════

/// Namespaced JSON/text artifact access for one job.
///
/// Every pipeline step archives its output under
/// `artifacts/{job_id}/{name}` before the next step runs. A step may
/// overwrite its own artifact on retry but never another step's.
#[derive(Clone)]
pub struct ArtifactWriter {
    store: Arc<dyn ObjectStore>,
    job_id: String,
}

impl ArtifactWriter {
    pub fn new(store: Arc<dyn ObjectStore>, job_id: &str) -> Self {
        Self {
            store,
            job_id: job_id.to_string(),
        }
    }

    pub fn key(&self, name: &str) -> String {
        format!("artifacts/{}/{}", self.job_id, name)
    }

    pub async fn put_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), PipelineError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.store
            .put(&self.key(name), bytes, "application/json")
            .await
    }

    pub async fn put_text(&self, name: &str, text: &str) -> Result<(), PipelineError> {
        self.store
            .put(&self.key(name), text.as_bytes().to_vec(), "text/plain")
            .await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, PipelineError> {
        match self.store.get(&self.key(name)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn artifact_writer_namespaces_by_job() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let artifacts = ArtifactWriter::new(store.clone(), "job-1");

        artifacts
            .put_json("regions.json", &serde_json::json!([1, 2, 3]))
            .await
            .unwrap();

        let listed = store.list("artifacts/job-1/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "artifacts/job-1/regions.json");

        let value: Option<serde_json::Value> = artifacts.get_json("regions.json").await.unwrap();
        assert_eq!(value.unwrap(), serde_json::json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn artifact_writer_misses_cleanly() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let artifacts = ArtifactWriter::new(store, "job-1");
        let value: Option<serde_json::Value> = artifacts.get_json("absent.json").await.unwrap();
        assert!(value.is_none());
    }
}
