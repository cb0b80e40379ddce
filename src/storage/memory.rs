//! In-memory storage adapters.
//!
//! Functionally faithful stand-ins for the external services: the cache
//! honors TTL expiry, the job store enforces the terminal-state rules, and
//! the object store keeps upload metadata. Used by tests and by embedders
//! that run the pipeline without cloud storage.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use super::{CacheStore, JobStore, NodeStore, ObjectMeta, ObjectStore};
use crate::error::PipelineError;
use crate::models::{JobOutcome, JobRecord, JobState, Node};

// ═══════════════════════════════════════════════════════════
// Object store
// ═══════════════════════════════════════════════════════════

struct StoredObject {
    bytes: Vec<u8>,
    uploaded_at: String,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), PipelineError> {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                bytes,
                uploaded_at: Utc::now().to_rfc3339(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.bytes.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, PipelineError> {
        let objects = self.objects.lock().unwrap();
        let mut metas: Vec<ObjectMeta> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectMeta {
                key: key.clone(),
                size: object.bytes.len() as u64,
                uploaded_at: object.uploaded_at.clone(),
            })
            .collect();
        metas.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(metas)
    }
}

// ═══════════════════════════════════════════════════════════
// Cache store
// ═══════════════════════════════════════════════════════════

struct CachedEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PipelineError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), PipelineError> {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            CachedEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Job store
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, job_id: &str, apply: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;
        apply(job);
        job.updated_at = Utc::now().to_rfc3339();
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &JobRecord) -> Result<(), PipelineError> {
        self.jobs
            .lock()
            .unwrap()
            .insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, PipelineError> {
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }

    async fn mark_running(&self, job_id: &str) -> Result<(), PipelineError> {
        self.update(job_id, |job| job.state = JobState::Running)
    }

    async fn mark_completed(
        &self,
        job_id: &str,
        outcome: &JobOutcome,
    ) -> Result<(), PipelineError> {
        self.update(job_id, |job| {
            job.state = JobState::Completed;
            job.node_count = Some(outcome.node_count);
            job.inferred_count = Some(outcome.inferred_count);
            job.coverage_ratio = Some(outcome.coverage_ratio);
        })
    }

    async fn mark_failed(&self, job_id: &str, error: &str) -> Result<(), PipelineError> {
        self.update(job_id, |job| {
            job.state = JobState::Failed;
            job.error = Some(error.to_string());
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Node store
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemoryNodeStore {
    nodes: Mutex<HashMap<String, Vec<Node>>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn replace_for_job(&self, job_id: &str, nodes: &[Node]) -> Result<(), PipelineError> {
        self.nodes
            .lock()
            .unwrap()
            .insert(job_id.to_string(), nodes.to_vec());
        Ok(())
    }

    async fn list_for_job(&self, job_id: &str) -> Result<Vec<Node>, PipelineError> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobMode;
    use std::collections::BTreeMap;

    fn sample_job(job_id: &str) -> JobRecord {
        JobRecord {
            job_id: job_id.into(),
            mode: JobMode::Strict,
            state: JobState::Queued,
            filename: "plan.pdf".into(),
            content_type: "application/pdf".into(),
            size_bytes: 10,
            file_hash_sha256: "hash".into(),
            upload_key: format!("uploads/{job_id}/plan.pdf"),
            artifacts_prefix: format!("artifacts/{job_id}"),
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
            node_count: None,
            inferred_count: None,
            coverage_ratio: None,
            error: None,
            options: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn object_store_roundtrip_and_list() {
        let store = MemoryObjectStore::new();
        store
            .put("a/one", b"11".to_vec(), "text/plain")
            .await
            .unwrap();
        store
            .put("a/two", b"222".to_vec(), "text/plain")
            .await
            .unwrap();
        store
            .put("b/other", b"3".to_vec(), "text/plain")
            .await
            .unwrap();

        assert_eq!(store.get("a/one").await.unwrap().unwrap(), b"11");
        assert!(store.get("a/missing").await.unwrap().is_none());

        let listed = store.list("a/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key, "a/one");
        assert_eq!(listed[1].size, 3);
    }

    #[tokio::test]
    async fn cache_honors_ttl() {
        let cache = MemoryCacheStore::new();
        cache
            .put("k", "v".into(), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn job_store_lifecycle() {
        let store = MemoryJobStore::new();
        store.create(&sample_job("job-1")).await.unwrap();

        store.mark_running("job-1").await.unwrap();
        assert_eq!(
            store.get("job-1").await.unwrap().unwrap().state,
            JobState::Running
        );

        store
            .mark_completed(
                "job-1",
                &JobOutcome {
                    node_count: 12,
                    inferred_count: 2,
                    coverage_ratio: 0.8,
                },
            )
            .await
            .unwrap();
        let job = store.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.node_count, Some(12));
    }

    #[tokio::test]
    async fn job_store_mark_failed_records_error() {
        let store = MemoryJobStore::new();
        store.create(&sample_job("job-1")).await.unwrap();
        store.mark_failed("job-1", "backend exploded").await.unwrap();

        let job = store.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("backend exploded"));
    }

    #[tokio::test]
    async fn job_store_update_of_unknown_job_fails() {
        let store = MemoryJobStore::new();
        assert!(matches!(
            store.mark_running("nope").await,
            Err(PipelineError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn node_store_replaces_wholesale() {
        let store = MemoryNodeStore::new();
        store
            .replace_for_job("job-1", &[Node::new("n1", "First")])
            .await
            .unwrap();
        store
            .replace_for_job("job-1", &[Node::new("n2", "Second")])
            .await
            .unwrap();

        let nodes = store.list_for_job("job-1").await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "n2");
    }
}
