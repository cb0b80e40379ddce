//! Checkpointed step runner.
//!
//! Each step persists its output as a named checkpoint artifact before the
//! pipeline advances; a re-run after a partial failure resumes at the first
//! un-checkpointed step instead of repeating completed work. Retryable
//! failures are retried with exponential backoff up to a bounded attempt
//! count; fatal failures surface immediately.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PipelineError;
use crate::settings::RetryPolicy;
use crate::storage::ObjectStore;

pub struct StepRunner {
    store: Arc<dyn ObjectStore>,
    job_id: String,
    retry: RetryPolicy,
}

impl StepRunner {
    pub fn new(store: Arc<dyn ObjectStore>, job_id: &str, retry: RetryPolicy) -> Self {
        Self {
            store,
            job_id: job_id.to_string(),
            retry,
        }
    }

    fn checkpoint_key(&self, step: &str) -> String {
        format!("artifacts/{}/checkpoints/{}.json", self.job_id, step)
    }

    /// Run a named step, or return its checkpointed output if it already
    /// completed in a previous run.
    ///
    /// Steps must be safely retryable: on a transient failure the whole
    /// closure runs again. A corrupt checkpoint is treated as absent.
    pub async fn run<T, F, Fut>(&self, step: &str, run_step: F) -> Result<T, PipelineError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        if let Some(bytes) = self.store.get(&self.checkpoint_key(step)).await? {
            match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    tracing::debug!(job_id = %self.job_id, step, "step already checkpointed, skipping");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(job_id = %self.job_id, step, error = %e, "unreadable checkpoint, re-running step");
                }
            }
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match run_step().await {
                Ok(value) => {
                    let bytes = serde_json::to_vec(&value)?;
                    self.store
                        .put(&self.checkpoint_key(step), bytes, "application/json")
                        .await?;
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        job_id = %self.job_id,
                        step,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "step failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(job_id = %self.job_id, step, attempt, error = %err, "step failed");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn runner(store: Arc<dyn ObjectStore>) -> StepRunner {
        StepRunner::new(
            store,
            "job-1",
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn completed_steps_are_not_re_run() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let steps = runner(store.clone());
        let runs = AtomicU32::new(0);

        let first: u32 = steps
            .run("compute", || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(41 + 1)
            })
            .await
            .unwrap();
        assert_eq!(first, 42);

        // Same step on a fresh runner over the same store: checkpoint wins.
        let steps = runner(store);
        let second: u32 = steps
            .run("compute", || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .await
            .unwrap();
        assert_eq!(second, 42);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retryable_failures_are_retried_to_success() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let steps = runner(store);
        let attempts = AtomicU32::new(0);

        let value: String = steps
            .run("flaky", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(PipelineError::Transport("blip".into()))
                } else {
                    Ok("done".to_string())
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let steps = runner(store);
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = steps
            .run("always-down", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::Transport("still down".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_failures_are_not_retried() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let steps = runner(store);
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = steps
            .run("doomed", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::JobNotFound("job-1".into()))
            })
            .await;

        assert!(matches!(result, Err(PipelineError::JobNotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_steps_leave_no_checkpoint() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let steps = runner(store.clone());

        let _: Result<(), _> = steps
            .run("failing", || async {
                Err(PipelineError::InvalidMode("x".into()))
            })
            .await;

        assert!(store
            .get("artifacts/job-1/checkpoints/failing.json")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn corrupt_checkpoints_re_run_the_step() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        store
            .put(
                "artifacts/job-1/checkpoints/typed.json",
                b"not json at all".to_vec(),
                "application/json",
            )
            .await
            .unwrap();

        let steps = runner(store);
        let value: u32 = steps.run("typed", || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
