//! Document-understanding backend: client, normalization, segmentation,
//! and the content-addressed cache key for its expensive analyze call.

pub mod cache;
pub mod normalize;
pub mod segment;

use async_trait::async_trait;

use crate::error::PipelineError;

pub use cache::cache_key;
pub use normalize::{normalize, NormalizedDocument, NormalizedPage};
pub use segment::segment;

/// The external service that turns raw file bytes into pages, paragraphs,
/// and tables. Non-2xx responses and transport failures are retryable.
#[async_trait]
pub trait DocintBackend: Send + Sync {
    async fn analyze(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<serde_json::Value, PipelineError>;
}

/// HTTP client for the document-understanding backend.
pub struct HttpDocintClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocintClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DocintBackend for HttpDocintClient {
    async fn analyze(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<serde_json::Value, PipelineError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.base_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Transport("docint request timed out".to_string())
                } else {
                    PipelineError::Transport(format!("docint: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ServiceStatus {
                service: "docint".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::Transport(format!("docint response read: {e}")))
    }
}

/// Mock backend returning a fixed payload. Useful wherever the real
/// backend is out of reach.
pub struct MockDocintBackend {
    payload: serde_json::Value,
}

impl MockDocintBackend {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}

#[async_trait]
impl DocintBackend for MockDocintBackend {
    async fn analyze(
        &self,
        _bytes: Vec<u8>,
        _filename: &str,
    ) -> Result<serde_json::Value, PipelineError> {
        Ok(self.payload.clone())
    }
}
