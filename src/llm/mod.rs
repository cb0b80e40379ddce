//! Uniform generation client over multiple AI providers.
//!
//! The pipeline only ever needs one operation: given a system/user prompt
//! pair and a provider+model selection, produce raw text and a best-effort
//! parsed JSON object. Provider-specific request shaping lives in `http`;
//! everything else talks to the `GenerationClient` trait.

pub mod http;
pub mod json;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub use http::HttpGenerationClient;
pub use json::extract_json_object;

// ═══════════════════════════════════════════════════════════
// Providers and the model registry
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Openai,
    Anthropic,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Self::Openai),
            "anthropic" => Some(Self::Anthropic),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn all() -> &'static [Provider] {
        &[Self::Openai, Self::Anthropic, Self::Gemini]
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Small,
    Large,
}

impl ModelTier {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "small" => Some(Self::Small),
            "large" => Some(Self::Large),
            _ => None,
        }
    }
}

/// Current model names per provider and tier.
pub fn model_for(provider: Provider, tier: ModelTier) -> &'static str {
    match (provider, tier) {
        (Provider::Openai, ModelTier::Small) => "gpt-5-mini",
        (Provider::Openai, ModelTier::Large) => "gpt-5",
        (Provider::Anthropic, ModelTier::Small) => "claude-haiku-4-5",
        (Provider::Anthropic, ModelTier::Large) => "claude-opus-4-5",
        (Provider::Gemini, _) => "gemini-3-pro-preview",
    }
}

/// A concrete provider + model choice for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmSelection {
    pub provider: Provider,
    pub model: String,
}

impl LlmSelection {
    pub fn new(provider: Provider, tier: ModelTier) -> Self {
        Self {
            provider,
            model: model_for(provider, tier).to_string(),
        }
    }

    /// Parse a `provider,tier` spec such as `"anthropic,small"`.
    pub fn from_spec(spec: &str) -> Option<Self> {
        let (provider, tier) = spec.split_once(',')?;
        Some(Self::new(
            Provider::from_str(provider.trim())?,
            ModelTier::from_str(tier.trim())?,
        ))
    }
}

// ═══════════════════════════════════════════════════════════
// The generation contract
// ═══════════════════════════════════════════════════════════

/// Parameters for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub provider: Provider,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(selection: &LlmSelection, temperature: f32) -> Self {
        Self {
            provider: selection.provider,
            model: selection.model.clone(),
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Uniform adapter over the AI providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Run one generation and return the raw response text.
    async fn generate(
        &self,
        request: &GenerationRequest,
        system: &str,
        user: &str,
    ) -> Result<String, PipelineError>;
}

/// Generate and parse the embedded JSON object into `T`.
///
/// Returns the parsed value together with the raw text so callers can
/// archive the unparsed response as an artifact.
pub async fn generate_json<T: DeserializeOwned>(
    client: &dyn GenerationClient,
    request: &GenerationRequest,
    system: &str,
    user: &str,
) -> Result<(T, String), PipelineError> {
    let raw_text = client.generate(request, system, user).await?;
    let value = extract_json_object(&raw_text)?;
    let parsed = serde_json::from_value(value)
        .map_err(|e| PipelineError::MalformedModelOutput(e.to_string()))?;
    Ok((parsed, raw_text))
}

// ═══════════════════════════════════════════════════════════
// Mock client for tests
// ═══════════════════════════════════════════════════════════

/// One recorded call made against a [`MockGenerationClient`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub provider: Provider,
    pub model: String,
    pub temperature: f32,
    pub system: String,
    pub user: String,
}

/// Mock generation client: canned responses, optionally per provider,
/// with full call recording.
pub struct MockGenerationClient {
    default_response: String,
    by_provider: std::collections::HashMap<Provider, String>,
    queue: std::sync::Mutex<std::collections::VecDeque<String>>,
    calls: std::sync::Mutex<Vec<RecordedCall>>,
}

impl MockGenerationClient {
    pub fn new(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            by_provider: std::collections::HashMap::new(),
            queue: std::sync::Mutex::new(std::collections::VecDeque::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Override the response for calls routed to one provider.
    pub fn with_provider_response(mut self, provider: Provider, response: &str) -> Self {
        self.by_provider.insert(provider, response.to_string());
        self
    }

    /// Queue responses consumed in order before falling back to the default.
    pub fn with_queued_responses(self, responses: Vec<String>) -> Self {
        *self.queue.lock().unwrap() = responses.into();
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for MockGenerationClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
        system: &str,
        user: &str,
    ) -> Result<String, PipelineError> {
        self.calls.lock().unwrap().push(RecordedCall {
            provider: request.provider,
            model: request.model.clone(),
            temperature: request.temperature,
            system: system.to_string(),
            user: user.to_string(),
        });

        if let Some(queued) = self.queue.lock().unwrap().pop_front() {
            return Ok(queued);
        }
        if let Some(response) = self.by_provider.get(&request.provider) {
            return Ok(response.clone());
        }
        Ok(self.default_response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_roundtrip() {
        for provider in Provider::all() {
            assert_eq!(Provider::from_str(provider.as_str()), Some(*provider));
        }
        assert_eq!(Provider::from_str("mistral"), None);
    }

    #[test]
    fn selection_from_spec() {
        let selection = LlmSelection::from_spec("anthropic,small").unwrap();
        assert_eq!(selection.provider, Provider::Anthropic);
        assert_eq!(selection.model, "claude-haiku-4-5");

        assert!(LlmSelection::from_spec("anthropic").is_none());
        assert!(LlmSelection::from_spec("anthropic,tiny").is_none());
    }

    #[test]
    fn registry_covers_every_provider() {
        for provider in Provider::all() {
            for tier in [ModelTier::Small, ModelTier::Large] {
                assert!(!model_for(*provider, tier).is_empty());
            }
        }
    }

    #[tokio::test]
    async fn mock_records_calls_and_routes_by_provider() {
        let client = MockGenerationClient::new(r#"{"default": true}"#)
            .with_provider_response(Provider::Gemini, r#"{"gemini": true}"#);

        let request = GenerationRequest::new(
            &LlmSelection::new(Provider::Gemini, ModelTier::Small),
            0.1,
        );
        let text = client.generate(&request, "sys", "user").await.unwrap();
        assert!(text.contains("gemini"));

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].provider, Provider::Gemini);
        assert_eq!(calls[0].system, "sys");
    }

    #[tokio::test]
    async fn generate_json_parses_wrapped_output() {
        #[derive(serde::Deserialize)]
        struct Out {
            answer: u32,
        }

        let client = MockGenerationClient::new("The result is:\n{\"answer\": 7}\nthanks");
        let request =
            GenerationRequest::new(&LlmSelection::new(Provider::Openai, ModelTier::Small), 0.2);

        let (out, raw): (Out, String) = generate_json(&client, &request, "s", "u").await.unwrap();
        assert_eq!(out.answer, 7);
        assert!(raw.contains("thanks"));
    }

    #[tokio::test]
    async fn generate_json_flags_shape_mismatch_as_retryable() {
        #[derive(serde::Deserialize, Debug)]
        struct Out {
            #[allow(dead_code)]
            answer: u32,
        }

        let client = MockGenerationClient::new(r#"{"answer": "seven"}"#);
        let request =
            GenerationRequest::new(&LlmSelection::new(Provider::Openai, ModelTier::Small), 0.2);

        let err = generate_json::<Out>(&client, &request, "s", "u")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
