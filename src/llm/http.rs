//! HTTP adapters for the three AI providers.
//!
//! One reqwest client, per-provider request shaping. All transport and
//! status failures classify as retryable; the step runner owns backoff.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{GenerationClient, GenerationRequest, Provider};
use crate::error::PipelineError;

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 64_000;

/// Per-provider API keys.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub openai: String,
    pub anthropic: String,
    pub gemini: String,
}

impl ProviderKeys {
    pub fn from_env() -> Self {
        Self {
            openai: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            anthropic: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            gemini: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
        }
    }
}

/// Base URLs, overridable so tests can point at a local stub.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub openai: String,
    pub anthropic: String,
    pub gemini: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com/v1".to_string(),
            anthropic: "https://api.anthropic.com/v1".to_string(),
            gemini: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

/// HTTP generation client covering OpenAI, Anthropic, and Gemini.
pub struct HttpGenerationClient {
    client: reqwest::Client,
    endpoints: ProviderEndpoints,
    keys: ProviderKeys,
}

impl HttpGenerationClient {
    pub fn new(endpoints: ProviderEndpoints, keys: ProviderKeys, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to create HTTP client");
        Self {
            client,
            endpoints,
            keys,
        }
    }

    /// Default endpoints, keys from the environment, 5-minute timeout.
    pub fn from_env() -> Self {
        Self::new(ProviderEndpoints::default(), ProviderKeys::from_env(), 300)
    }

    async fn post_json(
        &self,
        provider: Provider,
        url: &str,
        headers: &[(&str, &str)],
        body: serde_json::Value,
    ) -> Result<serde_json::Value, PipelineError> {
        let mut req = self.client.post(url).json(&body);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::Transport(format!("{provider} request timed out"))
            } else {
                PipelineError::Transport(format!("{provider}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ServiceStatus {
                service: provider.as_str().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::Transport(format!("{provider} response read: {e}")))
    }

    async fn generate_openai(
        &self,
        request: &GenerationRequest,
        system: &str,
        user: &str,
    ) -> Result<String, PipelineError> {
        #[derive(Deserialize)]
        struct Output {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            content: Vec<OutputContent>,
        }
        #[derive(Deserialize)]
        struct OutputContent {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            text: String,
        }

        let url = format!("{}/responses", self.endpoints.openai);
        let auth = format!("Bearer {}", self.keys.openai);
        let body = json!({
            "model": request.model,
            "input": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_output_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
        });

        let data = self
            .post_json(Provider::Openai, &url, &[("Authorization", auth.as_str())], body)
            .await?;

        let outputs: Vec<Output> = serde_json::from_value(data["output"].clone())
            .map_err(|e| PipelineError::MalformedModelOutput(format!("openai output: {e}")))?;

        let text = outputs
            .iter()
            .filter(|o| o.kind == "message")
            .flat_map(|o| o.content.iter())
            .filter(|c| c.kind == "output_text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }

    async fn generate_anthropic(
        &self,
        request: &GenerationRequest,
        system: &str,
        user: &str,
    ) -> Result<String, PipelineError> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            content: Vec<ContentBlock>,
        }
        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(default)]
            text: String,
        }

        let url = format!("{}/messages", self.endpoints.anthropic);
        let body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            "temperature": request.temperature,
            "system": system,
            "messages": [{ "role": "user", "content": user }],
        });

        let data = self
            .post_json(
                Provider::Anthropic,
                &url,
                &[
                    ("x-api-key", self.keys.anthropic.as_str()),
                    ("anthropic-version", "2023-06-01"),
                ],
                body,
            )
            .await?;

        let response: Response = serde_json::from_value(data)
            .map_err(|e| PipelineError::MalformedModelOutput(format!("anthropic output: {e}")))?;
        Ok(response
            .content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn generate_gemini(
        &self,
        request: &GenerationRequest,
        system: &str,
        user: &str,
    ) -> Result<String, PipelineError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoints.gemini, request.model, self.keys.gemini
        );
        let body = json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": [{ "role": "user", "parts": [{ "text": user }] }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            },
        });

        let data = self.post_json(Provider::Gemini, &url, &[], body).await?;

        let text = data["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text)
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
        system: &str,
        user: &str,
    ) -> Result<String, PipelineError> {
        tracing::debug!(
            provider = request.provider.as_str(),
            model = %request.model,
            temperature = request.temperature,
            "generation call"
        );
        match request.provider {
            Provider::Openai => self.generate_openai(request, system, user).await,
            Provider::Anthropic => self.generate_anthropic(request, system, user).await,
            Provider::Gemini => self.generate_gemini(request, system, user).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoints_point_at_providers() {
        let endpoints = ProviderEndpoints::default();
        assert!(endpoints.openai.contains("openai.com"));
        assert!(endpoints.anthropic.contains("anthropic.com"));
        assert!(endpoints.gemini.contains("googleapis.com"));
    }

    #[test]
    fn client_constructor_accepts_overrides() {
        let endpoints = ProviderEndpoints {
            openai: "http://localhost:9000".into(),
            anthropic: "http://localhost:9001".into(),
            gemini: "http://localhost:9002".into(),
        };
        let client = HttpGenerationClient::new(endpoints, ProviderKeys::default(), 30);
        assert_eq!(client.endpoints.openai, "http://localhost:9000");
    }
}
