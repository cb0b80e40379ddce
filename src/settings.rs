//! Runtime settings, resolved from the environment.
//!
//! Per-stage model selections use `provider,tier` specs (for example
//! `LLM_VERIFY=anthropic,large`). Everything has a working default so the
//! pipeline runs with nothing but API keys configured.

use std::time::Duration;

use crate::llm::{LlmSelection, ModelTier, Provider};
use crate::pipeline::escalate::CandidateSpec;

/// Document-understanding backend and its cache.
#[derive(Debug, Clone)]
pub struct DocintSettings {
    pub base_url: String,
    pub model: String,
    pub backend_version: String,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
}

impl Default for DocintSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8100/analyze".to_string(),
            model: "prebuilt-layout".to_string(),
            backend_version: "v1".to_string(),
            cache_enabled: true,
            cache_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Model choices per pipeline stage.
#[derive(Debug, Clone)]
pub struct StageModels {
    pub analysis: LlmSelection,
    pub extract: LlmSelection,
    pub verify: LlmSelection,
    pub judge: LlmSelection,
    pub summary: LlmSelection,
}

impl Default for StageModels {
    fn default() -> Self {
        Self {
            analysis: LlmSelection::new(Provider::Anthropic, ModelTier::Large),
            extract: LlmSelection::new(Provider::Openai, ModelTier::Small),
            verify: LlmSelection::new(Provider::Anthropic, ModelTier::Large),
            judge: LlmSelection::new(Provider::Anthropic, ModelTier::Large),
            summary: LlmSelection::new(Provider::Openai, ModelTier::Small),
        }
    }
}

/// Step-level retry behavior for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub docint: DocintSettings,
    pub models: StageModels,
    /// Provider/model configurations competing during escalation.
    pub escalation_candidates: Vec<CandidateSpec>,
    /// Regions per extraction batch. Batches run sequentially; regions
    /// within a batch extract concurrently.
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// How long the column-decision gate waits for a human answer.
    pub answer_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docint: DocintSettings::default(),
            models: StageModels::default(),
            escalation_candidates: Provider::all()
                .iter()
                .map(|p| CandidateSpec::new(LlmSelection::new(*p, ModelTier::Small)))
                .collect(),
            batch_size: 3,
            retry: RetryPolicy::default(),
            answer_timeout: Duration::from_secs(24 * 3600),
        }
    }
}

impl Settings {
    /// Resolve settings from environment variables, falling back to
    /// defaults field by field.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("DOCINT_URL") {
            settings.docint.base_url = url;
        }
        if let Ok(model) = std::env::var("DOCINT_MODEL") {
            settings.docint.model = model;
        }
        if let Ok(version) = std::env::var("DOCINT_VERSION") {
            settings.docint.backend_version = version;
        }
        if let Ok(enabled) = std::env::var("DOCINT_CACHE_ENABLED") {
            settings.docint.cache_enabled = enabled == "true";
        }
        if let Some(ttl) = env_u64("DOCINT_CACHE_TTL_SECS") {
            settings.docint.cache_ttl = Duration::from_secs(ttl);
        }

        settings.models.analysis = env_selection("LLM_ANALYSIS", settings.models.analysis);
        settings.models.extract = env_selection("LLM_EXTRACT", settings.models.extract);
        settings.models.verify = env_selection("LLM_VERIFY", settings.models.verify);
        settings.models.judge = env_selection("LLM_JUDGE", settings.models.judge);
        settings.models.summary = env_selection("LLM_SUMMARY", settings.models.summary);

        if let Some(size) = env_u64("EXTRACT_BATCH_SIZE") {
            settings.batch_size = (size as usize).max(1);
        }
        if let Some(attempts) = env_u64("STEP_MAX_ATTEMPTS") {
            settings.retry.max_attempts = (attempts as u32).max(1);
        }
        if let Some(secs) = env_u64("ANSWER_TIMEOUT_SECS") {
            settings.answer_timeout = Duration::from_secs(secs);
        }

        settings
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_selection(name: &str, fallback: LlmSelection) -> LlmSelection {
    match std::env::var(name) {
        Ok(spec) => LlmSelection::from_spec(&spec).unwrap_or_else(|| {
            tracing::warn!(var = name, spec = %spec, "unparseable model spec, using default");
            fallback
        }),
        Err(_) => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.batch_size, 3);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.answer_timeout, Duration::from_secs(86_400));
        assert_eq!(settings.escalation_candidates.len(), 3);
    }

    #[test]
    fn escalation_candidates_cover_distinct_providers() {
        let settings = Settings::default();
        let providers: std::collections::HashSet<Provider> = settings
            .escalation_candidates
            .iter()
            .map(|c| c.selection.provider)
            .collect();
        assert_eq!(providers.len(), 3);
    }

    #[test]
    fn cache_is_enabled_by_default() {
        assert!(Settings::default().docint.cache_enabled);
    }
}
