use std::time::Duration;

use crate::error::{MillError, Result};

/// Request/response shape spoken by the inference endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// Anthropic-style `/v1/messages`: `x-api-key` header, reply
    /// `{content:[{type,text}]}`.
    Messages,
    /// OpenAI-style `/v1/chat/completions`: `Bearer` auth, reply
    /// `{choices:[{message:{content}}]}`.
    ChatCompletions,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModelProvider {
    #[default]
    Claude,
    Gemini25,
    Gemini3,
}

pub struct ProviderSpec {
    pub base_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
    pub wire: WireFormat,
}

impl ModelProvider {
    pub fn spec(&self) -> ProviderSpec {
        match self {
            ModelProvider::Claude => ProviderSpec {
                base_url: "https://api.anthropic.com",
                model: "claude-sonnet-4-5",
                env_var: "ANTHROPIC_API_KEY",
                wire: WireFormat::Messages,
            },
            ModelProvider::Gemini25 => ProviderSpec {
                base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
                model: "gemini-2.5-flash",
                env_var: "GEMINI_API_KEY",
                wire: WireFormat::ChatCompletions,
            },
            ModelProvider::Gemini3 => ProviderSpec {
                base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
                model: "gemini-3-flash",
                env_var: "GEMINI_API_KEY",
                wire: WireFormat::ChatCompletions,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelProvider::Claude => "Claude",
            ModelProvider::Gemini25 => "Gemini 2.5",
            ModelProvider::Gemini3 => "Gemini 3",
        }
    }

    /// Validate that the API key is set for this provider.
    pub fn validate_api_key(&self) -> Result<String> {
        let spec = self.spec();
        std::env::var(spec.env_var).map_err(|_| MillError::MissingApiKey {
            env_var: spec.env_var.to_string(),
        })
    }
}

/// Exponential backoff parameters for transient failures.
///
/// Attempt `n` (0-based) sleeps `base_delay * 2^n` before the next try.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Everything the driver needs, resolved once at startup and passed in.
#[derive(Clone, Debug)]
pub struct MillConfig {
    pub provider: ModelProvider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Upper bound on concurrent in-flight model calls.
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    /// Sleep between chunk calls in sequential mode.
    pub call_delay: Duration,
    /// Sleep between items in the batch loop.
    pub item_delay: Duration,
    pub retry: RetryPolicy,
    /// When true (default), a single failed chunk fails the whole item.
    /// When false, failed chunks are dropped and the gap is reported.
    pub strict_reassembly: bool,
    /// Reprocess identifiers already recorded as completed.
    pub force: bool,
}

impl MillConfig {
    /// Build a config from the environment for the given provider.
    ///
    /// `INSIGHTMILL_BASE_URL` overrides the provider endpoint (e.g. a local
    /// proxy); the API key comes from the provider's own env var.
    pub fn from_env(provider: ModelProvider) -> Result<Self> {
        let spec = provider.spec();
        let api_key = provider.validate_api_key()?;
        let base_url = std::env::var("INSIGHTMILL_BASE_URL")
            .unwrap_or_else(|_| spec.base_url.to_string());

        Ok(Self {
            provider,
            base_url,
            api_key,
            model: spec.model.to_string(),
            max_tokens: 16_000,
            chunk_size: 12_000,
            max_concurrency: 5,
            request_timeout: Duration::from_secs(180),
            call_delay: Duration::from_secs(2),
            item_delay: Duration::from_secs(3),
            retry: RetryPolicy::default(),
            strict_reassembly: true,
            force: false,
        })
    }

    pub fn wire(&self) -> WireFormat {
        self.provider.spec().wire
    }

    /// Full URL of the completion endpoint for the configured wire format.
    pub fn endpoint(&self) -> String {
        let path = match self.wire() {
            WireFormat::Messages => "/v1/messages",
            WireFormat::ChatCompletions => "/v1/chat/completions",
        };
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> MillConfig {
    MillConfig {
        provider: ModelProvider::Claude,
        base_url: "http://127.0.0.1:8045".to_string(),
        api_key: "test-key".to_string(),
        model: "claude-sonnet-4-5".to_string(),
        max_tokens: 16_000,
        chunk_size: 12_000,
        max_concurrency: 5,
        request_timeout: Duration::from_secs(180),
        call_delay: Duration::ZERO,
        item_delay: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        },
        strict_reassembly: true,
        force: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
    }

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        let mut cfg = test_config();
        cfg.base_url = "http://127.0.0.1:8045/".to_string();
        assert_eq!(cfg.endpoint(), "http://127.0.0.1:8045/v1/messages");
    }
}
