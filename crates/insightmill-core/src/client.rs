//! Model invocation: one HTTP call per chunk, with retry on transient
//! failures. Callers always get a definite `Result`; nothing panics past
//! this boundary.

use std::future::Future;

use serde_json::Value;

use crate::config::{MillConfig, RetryPolicy, WireFormat};
use crate::error::{MillError, Result};

/// Anthropic API version header sent with `WireFormat::Messages` requests.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A text-completion service. The HTTP implementation is the only one used
/// in production; tests substitute scripted backends.
pub trait ModelBackend: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Run `op` until it succeeds, retrying transient failures with exponential
/// backoff. Non-transient errors are returned immediately.
pub async fn with_retries<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last = String::new();
    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                last = e.to_string();
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(MillError::RetriesExhausted {
        attempts: policy.max_attempts,
        last,
    })
}

/// Request body for the configured wire format.
pub fn build_payload(cfg: &MillConfig, prompt: &str) -> Value {
    // Both shapes share the {model, max_tokens, messages} skeleton.
    serde_json::json!({
        "model": cfg.model,
        "max_tokens": cfg.max_tokens,
        "messages": [{ "role": "user", "content": prompt }],
    })
}

/// Pull the completion text out of a reply for the given wire format.
pub fn completion_text(wire: WireFormat, reply: &Value) -> Result<String> {
    let text = match wire {
        WireFormat::Messages => reply["content"][0]["text"].as_str(),
        WireFormat::ChatCompletions => reply["choices"][0]["message"]["content"].as_str(),
    };
    text.map(|t| t.trim().to_string())
        .ok_or_else(|| MillError::JsonExtract {
            reason: format!("unexpected API reply shape: {reply}"),
        })
}

pub struct HttpBackend {
    http: reqwest::Client,
    cfg: MillConfig,
}

impl HttpBackend {
    pub fn new(cfg: MillConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self { http, cfg })
    }

    async fn send_once(&self, prompt: &str) -> Result<String> {
        let mut request = self
            .http
            .post(self.cfg.endpoint())
            .header("Content-Type", "application/json");

        request = match self.cfg.wire() {
            WireFormat::Messages => request
                .header("x-api-key", &self.cfg.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            WireFormat::ChatCompletions => request
                .header("Authorization", format!("Bearer {}", self.cfg.api_key)),
        };

        let response = request
            .json(&build_payload(&self.cfg, prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MillError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply = response.json::<Value>().await?;
        completion_text(self.cfg.wire(), &reply)
    }
}

impl ModelBackend for HttpBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        with_retries(self.cfg.retry, || self.send_once(prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::config::test_config;
    use serde_json::json;

    #[test]
    fn payload_has_the_messages_skeleton() {
        let cfg = test_config();
        let payload = build_payload(&cfg, "translate this");
        assert_eq!(payload["model"], json!("claude-sonnet-4-5"));
        assert_eq!(payload["max_tokens"], json!(16_000));
        assert_eq!(payload["messages"][0]["role"], json!("user"));
        assert_eq!(payload["messages"][0]["content"], json!("translate this"));
    }

    #[test]
    fn completion_text_handles_both_wire_shapes() {
        let messages_reply = json!({"content": [{"type": "text", "text": "  你好  "}]});
        assert_eq!(
            completion_text(WireFormat::Messages, &messages_reply).unwrap(),
            "你好"
        );

        let chat_reply = json!({"choices": [{"message": {"content": "hello"}}]});
        assert_eq!(
            completion_text(WireFormat::ChatCompletions, &chat_reply).unwrap(),
            "hello"
        );

        let garbage = json!({"error": "overloaded"});
        assert!(completion_text(WireFormat::Messages, &garbage).is_err());
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: std::time::Duration::ZERO,
        };
        let result = with_retries(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(MillError::Api {
                        status: 503,
                        body: "overloaded".into(),
                    })
                } else {
                    Ok("done".to_string())
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: std::time::Duration::ZERO,
        };
        let result: Result<String> = with_retries(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(MillError::Api {
                    status: 401,
                    body: "bad key".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(MillError::Api { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_the_last_error() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: std::time::Duration::ZERO,
        };
        let result: Result<String> = with_retries(policy, || async {
            Err(MillError::Api {
                status: 429,
                body: "rate limited".into(),
            })
        })
        .await;
        match result {
            Err(MillError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("429"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
