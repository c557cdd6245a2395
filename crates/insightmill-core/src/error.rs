use thiserror::Error;

#[derive(Error, Debug)]
pub enum MillError {
    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Could not extract JSON from model response: {reason}")]
    JsonExtract { reason: String },

    #[error("No source text for {id}")]
    NoSourceText { id: String },

    #[error("Chunk {index}/{total} failed for {id}: {reason}")]
    ChunkFailed {
        id: String,
        index: usize,
        total: usize,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl MillError {
    /// Whether a retry with backoff can plausibly succeed.
    ///
    /// Rate limits, server errors, timeouts and connection resets are
    /// transient; auth failures and malformed requests are not.
    pub fn is_transient(&self) -> bool {
        match self {
            MillError::Api { status, .. } => matches!(*status, 429 | 500..=599),
            MillError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        for status in [429, 500, 502, 503] {
            let e = MillError::Api {
                status,
                body: String::new(),
            };
            assert!(e.is_transient(), "status {status} should be transient");
        }
    }

    #[test]
    fn request_errors_are_not_transient() {
        for status in [400, 401, 403, 404, 422] {
            let e = MillError::Api {
                status,
                body: String::new(),
            };
            assert!(!e.is_transient(), "status {status} should be fatal");
        }
        assert!(
            !MillError::JsonExtract {
                reason: "no object".into()
            }
            .is_transient()
        );
    }
}
