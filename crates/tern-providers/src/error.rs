//! Typed failures of the model endpoint.
//!
//! Providers return `anyhow::Error` values that wrap a [`ProviderError`], so
//! callers can `downcast_ref` to tell a retryable quota rejection apart from
//! a transport failure.

use reqwest::header::HeaderMap;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Endpoint unreachable, timed out, or answered with a non-2xx status.
    #[error("{}", transport_message(.status, .message))]
    Transport { status: Option<u16>, message: String },

    /// Rate limit or quota exhausted; worth retrying after a pause.
    #[error("quota exceeded: {message}")]
    Quota {
        message: String,
        retry_after: Option<Duration>,
    },
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("model endpoint returned HTTP {}: {}", code, message),
        None => format!("model endpoint unreachable: {}", message),
    }
}

impl ProviderError {
    /// Classify a non-2xx response.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = summarize_body(body);
        if status == 429 || (matches!(status, 402 | 403) && mentions_quota(body)) {
            ProviderError::Quota {
                message,
                retry_after,
            }
        } else {
            ProviderError::Transport {
                status: Some(status),
                message,
            }
        }
    }

    pub fn from_reqwest(error: reqwest::Error) -> Self {
        ProviderError::Transport {
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }

    /// The connection closed before the stream's terminal event.
    pub fn truncated_stream() -> Self {
        ProviderError::Transport {
            status: None,
            message: "stream ended before completion".to_string(),
        }
    }

    /// Classify an error event delivered inside an otherwise successful stream.
    pub fn from_stream_error(error_type: &str, message: &str) -> Self {
        if error_type.contains("rate_limit") || mentions_quota(error_type) {
            ProviderError::Quota {
                message: message.to_string(),
                retry_after: None,
            }
        } else {
            ProviderError::Transport {
                status: None,
                message: format!("{}: {}", error_type, message),
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Quota { .. })
    }
}

fn mentions_quota(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("quota") || lower.contains("rate_limit") || lower.contains("rate limit")
}

/// Pull the human-readable message out of a JSON error envelope when there is one.
fn summarize_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str())
        {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        trimmed.chars().take(500).collect()
    }
}

/// Parse a `retry-after` header given in whole seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
