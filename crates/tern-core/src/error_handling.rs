//! Error classification and retry timing for model calls.
//!
//! Only quota rejections are retried. Every other endpoint failure ends the
//! turn and is surfaced to the operator.

use std::time::Duration;
use tern_providers::ProviderError;

/// Base delay for exponential backoff (in milliseconds)
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Maximum delay between retries (in milliseconds)
const MAX_RETRY_DELAY_MS: u64 = 10000;

/// Upper bound honoured for a server-provided `retry-after`
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

const JITTER_FACTOR: f64 = 0.3;

/// Classification of error types
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorType {
    /// Recoverable errors that should be retried
    Recoverable(RecoverableError),
    /// Non-recoverable errors that should terminate the turn
    NonRecoverable,
}

/// Types of recoverable errors
#[derive(Debug, Clone, PartialEq)]
pub enum RecoverableError {
    /// Rate limit or quota exceeded
    Quota { retry_after: Option<Duration> },
}

/// Classify an error as recoverable or non-recoverable
pub fn classify_error(error: &anyhow::Error) -> ErrorType {
    if let Some(provider_error) = error.downcast_ref::<ProviderError>() {
        return match provider_error {
            ProviderError::Quota { retry_after, .. } => ErrorType::Recoverable(RecoverableError::Quota {
                retry_after: *retry_after,
            }),
            ProviderError::Transport { .. } => ErrorType::NonRecoverable,
        };
    }

    // Errors that lost their type on the way up still carry the wording
    let error_str = error.to_string().to_lowercase();
    if error_str.contains("rate limit")
        || error_str.contains("rate_limit")
        || error_str.contains("quota exceeded")
        || error_str.contains("http 429")
    {
        return ErrorType::Recoverable(RecoverableError::Quota { retry_after: None });
    }

    ErrorType::NonRecoverable
}

/// Calculate retry delay with exponential backoff and jitter
pub fn calculate_retry_delay(attempt: u32) -> Duration {
    use rand::Rng;

    // Exponential backoff: delay = base * 2^(attempt - 1)
    let exponent = attempt.saturating_sub(1).min(16);
    let base_delay = BASE_RETRY_DELAY_MS.saturating_mul(2_u64.pow(exponent));
    let capped_delay = base_delay.min(MAX_RETRY_DELAY_MS);

    // Add jitter to prevent thundering herd
    let mut rng = rand::thread_rng();
    let jitter = (capped_delay as f64 * JITTER_FACTOR * rng.gen::<f64>()) as u64;
    let final_delay = if rng.gen_bool(0.5) {
        capped_delay + jitter
    } else {
        capped_delay.saturating_sub(jitter)
    };

    Duration::from_millis(final_delay)
}

/// Delay before retry `attempt`, preferring the endpoint's own hint.
pub fn retry_delay_for(error: &RecoverableError, attempt: u32) -> Duration {
    match error {
        RecoverableError::Quota {
            retry_after: Some(hint),
        } => (*hint).min(MAX_RETRY_AFTER),
        RecoverableError::Quota { retry_after: None } => calculate_retry_delay(attempt),
    }
}

/// Helper function to truncate strings for logging
pub fn truncate_for_logging(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut truncate_at = max_len;
    while truncate_at > 0 && !s.is_char_boundary(truncate_at) {
        truncate_at -= 1;
    }
    format!(
        "{}... (truncated, {} total bytes)",
        &s[..truncate_at],
        s.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_is_recoverable() {
        let err: anyhow::Error = ProviderError::Quota {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(3)),
        }
        .into();
        assert_eq!(
            classify_error(&err),
            ErrorType::Recoverable(RecoverableError::Quota {
                retry_after: Some(Duration::from_secs(3))
            })
        );
    }

    #[test]
    fn test_transport_is_fatal() {
        for status in [Some(500), Some(401), None] {
            let err: anyhow::Error = ProviderError::Transport {
                status,
                message: "boom".to_string(),
            }
            .into();
            assert_eq!(classify_error(&err), ErrorType::NonRecoverable);
        }
    }

    #[test]
    fn test_context_wrapped_provider_error_still_classified() {
        let err = anyhow::Error::from(ProviderError::Quota {
            message: "busy".to_string(),
            retry_after: None,
        })
        .context("model call failed");
        assert!(matches!(classify_error(&err), ErrorType::Recoverable(_)));
    }

    #[test]
    fn test_untyped_errors() {
        assert!(matches!(
            classify_error(&anyhow::anyhow!("Rate limit exceeded")),
            ErrorType::Recoverable(_)
        ));
        assert_eq!(
            classify_error(&anyhow::anyhow!("Invalid API key")),
            ErrorType::NonRecoverable
        );
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        for _ in 0..20 {
            let first = calculate_retry_delay(1);
            assert!(first >= Duration::from_millis(700) && first <= Duration::from_millis(1300));
            let late = calculate_retry_delay(30);
            assert!(late <= Duration::from_millis(13000));
            assert!(late >= Duration::from_millis(7000));
        }
    }

    #[test]
    fn test_retry_after_hint_is_honoured_and_bounded() {
        let hinted = RecoverableError::Quota {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(retry_delay_for(&hinted, 1), Duration::from_secs(2));

        let huge = RecoverableError::Quota {
            retry_after: Some(Duration::from_secs(3600)),
        };
        assert_eq!(retry_delay_for(&huge, 1), MAX_RETRY_AFTER);
    }

    #[test]
    fn test_truncate_for_logging_respects_char_boundaries() {
        assert_eq!(truncate_for_logging("short", 10), "short");
        let s = "héllo wörld";
        let truncated = truncate_for_logging(s, 2);
        assert!(truncated.starts_with('h'));
        assert!(truncated.contains("truncated"));
    }
}
