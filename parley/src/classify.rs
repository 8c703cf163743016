//! Classification of completion-service failures.

use tracing::{error, warn};

use crate::error::{CompletionError, CompletionErrorKind, ServiceError};

/// Status code the completion service uses for rate limiting.
pub const RATE_LIMIT_STATUS: u16 = 429;

/// Tag a raw service failure with its [`CompletionErrorKind`] and log it.
///
/// A 429 becomes [`CompletionErrorKind::RateLimited`], any other upstream
/// response [`CompletionErrorKind::Upstream`], and a failure without a
/// response [`CompletionErrorKind::Transport`]. The original message is kept.
#[must_use]
pub fn classify(err: ServiceError) -> CompletionError {
    match &err.response {
        Some(response) if response.status == RATE_LIMIT_STATUS => {
            error!(
                status = response.status,
                body = %response.body,
                message = %err.message,
                "completion service error"
            );
            warn!("raising rate limit error");
            CompletionError::new(CompletionErrorKind::RateLimited, err)
        }
        Some(response) => {
            error!(
                status = response.status,
                body = %response.body,
                message = %err.message,
                "completion service error"
            );
            CompletionError::new(CompletionErrorKind::Upstream, err)
        }
        None => {
            error!(message = %err.message, "completion service unreachable");
            CompletionError::new(CompletionErrorKind::Transport, err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rate_limit() {
        let body = json!({"error": {"message": "Rate limit reached"}});
        let err = classify(ServiceError::upstream(429, body.clone()));
        assert_eq!(err.kind, CompletionErrorKind::RateLimited);
        assert_eq!(err.message, "429 Rate limit reached");
        assert_eq!(err.body, Some(body));
    }

    #[test]
    fn test_other_status_is_upstream() {
        let err = classify(ServiceError::upstream(400, json!({"error": {"message": "bad"}})));
        assert_eq!(err.kind, CompletionErrorKind::Upstream);
        assert_eq!(err.status, Some(400));

        let err = classify(ServiceError::upstream(503, json!("unavailable")));
        assert_eq!(err.kind, CompletionErrorKind::Upstream);
    }

    #[test]
    fn test_no_response_is_transport() {
        let err = classify(ServiceError::transport("connection refused"));
        assert_eq!(err.kind, CompletionErrorKind::Transport);
        assert_eq!(err.message, "connection refused");
        assert!(err.status.is_none());
        assert!(err.body.is_none());
    }
}
