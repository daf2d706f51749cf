//! Failure classification for generation requests.

use std::time::Duration;

use studyqa_shared::FailureReason;

/// Why a generation request did not produce text.
///
/// Every failure is a value; the client never panics on a bad response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// No credential configured. Raised before any network traffic.
    #[error("no generation API credential configured")]
    ConfigurationMissing,

    /// HTTP 401.
    #[error("generation service rejected the credential (HTTP 401)")]
    Unauthorized,

    /// HTTP 403.
    #[error("credential lacks access to the generation service (HTTP 403)")]
    Forbidden,

    /// HTTP 429, with the server's `Retry-After` hint when present.
    #[error("rate limited by the generation service")]
    RateLimited { retry_after: Option<Duration> },

    /// Timeout, connection failure, or 5xx.
    #[error("transient generation failure: {message}")]
    Transient { message: String },

    /// HTTP success, but the body has no text at the expected location.
    #[error("response body has no text at {pointer}")]
    MalformedEnvelope { pointer: String },

    /// Any other 4xx. Not retried.
    #[error("generation request rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl GenerationError {
    /// Stable label for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "configuration_missing",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient { .. } => "transient",
            Self::MalformedEnvelope { .. } => "malformed_envelope",
            Self::Rejected { .. } => "rejected",
        }
    }

    /// Whether another attempt could succeed without a config change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient { .. })
    }

    /// Reason recorded on the paragraph when an attempt ends with this error.
    ///
    /// A malformed envelope reaches the parser as empty input, so it is
    /// recorded the same way as a reply with no parseable blocks.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::ConfigurationMissing => FailureReason::ConfigurationMissing,
            Self::Unauthorized => FailureReason::Unauthorized,
            Self::Forbidden => FailureReason::Forbidden,
            Self::RateLimited { .. } => FailureReason::RateLimited,
            Self::Transient { .. } => FailureReason::Transient,
            Self::MalformedEnvelope { .. } => FailureReason::NothingParsed,
            Self::Rejected { .. } => FailureReason::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limit_and_transient_retry() {
        assert!(GenerationError::RateLimited { retry_after: None }.is_retryable());
        assert!(
            GenerationError::Transient {
                message: "timeout".into()
            }
            .is_retryable()
        );
        assert!(!GenerationError::Unauthorized.is_retryable());
        assert!(!GenerationError::ConfigurationMissing.is_retryable());
        assert!(
            !GenerationError::MalformedEnvelope {
                pointer: "/text".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn malformed_envelope_records_nothing_parsed() {
        let err = GenerationError::MalformedEnvelope {
            pointer: "/candidates/0".into(),
        };
        assert_eq!(err.failure_reason(), FailureReason::NothingParsed);
        assert_eq!(err.kind(), "malformed_envelope");
    }
}
