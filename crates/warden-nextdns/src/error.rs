//! Remote failure taxonomy: transient errors retry, permanent ones
//! surface immediately.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited by server")]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error ({status})")]
    Server { status: u16 },

    #[error("unauthenticated (check NEXTDNS_API_KEY)")]
    Unauthorized,

    #[error("unknown profile (check NEXTDNS_PROFILE_ID)")]
    UnknownProfile,

    #[error("permanent API error ({status})")]
    Permanent { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("refusing to send syntactically invalid domain '{0}'")]
    InvalidDomain(String),

    #[error("invalid credential format: {0}")]
    InvalidCredentials(String),

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Timeouts, 5xx and 429 are worth retrying; 4xx is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Timeout
                | RemoteError::RateLimited { .. }
                | RemoteError::Server { .. }
                | RemoteError::Transport(_)
        )
    }

    /// Classify an HTTP status outside the success class.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> RemoteError {
        match status {
            401 => RemoteError::Unauthorized,
            404 => RemoteError::UnknownProfile,
            429 => RemoteError::RateLimited { retry_after },
            500..=599 => RemoteError::Server { status },
            _ => RemoteError::Permanent { status },
        }
    }

    /// Exit code for the CLI surface.
    pub fn exit_code(&self) -> i32 {
        match self {
            RemoteError::InvalidDomain(_) | RemoteError::InvalidCredentials(_) => {
                warden_core::error::exit::VALIDATION
            }
            _ => warden_core::error::exit::REMOTE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            RemoteError::from_status(401, None),
            RemoteError::Unauthorized
        ));
        assert!(matches!(
            RemoteError::from_status(404, None),
            RemoteError::UnknownProfile
        ));
        assert!(matches!(
            RemoteError::from_status(429, None),
            RemoteError::RateLimited { .. }
        ));
        assert!(matches!(
            RemoteError::from_status(503, None),
            RemoteError::Server { status: 503 }
        ));
        assert!(matches!(
            RemoteError::from_status(400, None),
            RemoteError::Permanent { status: 400 }
        ));
    }

    #[test]
    fn test_retryability() {
        assert!(RemoteError::Timeout.is_retryable());
        assert!(RemoteError::Server { status: 500 }.is_retryable());
        assert!(RemoteError::RateLimited { retry_after: None }.is_retryable());
        assert!(!RemoteError::Unauthorized.is_retryable());
        assert!(!RemoteError::Permanent { status: 400 }.is_retryable());
        assert!(!RemoteError::InvalidDomain("x".into()).is_retryable());
    }
}
