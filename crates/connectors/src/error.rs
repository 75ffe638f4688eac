use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Network-level failure. Only timeouts are retryable; a refused
    /// connection or reset stream fails the call immediately.
    #[error("transport failure: {message}")]
    Transport { message: String, retryable: bool },

    /// Credential rejection. The caller may retry once with the alternate
    /// credential encoding before surfacing this as tenant-actionable.
    #[error("authentication rejected: {message}")]
    Auth { message: String },

    /// Marketplace throttling. Absorbed by the retry layer; never reaches
    /// the end of a sync run.
    #[error("rate limited by marketplace")]
    RateLimited { retry_after: Option<Duration> },

    /// The connector does not implement this optional operation. A normal
    /// error value, not a crash; callers should branch on `capabilities()`.
    #[error("operation not supported by this connector: {operation}")]
    NotSupported { operation: &'static str },

    /// Unexpected status or payload shape. Never retried.
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl ConnectorError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), retryable: true }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_retryable_transport(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }
}
