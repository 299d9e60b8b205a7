//! Error types for the upstream client and the tag engine.

use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryError;

/// Failure of a single call to the `ClickUp` API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Upstream answered with a non-success status
    #[error("ClickUp API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Request never completed (connect, TLS, reset)
    #[error("request to ClickUp failed: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("failed to decode ClickUp response: {0}")]
    Decode(String),

    /// Attempt exceeded its deadline and was dropped
    #[error("ClickUp call timed out after {0:?}")]
    Timeout(Duration),
}

impl UpstreamError {
    /// Upstream status code, if the call got that far.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Missing, invalid or expired token.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Network failures, timeouts, 5xx and rate limiting are worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Errors surfaced by tag operations.
///
/// Partial traversal and partial mutation failures are not errors: they are
/// reported through [`crate::walker::Traversal`] and [`crate::mutation::MutationOutcome`].
#[derive(Debug, Error)]
pub enum TagError {
    /// Token missing, invalid or expired. Never retried.
    #[error("ClickUp rejected the access token")]
    Unauthenticated,

    /// Transient failure that survived every retry
    #[error("ClickUp unavailable after {attempts} attempt(s): {source}")]
    UpstreamUnavailable {
        attempts: u32,
        #[source]
        source: UpstreamError,
    },

    /// Tag name or task id absent from the current snapshot
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller supplied an unusable argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Upstream refused the request for a non-transient reason
    #[error("ClickUp rejected the request: {0}")]
    Rejected(#[source] UpstreamError),

    /// Operation cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,
}

impl TagError {
    /// Classify a failed upstream call that has gone through the retry policy.
    #[must_use]
    pub fn from_upstream(error: UpstreamError, attempts: u32) -> Self {
        if error.is_unauthorized() {
            Self::Unauthenticated
        } else if error.status() == Some(404) {
            Self::NotFound(error.to_string())
        } else if error.is_retryable() {
            Self::UpstreamUnavailable {
                attempts,
                source: error,
            }
        } else {
            Self::Rejected(error)
        }
    }
}

impl From<RetryError> for TagError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Cancelled { .. } => Self::Cancelled,
            RetryError::Failed { attempts, source } => Self::from_upstream(source, attempts),
        }
    }
}
