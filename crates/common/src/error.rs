use thiserror::Error;

/// Rejection of a malformed [`crate::types::EventPayload`]. Raised at
/// construction time, before the event enters the pipeline; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required field is missing or empty: {0}")]
    MissingField(&'static str),

    #[error("origin header is not a valid http(s) origin: {0:?}")]
    InvalidOrigin(String),

    #[error("duplicate user in workspace members: {0}")]
    DuplicateMember(String),
}

/// An external collaborator (permission oracle, preference store) could not
/// be reached. Recoverable: the caller retries the whole event later.
#[derive(Debug, Clone, Error)]
#[error("collaborator unavailable: {0}")]
pub struct Unavailable(pub String);

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Recipient resolution unavailable: {0}")]
    ResolutionUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<Unavailable> for AppError {
    fn from(err: Unavailable) -> Self {
        AppError::ResolutionUnavailable(err.0)
    }
}

/// Per-channel delivery failure, scoped to one (event, recipient, channel)
/// triple. Never escalated to abort sibling triples.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// Transient (timeout, rate limit, gateway hiccup) — eligible for
    /// bounded retry with backoff.
    #[error("retryable delivery failure: {0}")]
    Retryable(String),

    /// Permanent (invalid address, unsubscribed recipient) — never retried.
    #[error("terminal delivery failure: {0}")]
    Terminal(String),
}

impl SendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::Retryable(_))
    }

    pub fn detail(&self) -> &str {
        match self {
            SendError::Retryable(detail) | SendError::Terminal(detail) => detail,
        }
    }
}
