//! HTTP-backed channel transports.
//!
//! One transport per channel:
//! - Email via the Resend HTTP API
//! - Push via a generic JSON gateway webhook
//! - In-app via the application's notification feed endpoint
//!
//! All transports share the failure classification in [`classify_status`]:
//! timeouts, connection errors, 408/429 and 5xx responses are retryable;
//! any other non-success response is terminal.
//!
//! [`runtime`] is the composition root: it wires environment configuration
//! into a dispatcher backed by the PostgreSQL ledger and these transports.

use herald_common::error::SendError;
use reqwest::StatusCode;

pub mod email;
pub mod in_app;
pub mod push;
pub mod runtime;

pub use email::EmailTransport;
pub use in_app::InAppTransport;
pub use push::PushTransport;
pub use runtime::{build_dispatcher, transports_from_config};

/// Classify a non-success HTTP status into a send error.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> SendError {
    let detail = format!("gateway returned {status}: {body}");
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        SendError::Retryable(detail)
    } else {
        SendError::Terminal(detail)
    }
}

/// Classify a transport-level failure (connect, timeout, protocol).
pub(crate) fn classify_transport_error(err: reqwest::Error) -> SendError {
    if err.is_timeout() || err.is_connect() {
        SendError::Retryable(format!("request failed: {err}"))
    } else {
        SendError::Terminal(format!("request failed: {err}"))
    }
}
