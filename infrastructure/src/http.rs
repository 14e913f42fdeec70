//! Shared HTTP helpers for the remote adapters.

use crew_domain::ExternalFailure;
use reqwest::StatusCode;

pub(crate) fn user_agent() -> &'static str {
    concat!("clinical-crew/", env!("CARGO_PKG_VERSION"))
}

/// Rate limits, request timeouts and server errors are worth retrying
pub(crate) fn classify_status(status: StatusCode, detail: &str) -> ExternalFailure {
    let message = format!("HTTP {}: {}", status.as_u16(), detail);
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        ExternalFailure::transient(message)
    } else {
        ExternalFailure::terminal(message)
    }
}

/// Connection problems and timeouts are transient; anything else is not
pub(crate) fn classify_transport(error: &reqwest::Error) -> ExternalFailure {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        ExternalFailure::transient(error.to_string())
    } else {
        ExternalFailure::terminal(error.to_string())
    }
}
