use std::time::Duration;

use thiserror::Error;

/// Errors produced while fetching a channel snapshot.
///
/// Every variant is non-fatal to the caller: a poller that receives one keeps
/// the last known state and tries again on its next cycle. The type is `Clone`
/// so it can travel through broadcast event channels.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("remote error: http status {0}")]
    RemoteError(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid channel: {0}")]
    InvalidChannel(String),
}

impl FetchError {
    /// Short machine-friendly name of the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::NetworkUnreachable(_) => "network_unreachable",
            FetchError::RemoteError(_) => "remote_error",
            FetchError::MalformedResponse(_) => "malformed_response",
            FetchError::Timeout(_) => "timeout",
            FetchError::InvalidChannel(_) => "invalid_channel",
        }
    }

    /// Classify a transport error from reqwest.
    ///
    /// `timeout` is the request timeout configured on the client, reported
    /// back when reqwest gives up on its own.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else if let Some(status) = err.status() {
            FetchError::RemoteError(status.as_u16())
        } else if err.is_decode() {
            FetchError::MalformedResponse(err.to_string())
        } else {
            FetchError::NetworkUnreachable(err.to_string())
        }
    }
}

/// Errors raised while constructing an API client.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("base url cannot carry a path: {0}")]
    UnsupportedBaseUrl(String),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}
