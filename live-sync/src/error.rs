//! Application-wide error types.

use platforms_api::FetchError;
use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Channel already present: {0}")]
    DuplicateChannel(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Channel does not exist: {0}")]
    UnknownChannel(String),

    #[error("Channel set for {0} has been shut down")]
    ShutDown(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Poller task failed: {0}")]
    PollerTask(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
