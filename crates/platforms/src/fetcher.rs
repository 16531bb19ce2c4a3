//! Remote snapshot fetcher contract.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::snapshot::ChannelSnapshot;

/// Fetches a fresh snapshot for one channel.
///
/// Implementations are shared by every poller of a service and are called
/// concurrently for different channels, so they must not keep per-call
/// mutable state (a connection pool is fine). Callers are expected to bound
/// each call with their own timeout.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync + 'static {
    /// Fetch the current state of `channel`.
    async fn fetch(&self, channel: &str) -> Result<ChannelSnapshot, FetchError>;

    /// Turn user input (a bare name or a channel URL) into a channel id.
    fn normalize_channel(&self, input: &str) -> Result<String, FetchError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FetchError::InvalidChannel(input.to_string()));
        }
        Ok(trimmed.to_string())
    }

    /// Whether `channel` is known to the service. Checked before a channel
    /// is added, so a mistyped name is never polled.
    async fn channel_exists(&self, _channel: &str) -> Result<bool, FetchError> {
        Ok(true)
    }

    /// Public page of a channel, handed to quality resolvers.
    fn channel_url(&self, channel: &str) -> String {
        channel.to_string()
    }
}

/// Lists the channels a user follows on a service.
#[async_trait]
pub trait FollowSource: Send + Sync {
    /// Followed channel ids, normalized the way the matching fetcher expects.
    async fn followed_channels(&self, user: &str) -> Result<BTreeSet<String>, FetchError>;
}
