//! Immutable channel snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One fetched view of a channel's current state.
///
/// Built once by a fetcher and then only moved or cloned; nothing in the
/// workspace mutates a snapshot after construction.
///
/// # Examples
///
/// ```rust
/// use platforms_api::ChannelSnapshot;
///
/// let snapshot = ChannelSnapshot::builder("foo")
///     .title("Speedrunning")
///     .game("Celeste")
///     .viewer_count(42)
///     .build();
/// assert!(snapshot.online);
/// assert_eq!(snapshot.viewer_count, 42);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub channel: String,
    pub online: bool,
    pub title: String,
    pub game: String,
    pub viewer_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub preview_url: String,
    pub logo_url: String,
    /// The broadcast is a rerun playlist rather than a live session.
    pub is_playlist: bool,
    pub available_qualities: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl ChannelSnapshot {
    /// Snapshot of a channel that is not broadcasting.
    pub fn offline(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            online: false,
            title: String::new(),
            game: String::new(),
            viewer_count: 0,
            started_at: None,
            preview_url: String::new(),
            logo_url: String::new(),
            is_playlist: false,
            available_qualities: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Start building a snapshot of a live channel.
    pub fn builder(channel: impl Into<String>) -> SnapshotBuilder {
        SnapshotBuilder {
            inner: Self {
                online: true,
                ..Self::offline(channel)
            },
        }
    }
}

/// Builder for live [`ChannelSnapshot`]s.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    inner: ChannelSnapshot,
}

impl SnapshotBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.inner.title = title.into();
        self
    }

    pub fn game(mut self, game: impl Into<String>) -> Self {
        self.inner.game = game.into();
        self
    }

    pub fn viewer_count(mut self, viewer_count: u64) -> Self {
        self.inner.viewer_count = viewer_count;
        self
    }

    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.inner.started_at = Some(started_at);
        self
    }

    pub fn preview_url(mut self, preview_url: impl Into<String>) -> Self {
        self.inner.preview_url = preview_url.into();
        self
    }

    pub fn logo_url(mut self, logo_url: impl Into<String>) -> Self {
        self.inner.logo_url = logo_url.into();
        self
    }

    pub fn playlist(mut self, is_playlist: bool) -> Self {
        self.inner.is_playlist = is_playlist;
        self
    }

    pub fn qualities<I, S>(mut self, qualities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.available_qualities = qualities.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> ChannelSnapshot {
        self.inner
    }
}
