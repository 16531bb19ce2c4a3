use chrono::{DateTime, Utc};
use platforms_api::ChannelSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Details of a channel that is currently broadcasting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveInfo {
    pub title: String,
    pub game: String,
    pub viewer_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub preview_url: String,
    pub logo_url: String,
    /// Rerun of a past broadcast.
    pub is_playlist: bool,
    pub available_qualities: Vec<String>,
}

impl LiveInfo {
    /// Build live details from a snapshot, with already resolved qualities.
    pub fn from_snapshot(snapshot: ChannelSnapshot, available_qualities: Vec<String>) -> Self {
        Self {
            title: snapshot.title,
            game: snapshot.game,
            viewer_count: snapshot.viewer_count,
            started_at: snapshot.started_at,
            preview_url: snapshot.preview_url,
            logo_url: snapshot.logo_url,
            is_playlist: snapshot.is_playlist,
            available_qualities,
        }
    }

    /// Time on air at `now`, if the start time is known.
    pub fn uptime_at(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.started_at
            .map(|started| (now - started).max(chrono::Duration::zero()))
    }

    pub fn uptime(&self) -> Option<chrono::Duration> {
        self.uptime_at(Utc::now())
    }
}

/// Live state of a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LiveState {
    #[default]
    Offline,
    Live(LiveInfo),
}

impl LiveState {
    pub fn is_live(&self) -> bool {
        matches!(self, LiveState::Live(_))
    }

    pub fn info(&self) -> Option<&LiveInfo> {
        match self {
            LiveState::Live(info) => Some(info),
            LiveState::Offline => None,
        }
    }

    pub fn viewer_count(&self) -> u64 {
        self.info().map(|info| info.viewer_count).unwrap_or(0)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LiveState::Offline => "offline",
            LiveState::Live(_) => "live",
        }
    }
}

impl std::fmt::Display for LiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value swapped on every successful refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub live: LiveState,
    /// When the last successful refresh was merged. `None` until the first.
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

/// Last known state of one channel.
///
/// The id never changes. The state is only replaced by the channel's own
/// poller; everything else reads it or subscribes to it.
#[derive(Debug)]
pub struct ChannelRecord {
    id: String,
    added_at: DateTime<Utc>,
    state: watch::Sender<ChannelState>,
}

impl ChannelRecord {
    /// Create an offline, never refreshed record.
    pub fn new(id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ChannelState::default());
        Self {
            id: id.into(),
            added_at: Utc::now(),
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Copy of the current state.
    pub fn state(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    pub fn live_state(&self) -> LiveState {
        self.state.borrow().live.clone()
    }

    pub fn is_live(&self) -> bool {
        self.state.borrow().live.is_live()
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().last_refreshed_at
    }

    /// Receive the whole state every time it is replaced.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Swap in a new state, returning the previous one.
    pub(crate) fn replace(&self, next: ChannelState) -> ChannelState {
        self.state.send_replace(next)
    }
}
