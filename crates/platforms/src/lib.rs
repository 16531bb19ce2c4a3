//! Remote collaborators used by live-sync.
//!
//! This crate owns everything that talks to the outside world on behalf of
//! the synchronizer:
//! - [`SnapshotFetcher`]: channel id to a fresh, immutable [`ChannelSnapshot`]
//! - [`QualityResolver`]: channel URL to the list of playable quality labels
//! - [`FollowSource`]: user to the set of channels they follow
//! - [`twitch::TwitchClient`]: the Twitch snapshot fetcher and follow source

pub mod error;
pub mod fetcher;
pub mod quality;
pub mod snapshot;
pub mod twitch;

pub use error::{ClientBuildError, FetchError};
pub use fetcher::{FollowSource, SnapshotFetcher};
pub use quality::{FixedQualityResolver, QualityResolver, sort_qualities};
pub use snapshot::{ChannelSnapshot, SnapshotBuilder};
