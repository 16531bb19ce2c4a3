//! Channel set management.
//!
//! A [`ChannelSet`] owns the records of one service (for example
//! `twitch.tv`) and the poller of each record. It keeps an ordered,
//! observable view of its records that is rebuilt whenever membership, the
//! sort policy, or the live state of a record changes.

mod manager;
mod ordering;

pub use manager::{ChannelSet, ChannelSetBuilder, ImportReport};
pub use ordering::{SortPolicy, sort_channels};
