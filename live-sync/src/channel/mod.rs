//! Channel records.
//!
//! A [`ChannelRecord`] holds the last known live state of one channel. Its
//! state is a single [`ChannelState`] value that is swapped as a whole, so a
//! reader never observes half of a refresh.

mod record;

pub use record::{ChannelRecord, ChannelState, LiveInfo, LiveState};
