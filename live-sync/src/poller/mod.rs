//! Per-channel pollers.
//!
//! Each channel in a set gets one [`ChannelPoller`] running on its own tokio
//! task. The poller fetches a snapshot right away, then once per period
//! measured from the start of the previous cycle, merging every successful
//! snapshot into the channel record as one whole-value replacement.

mod channel_poller;
mod state;

pub use channel_poller::{ChannelPoller, MergeHook, PollSummary, PollerHandle, PollerSettings};
pub use state::{PollControl, PollPhase};
