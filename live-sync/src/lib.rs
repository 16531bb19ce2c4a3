//! live-sync library crate.
//!
//! Keeps the live state of a user-editable set of streaming channels in sync
//! with a remote API. Each channel is polled by its own task; results are
//! merged into shared [`channel::ChannelRecord`]s, in-flight refreshes are
//! tracked by an [`registry::ActivePollRegistry`], and a
//! [`service::ChannelSet`] per service owns the records and their pollers.

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod poller;
pub mod registry;
pub mod service;

pub use error::{Error, Result};
