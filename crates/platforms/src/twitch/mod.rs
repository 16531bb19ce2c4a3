//! Twitch API client.

mod client;
mod models;

pub use client::{DEFAULT_BASE_URL, TwitchClient, TwitchConfig, URL_REGEX};
