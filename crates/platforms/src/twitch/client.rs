use std::collections::BTreeSet;
use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, trace, warn};
use url::Url;

use super::models::{FollowsPage, StreamObject};
use crate::error::{ClientBuildError, FetchError};
use crate::fetcher::{FollowSource, SnapshotFetcher};
use crate::snapshot::ChannelSnapshot;

/// Default API root. Endpoints are resolved relative to it.
pub const DEFAULT_BASE_URL: &str = "https://api.twitch.tv/kraken/";

/// Default per-request timeout of the underlying HTTP client.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Matches the connection pool size of one request per tracked channel.
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 100;

/// Page size used when walking follow listings.
const FOLLOWS_PAGE_LIMIT: u64 = 100;

pub static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.|m\.)?twitch\.tv/([A-Za-z0-9_]+)").unwrap()
});

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,25}$").unwrap());

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Settings for [`TwitchClient`].
#[derive(Debug, Clone)]
pub struct TwitchConfig {
    pub base_url: String,
    /// Sent as the `Client-ID` header; omitted when empty.
    pub client_id: String,
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: String::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }
}

/// Twitch API client.
///
/// Holds a pooled `reqwest::Client` and nothing else mutable, so one instance
/// is shared by every poller of a service.
#[derive(Debug, Clone)]
pub struct TwitchClient {
    client: Client,
    base_url: Url,
    client_id: String,
    request_timeout: Duration,
}

impl TwitchClient {
    pub fn new(config: TwitchConfig) -> Result<Self, ClientBuildError> {
        install_rustls_provider();

        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ClientBuildError::UnsupportedBaseUrl(config.base_url));
        }

        let mut builder = Client::builder();
        if config.request_timeout > Duration::ZERO {
            builder = builder.timeout(config.request_timeout);
        }
        if config.pool_max_idle_per_host > 0 {
            builder = builder.pool_max_idle_per_host(config.pool_max_idle_per_host);
        }

        debug!(base_url = %base_url, "Twitch client constructed");

        Ok(Self {
            client: builder.build()?,
            base_url,
            client_id: config.client_id,
            request_timeout: config.request_timeout,
        })
    }

    /// Check whether `channel` is known to the API.
    pub async fn channel_exists(&self, channel: &str) -> Result<bool, FetchError> {
        debug!("Checking if {} is a twitch channel", channel);
        if !NAME_REGEX.is_match(channel) {
            return Ok(false);
        }

        let url = self.endpoint(&["streams", channel])?;
        match self.get_json(url).await {
            Ok(Value::Object(map)) => Ok(map.contains_key("stream")),
            Ok(_) => Ok(false),
            Err(FetchError::RemoteError(404 | 422)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List the channels followed by `user`, walking every page.
    pub async fn followed_channels(&self, user: &str) -> Result<BTreeSet<String>, FetchError> {
        if !NAME_REGEX.is_match(user) || !self.channel_exists(user).await? {
            return Err(FetchError::InvalidChannel(user.to_string()));
        }

        let mut names = BTreeSet::new();
        let mut offset = 0u64;
        loop {
            let mut url = self.endpoint(&["users", user, "follows", "channels"])?;
            url.query_pairs_mut()
                .append_pair("limit", &FOLLOWS_PAGE_LIMIT.to_string())
                .append_pair("offset", &offset.to_string());

            let body = self.get_json(url).await?;
            let page: FollowsPage = serde_json::from_value(body)
                .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

            let fetched = page.follows.len() as u64;
            names.extend(
                page.follows
                    .into_iter()
                    .map(|follow| follow.channel.name.to_lowercase()),
            );
            offset += fetched;

            if fetched == 0 || offset >= page.total {
                break;
            }
        }

        debug!(user = %user, count = names.len(), "Loaded followed channels");
        Ok(names)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidChannel(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<Value, FetchError> {
        trace!(url = %url, "Sending request to Twitch API");

        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.twitchtv.v5+json");
        if !self.client_id.is_empty() {
            request = request.header("Client-ID", &self.client_id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Twitch API answered with an error status");
            return Err(FetchError::RemoteError(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.request_timeout))?;
        serde_json::from_str(&body).map_err(|e| FetchError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl SnapshotFetcher for TwitchClient {
    async fn fetch(&self, channel: &str) -> Result<ChannelSnapshot, FetchError> {
        if !NAME_REGEX.is_match(channel) {
            return Err(FetchError::InvalidChannel(channel.to_string()));
        }
        let url = self.endpoint(&["streams", channel])?;
        let body = self.get_json(url).await?;
        parse_stream_response(channel, body)
    }

    fn normalize_channel(&self, input: &str) -> Result<String, FetchError> {
        let trimmed = input.trim();
        let name = match URL_REGEX.captures(trimmed).and_then(|caps| caps.get(1)) {
            Some(name) => name.as_str(),
            None => trimmed,
        };
        if !NAME_REGEX.is_match(name) {
            return Err(FetchError::InvalidChannel(input.to_string()));
        }
        // Twitch logins are case-insensitive and reported in lower case.
        Ok(name.to_lowercase())
    }

    async fn channel_exists(&self, channel: &str) -> Result<bool, FetchError> {
        TwitchClient::channel_exists(self, channel).await
    }

    fn channel_url(&self, channel: &str) -> String {
        format!("https://www.twitch.tv/{channel}")
    }
}

#[async_trait]
impl FollowSource for TwitchClient {
    async fn followed_channels(&self, user: &str) -> Result<BTreeSet<String>, FetchError> {
        TwitchClient::followed_channels(self, user).await
    }
}

/// Map a `streams/{channel}` body into a snapshot.
///
/// `{"stream": null}` is an offline channel. A body without the `stream` key
/// is malformed.
pub(crate) fn parse_stream_response(
    channel: &str,
    body: Value,
) -> Result<ChannelSnapshot, FetchError> {
    let Value::Object(mut map) = body else {
        return Err(FetchError::MalformedResponse(
            "expected a JSON object".to_string(),
        ));
    };
    let Some(stream) = map.remove("stream") else {
        return Err(FetchError::MalformedResponse(
            "missing `stream` field".to_string(),
        ));
    };
    if stream.is_null() {
        return Ok(ChannelSnapshot::offline(channel));
    }

    let stream: StreamObject =
        serde_json::from_value(stream).map_err(|e| FetchError::MalformedResponse(e.to_string()))?;
    let Some(info) = stream.channel else {
        debug!(channel = %channel, "Stream object without channel, treating as offline");
        return Ok(ChannelSnapshot::offline(channel));
    };

    let mut builder = ChannelSnapshot::builder(channel)
        .title(info.status.unwrap_or_default())
        .game(stream.game.unwrap_or_default())
        .viewer_count(stream.viewers.unwrap_or(0))
        .preview_url(stream.preview.and_then(|p| p.large).unwrap_or_default())
        .logo_url(info.logo.unwrap_or_default())
        .playlist(stream.is_playlist.unwrap_or(false));
    if let Some(started_at) = stream.created_at.as_deref().and_then(parse_timestamp) {
        builder = builder.started_at(started_at);
    }

    Ok(builder.build())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            warn!(value = %raw, error = %e, "Failed to parse stream start time");
            None
        }
    }
}
