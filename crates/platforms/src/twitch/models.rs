use serde::Deserialize;

/// `stream` object of the `streams/{channel}` endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamObject {
    #[serde(default)]
    pub game: Option<String>,
    #[serde(default)]
    pub viewers: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_playlist: Option<bool>,
    #[serde(default)]
    pub preview: Option<Preview>,
    #[serde(default)]
    pub channel: Option<ChannelObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Preview {
    #[serde(default)]
    pub large: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelObject {
    /// Stream title.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

/// One page of `users/{user}/follows/channels`.
#[derive(Debug, Deserialize)]
pub(crate) struct FollowsPage {
    #[serde(rename = "_total", default)]
    pub total: u64,
    #[serde(default)]
    pub follows: Vec<Follow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Follow {
    pub channel: FollowedChannel,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FollowedChannel {
    pub name: String,
}
