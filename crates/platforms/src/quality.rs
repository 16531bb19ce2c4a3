//! Stream quality resolution.
//!
//! Resolving the playable qualities of a channel is an external concern (a
//! stream-resolving helper owns it). This module only defines the contract and
//! the canonical ordering of the labels shown to users.

use async_trait::async_trait;

use crate::error::FetchError;

/// Canonical quality labels, lowest first.
const CANONICAL_ORDER: [&str; 6] = ["audio", "mobile", "low", "medium", "high", "source"];

/// Aliases every resolver reports; they only matter when nothing else is known.
const ALIASES: [&str; 2] = ["worst", "best"];

/// Resolves the list of playable quality labels for a channel URL.
#[async_trait]
pub trait QualityResolver: Send + Sync + 'static {
    async fn resolve(&self, channel_url: &str) -> Result<Vec<String>, FetchError>;
}

/// Resolver that always answers with the same labels.
#[derive(Debug, Clone, Default)]
pub struct FixedQualityResolver {
    qualities: Vec<String>,
}

impl FixedQualityResolver {
    pub fn new<I, S>(qualities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            qualities: qualities.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl QualityResolver for FixedQualityResolver {
    async fn resolve(&self, _channel_url: &str) -> Result<Vec<String>, FetchError> {
        Ok(sort_qualities(&self.qualities))
    }
}

/// Order quality labels for display.
///
/// Canonical labels come first, lowest to highest and capitalised. Any other
/// label keeps its original spelling and relative order after them. The
/// `worst`/`best` aliases are dropped unless nothing else is known, in which
/// case the result is `["Worst", "Best"]`.
pub fn sort_qualities<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let lowered: Vec<String> = labels
        .iter()
        .map(|label| label.as_ref().trim().to_lowercase())
        .collect();

    let mut sorted: Vec<String> = CANONICAL_ORDER
        .iter()
        .filter(|canonical| lowered.iter().any(|label| label == *canonical))
        .map(|canonical| capitalize(canonical))
        .collect();

    for (label, lower) in labels.iter().zip(&lowered) {
        let label = label.as_ref().trim();
        if label.is_empty()
            || CANONICAL_ORDER.contains(&lower.as_str())
            || ALIASES.contains(&lower.as_str())
            || sorted.iter().any(|existing| existing == label)
        {
            continue;
        }
        sorted.push(label.to_string());
    }

    if sorted.is_empty() {
        sorted = vec!["Worst".to_string(), "Best".to_string()];
    }
    sorted
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
