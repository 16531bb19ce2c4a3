use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelRecord;
use crate::error::Error;

/// How a channel set orders its records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    /// Order in which channels were added.
    Insertion,
    /// Case-insensitive by id.
    Alphabetical,
    /// Live channels first, each group alphabetical.
    #[default]
    LiveFirst,
}

impl SortPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortPolicy::Insertion => "insertion",
            SortPolicy::Alphabetical => "alphabetical",
            SortPolicy::LiveFirst => "live_first",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "insertion" => Some(SortPolicy::Insertion),
            "alphabetical" => Some(SortPolicy::Alphabetical),
            "live_first" => Some(SortPolicy::LiveFirst),
            _ => None,
        }
    }
}

impl std::fmt::Display for SortPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::config(format!("unknown sort policy: {}", s)))
    }
}

fn compare_ids(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Sort `records` in place according to `policy`.
///
/// The sort is stable: records that rank equal keep their current relative
/// order, so callers pass records in insertion order. Liveness is read once
/// up front so a refresh landing mid-sort cannot make the comparator
/// inconsistent.
pub fn sort_channels(records: &mut [Arc<ChannelRecord>], policy: SortPolicy) {
    match policy {
        SortPolicy::Insertion => {}
        SortPolicy::Alphabetical => records.sort_by(|a, b| compare_ids(a.id(), b.id())),
        SortPolicy::LiveFirst => {
            let mut keyed: Vec<(bool, Arc<ChannelRecord>)> = records
                .iter()
                .map(|record| (record.is_live(), record.clone()))
                .collect();
            keyed.sort_by(|(a_live, a), (b_live, b)| {
                b_live
                    .cmp(a_live)
                    .then_with(|| compare_ids(a.id(), b.id()))
            });
            for (slot, (_, record)) in records.iter_mut().zip(keyed) {
                *slot = record;
            }
        }
    }
}
