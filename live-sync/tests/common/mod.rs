//! Shared helpers for live-sync integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use live_sync::poller::PollerSettings;
use live_sync::registry::ActivePollRegistry;
use live_sync::service::{ChannelSet, SortPolicy};
use parking_lot::Mutex;
use platforms_api::{ChannelSnapshot, FetchError, SnapshotFetcher};

/// One scripted fetch.
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub result: Result<ChannelSnapshot, FetchError>,
}

impl Step {
    pub fn live(channel: &str, viewers: u64) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(ChannelSnapshot::builder(channel)
                .title(format!("{} stream", channel))
                .game("Just Chatting")
                .viewer_count(viewers)
                .build()),
        }
    }

    pub fn offline(channel: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(ChannelSnapshot::offline(channel)),
        }
    }

    pub fn fail(error: FetchError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Counters {
    in_flight: usize,
    max_in_flight: usize,
    calls: usize,
}

/// Fetcher replaying a per-channel script.
///
/// Once a channel's script runs out its last step repeats; channels without
/// a script are offline. Tracks concurrent calls per channel.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    unknown: Mutex<HashSet<String>>,
    last: Mutex<HashMap<String, Step>>,
    counters: Mutex<HashMap<String, Counters>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, channel: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .entry(channel.to_string())
            .or_default()
            .extend(steps);
    }

    /// Report `channel` as not existing on the service.
    pub fn forget(&self, channel: &str) {
        self.unknown.lock().insert(channel.to_string());
    }

    pub fn calls(&self, channel: &str) -> usize {
        self.counters.lock().get(channel).map_or(0, |c| c.calls)
    }

    pub fn max_in_flight(&self, channel: &str) -> usize {
        self.counters.lock().get(channel).map_or(0, |c| c.max_in_flight)
    }

    pub fn in_flight(&self, channel: &str) -> usize {
        self.counters.lock().get(channel).map_or(0, |c| c.in_flight)
    }

    fn next_step(&self, channel: &str) -> Step {
        let scripted = self
            .scripts
            .lock()
            .get_mut(channel)
            .and_then(|steps| steps.pop_front());
        match scripted {
            Some(step) => {
                self.last.lock().insert(channel.to_string(), step.clone());
                step
            }
            None => self
                .last
                .lock()
                .get(channel)
                .cloned()
                .unwrap_or_else(|| Step::offline(channel)),
        }
    }
}

/// Decrements the in-flight counter even when the fetch future is dropped
/// by a timeout.
struct InFlight<'a> {
    fetcher: &'a ScriptedFetcher,
    channel: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(counters) = self.fetcher.counters.lock().get_mut(&self.channel) {
            counters.in_flight -= 1;
        }
    }
}

#[async_trait]
impl SnapshotFetcher for ScriptedFetcher {
    async fn fetch(&self, channel: &str) -> Result<ChannelSnapshot, FetchError> {
        {
            let mut counters = self.counters.lock();
            let entry = counters.entry(channel.to_string()).or_default();
            entry.calls += 1;
            entry.in_flight += 1;
            entry.max_in_flight = entry.max_in_flight.max(entry.in_flight);
        }
        let _in_flight = InFlight {
            fetcher: self,
            channel: channel.to_string(),
        };

        let step = self.next_step(channel);
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.result
    }

    async fn channel_exists(&self, channel: &str) -> Result<bool, FetchError> {
        Ok(!self.unknown.lock().contains(channel))
    }
}

pub fn fast_settings() -> PollerSettings {
    PollerSettings::new(Duration::from_millis(25), Duration::from_millis(250))
}

pub fn channel_set(fetcher: Arc<ScriptedFetcher>, registry: ActivePollRegistry) -> ChannelSet {
    channel_set_with(fetcher, registry, fast_settings(), SortPolicy::LiveFirst)
}

pub fn channel_set_with(
    fetcher: Arc<ScriptedFetcher>,
    registry: ActivePollRegistry,
    settings: PollerSettings,
    policy: SortPolicy,
) -> ChannelSet {
    ChannelSet::builder("twitch.tv", fetcher)
        .registry(registry)
        .settings(settings)
        .sort_policy(policy)
        .build()
        .expect("valid channel set")
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

/// Await `future`, failing the test after five seconds.
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("future did not complete within 5s")
}
