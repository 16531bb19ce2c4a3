use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use platforms_api::{ChannelSnapshot, FetchError, QualityResolver, SnapshotFetcher, sort_qualities};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::{PollControl, PollPhase};
use crate::channel::{ChannelRecord, ChannelState, LiveInfo, LiveState};
use crate::error::{Error, Result};
use crate::events::{ChannelEvent, ChannelEventBroadcaster};
use crate::registry::ActivePollRegistry;

/// Default poll period.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(60);

/// Default bound on a single fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Called after a refresh changed the live state of a record.
pub type MergeHook = Arc<dyn Fn(&ChannelRecord) + Send + Sync>;

/// Timing of a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    /// Time between the starts of two cycles.
    pub period: Duration,
    /// Bound on each fetch and on each quality resolution.
    pub fetch_timeout: Duration,
}

impl PollerSettings {
    pub fn new(period: Duration, fetch_timeout: Duration) -> Self {
        Self {
            period,
            fetch_timeout,
        }
    }

    /// Both durations must be non-zero; an unbounded fetch could leave the
    /// registry entry stuck.
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(Error::config("poll period must be greater than zero"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(Error::config("fetch timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_PERIOD, DEFAULT_FETCH_TIMEOUT)
    }
}

/// Counters reported when a poller task ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub channel: String,
    pub run_id: Uuid,
    /// Fetches started.
    pub cycles: u64,
    /// Snapshots merged into the record.
    pub merged: u64,
    pub failures: u64,
    /// Fetches that completed after cancellation and were thrown away.
    pub discarded: u64,
}

enum CycleOutcome {
    Merged {
        previous: ChannelState,
        next: ChannelState,
    },
    Failed(FetchError),
    Discarded,
}

/// Periodic refresh of one channel record.
pub struct ChannelPoller {
    run_id: Uuid,
    service: String,
    record: Arc<ChannelRecord>,
    fetcher: Arc<dyn SnapshotFetcher>,
    resolver: Option<Arc<dyn QualityResolver>>,
    registry: ActivePollRegistry,
    events: ChannelEventBroadcaster,
    settings: PollerSettings,
    control: Arc<PollControl>,
    on_change: Option<MergeHook>,
    consecutive_failures: u32,
    summary: PollSummary,
}

impl ChannelPoller {
    pub fn new(
        service: impl Into<String>,
        record: Arc<ChannelRecord>,
        fetcher: Arc<dyn SnapshotFetcher>,
        registry: ActivePollRegistry,
        events: ChannelEventBroadcaster,
        settings: PollerSettings,
        parent_token: &CancellationToken,
    ) -> Self {
        let run_id = Uuid::new_v4();
        let summary = PollSummary {
            channel: record.id().to_string(),
            run_id,
            ..Default::default()
        };
        Self {
            run_id,
            service: service.into(),
            record,
            fetcher,
            resolver: None,
            registry,
            events,
            settings,
            control: Arc::new(PollControl::new(parent_token)),
            on_change: None,
            consecutive_failures: 0,
            summary,
        }
    }

    /// Resolve playable qualities when the channel goes live.
    pub fn with_quality_resolver(mut self, resolver: Arc<dyn QualityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Run `hook` after every refresh that changed the record's live state.
    pub fn on_live_state_change(mut self, hook: MergeHook) -> Self {
        self.on_change = Some(hook);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Start the poll loop on a new task.
    pub fn spawn(self) -> PollerHandle {
        let handle_channel = self.record.id().to_string();
        let run_id = self.run_id;
        let control = self.control.clone();
        let task = tokio::spawn(self.run());
        PollerHandle {
            channel: handle_channel,
            run_id,
            control,
            task,
        }
    }

    async fn run(mut self) -> PollSummary {
        let mut interval = tokio::time::interval(self.settings.period);
        // Overrunning cycles are coalesced, never run back to back
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            service = %self.service,
            channel = %self.record.id(),
            run_id = %self.run_id,
            period_ms = self.settings.period.as_millis() as u64,
            "Poller started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.control.token().cancelled() => break,
                _ = interval.tick() => {}
            }

            if !self.control.begin_fetch() {
                break;
            }
            self.poll_once().await;
        }

        // Covers shutdown through the parent token
        self.control.cancel();

        info!(
            service = %self.service,
            channel = %self.record.id(),
            run_id = %self.run_id,
            cycles = self.summary.cycles,
            failures = self.summary.failures,
            "Poller stopped"
        );
        self.summary
    }

    /// One `Fetching` phase. Must only be called after a successful
    /// `begin_fetch`.
    async fn poll_once(&mut self) {
        let channel = self.record.id().to_string();
        self.summary.cycles += 1;

        let guard = self.registry.register(&channel);
        let fetched = match timeout(self.settings.fetch_timeout, self.fetcher.fetch(&channel)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.settings.fetch_timeout)),
        };

        let outcome = match fetched {
            Ok(snapshot) => {
                let previous = self.record.state();
                let next = self.next_state(&previous, snapshot).await;
                match self
                    .control
                    .finish_fetch(|| self.record.replace(next.clone()))
                {
                    Some(previous) => CycleOutcome::Merged { previous, next },
                    None => CycleOutcome::Discarded,
                }
            }
            Err(error) => match self.control.finish_fetch(|| ()) {
                Some(()) => CycleOutcome::Failed(error),
                None => CycleOutcome::Discarded,
            },
        };
        drop(guard);

        match outcome {
            CycleOutcome::Merged { previous, next } => self.on_merged(previous, next),
            CycleOutcome::Failed(error) => self.on_failed(error),
            CycleOutcome::Discarded => {
                self.summary.discarded += 1;
                debug!(
                    channel = %channel,
                    run_id = %self.run_id,
                    "Discarded fetch result after cancellation"
                );
            }
        }
    }

    async fn next_state(&self, previous: &ChannelState, snapshot: ChannelSnapshot) -> ChannelState {
        let refreshed_at = Some(Utc::now());
        if !snapshot.online {
            return ChannelState {
                live: LiveState::Offline,
                last_refreshed_at: refreshed_at,
            };
        }

        // Resolved qualities are carried forward while live. An empty list
        // means the last resolution failed, so it is tried again.
        let qualities = if !snapshot.available_qualities.is_empty() {
            sort_qualities(&snapshot.available_qualities)
        } else {
            match &previous.live {
                LiveState::Live(info) if !info.available_qualities.is_empty() => {
                    info.available_qualities.clone()
                }
                _ => self.resolve_qualities().await,
            }
        };

        ChannelState {
            live: LiveState::Live(LiveInfo::from_snapshot(snapshot, qualities)),
            last_refreshed_at: refreshed_at,
        }
    }

    async fn resolve_qualities(&self) -> Vec<String> {
        let Some(resolver) = &self.resolver else {
            return Vec::new();
        };
        let url = self.fetcher.channel_url(self.record.id());
        match timeout(self.settings.fetch_timeout, resolver.resolve(&url)).await {
            Ok(Ok(labels)) => sort_qualities(&labels),
            Ok(Err(e)) => {
                warn!(channel = %self.record.id(), error = %e, "Failed to resolve stream qualities");
                Vec::new()
            }
            Err(_) => {
                warn!(channel = %self.record.id(), "Timed out resolving stream qualities");
                Vec::new()
            }
        }
    }

    fn on_merged(&mut self, previous: ChannelState, next: ChannelState) {
        self.summary.merged += 1;
        self.consecutive_failures = 0;
        let channel = self.record.id();
        let now = Utc::now();

        debug!(
            channel = %channel,
            run_id = %self.run_id,
            state = %next.live,
            viewers = next.live.viewer_count(),
            "Merged snapshot"
        );
        self.events.publish(ChannelEvent::StateChanged {
            service: self.service.clone(),
            channel: channel.to_string(),
            state: next.live.clone(),
            timestamp: now,
        });

        match (&previous.live, &next.live) {
            (LiveState::Offline, LiveState::Live(info)) => {
                info!(channel = %channel, title = %info.title, "Channel went live");
                self.events.publish(ChannelEvent::WentLive {
                    service: self.service.clone(),
                    channel: channel.to_string(),
                    title: info.title.clone(),
                    game: info.game.clone(),
                    viewer_count: info.viewer_count,
                    timestamp: now,
                });
            }
            (LiveState::Live(_), LiveState::Offline) => {
                info!(channel = %channel, "Channel went offline");
                self.events.publish(ChannelEvent::WentOffline {
                    service: self.service.clone(),
                    channel: channel.to_string(),
                    timestamp: now,
                });
            }
            _ => {}
        }

        if previous.live != next.live
            && let Some(hook) = &self.on_change
        {
            hook(self.record.as_ref());
        }
    }

    fn on_failed(&mut self, error: FetchError) {
        self.summary.failures += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        warn!(
            service = %self.service,
            channel = %self.record.id(),
            run_id = %self.run_id,
            error = %error,
            kind = error.kind(),
            consecutive_failures = self.consecutive_failures,
            "Fetch failed, keeping last known state"
        );
        self.events.publish(ChannelEvent::FetchFailed {
            service: self.service.clone(),
            channel: self.record.id().to_string(),
            error,
            consecutive_failures: self.consecutive_failures,
            timestamp: Utc::now(),
        });
    }
}

/// Handle to a running poller.
#[derive(Debug)]
pub struct PollerHandle {
    channel: String,
    run_id: Uuid,
    control: Arc<PollControl>,
    task: JoinHandle<PollSummary>,
}

impl PollerHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Stop scheduling fetches. An in-flight fetch runs to completion and
    /// its result is discarded.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    pub fn phase(&self) -> PollPhase {
        self.control.phase()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the poll loop to exit. Does not cancel it.
    pub async fn join(self) -> Result<PollSummary> {
        Ok(self.task.await?)
    }
}
