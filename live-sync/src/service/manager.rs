use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use platforms_api::{FetchError, FollowSource, QualityResolver, SnapshotFetcher};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ordering::{SortPolicy, sort_channels};
use crate::channel::ChannelRecord;
use crate::error::{Error, Result};
use crate::events::{ChannelEvent, ChannelEventBroadcaster};
use crate::poller::{ChannelPoller, MergeHook, PollSummary, PollerHandle, PollerSettings};
use crate::registry::ActivePollRegistry;

/// Outcome of adding many channels at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: Vec<String>,
    /// Already present, skipped.
    pub duplicates: Vec<String>,
    /// Rejected by the fetcher's id rules.
    pub invalid: Vec<String>,
    /// Not known to the service.
    pub unknown: Vec<String>,
}

impl ImportReport {
    fn record(&mut self, input: &str, result: Result<Arc<ChannelRecord>>) -> Result<()> {
        match result {
            Ok(record) => self.added.push(record.id().to_string()),
            Err(Error::DuplicateChannel(id)) => self.duplicates.push(id),
            Err(Error::InvalidChannel(_)) => self.invalid.push(input.to_string()),
            Err(Error::UnknownChannel(id)) => self.unknown.push(id),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

struct ChannelEntry {
    record: Arc<ChannelRecord>,
    poller: PollerHandle,
}

struct SetState {
    /// Insertion order. The sorted view is derived from it.
    entries: Vec<ChannelEntry>,
    policy: SortPolicy,
    closed: bool,
}

struct Inner {
    service: String,
    fetcher: Arc<dyn SnapshotFetcher>,
    resolver: Option<Arc<dyn QualityResolver>>,
    registry: ActivePollRegistry,
    events: ChannelEventBroadcaster,
    settings: PollerSettings,
    shutdown_token: CancellationToken,
    state: Mutex<SetState>,
    view: watch::Sender<Vec<Arc<ChannelRecord>>>,
}

impl Inner {
    /// Rebuild the ordered view. Must be called with `state` locked.
    fn publish_view(&self, state: &SetState) {
        let mut records: Vec<_> = state.entries.iter().map(|e| e.record.clone()).collect();
        sort_channels(&mut records, state.policy);
        self.view.send_if_modified(|current| {
            let unchanged = current.len() == records.len()
                && current
                    .iter()
                    .zip(&records)
                    .all(|(a, b)| Arc::ptr_eq(a, b));
            if unchanged {
                return false;
            }
            *current = records;
            true
        });
    }

    fn resort(&self) {
        let state = self.state.lock();
        if !state.closed {
            self.publish_view(&state);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

/// Channel set manager for one service.
///
/// Owns the records of the service and one poller per record. Clones share
/// the same set. Adding a channel spawns its poller, so the set must be used
/// from within a tokio runtime.
#[derive(Clone)]
pub struct ChannelSet {
    inner: Arc<Inner>,
}

impl ChannelSet {
    pub fn builder(
        service: impl Into<String>,
        fetcher: Arc<dyn SnapshotFetcher>,
    ) -> ChannelSetBuilder {
        ChannelSetBuilder::new(service, fetcher)
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn registry(&self) -> &ActivePollRegistry {
        &self.inner.registry
    }

    pub fn settings(&self) -> PollerSettings {
        self.inner.settings
    }

    // ========== Membership ==========

    /// Add a channel by id or URL and start polling it.
    ///
    /// Returns the new record, initially offline and unrefreshed.
    pub fn add_channel(&self, input: &str) -> Result<Arc<ChannelRecord>> {
        let id = self.normalize(input)?;

        let record = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(Error::ShutDown(self.inner.service.clone()));
            }
            if state.entries.iter().any(|e| e.record.id() == id) {
                return Err(Error::DuplicateChannel(id));
            }

            let record = Arc::new(ChannelRecord::new(id.clone()));
            let poller = self.spawn_poller(record.clone());
            state.entries.push(ChannelEntry {
                record: record.clone(),
                poller,
            });
            self.inner.publish_view(&state);
            record
        };

        info!(service = %self.inner.service, channel = %id, "Added channel");
        self.inner.events.publish(ChannelEvent::ChannelAdded {
            service: self.inner.service.clone(),
            channel: id,
            timestamp: Utc::now(),
        });
        Ok(record)
    }

    /// Like [`add_channel`](Self::add_channel), but first asks the fetcher
    /// whether the channel exists.
    ///
    /// A channel the service does not know is rejected with
    /// `UnknownChannel`. When the check itself fails the channel is added
    /// anyway; polling will report the same failure.
    pub async fn add_channel_checked(&self, input: &str) -> Result<Arc<ChannelRecord>> {
        let id = self.normalize(input)?;
        if self.contains(&id) {
            return Err(Error::DuplicateChannel(id));
        }

        match self.inner.fetcher.channel_exists(&id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(service = %self.inner.service, channel = %id, "Rejected unknown channel");
                return Err(Error::UnknownChannel(id));
            }
            Err(e) => {
                warn!(
                    service = %self.inner.service,
                    channel = %id,
                    error = %e,
                    "Could not verify channel, adding it unchecked"
                );
            }
        }
        self.add_channel(&id)
    }

    /// Remove a channel and cancel its poller.
    ///
    /// The record leaves the collection immediately. A fetch still in flight
    /// completes in the background, is discarded, and unregisters itself.
    /// The returned handle can be joined to wait for that.
    pub fn remove_channel(&self, input: &str) -> Result<PollerHandle> {
        let id = self.normalize(input).unwrap_or_else(|_| input.to_string());

        let poller = {
            let mut state = self.inner.state.lock();
            let Some(index) = state.entries.iter().position(|e| e.record.id() == id) else {
                return Err(Error::ChannelNotFound(id));
            };
            let entry = state.entries.remove(index);
            entry.poller.cancel();
            self.inner.publish_view(&state);
            entry.poller
        };

        info!(service = %self.inner.service, channel = %id, "Removed channel");
        self.inner.events.publish(ChannelEvent::ChannelRemoved {
            service: self.inner.service.clone(),
            channel: id,
            timestamp: Utc::now(),
        });
        Ok(poller)
    }

    /// Add every channel in `inputs`. Duplicates and invalid ids are
    /// collected in the report instead of failing the batch.
    pub fn add_channels<I, S>(&self, inputs: I) -> Result<ImportReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = ImportReport::default();
        for input in inputs {
            let input = input.as_ref();
            report.record(input, self.add_channel(input))?;
        }
        Ok(report)
    }

    /// Add every channel in `inputs` through
    /// [`add_channel_checked`](Self::add_channel_checked). Channels the
    /// service does not know end up in `unknown`.
    pub async fn add_channels_checked<I, S>(&self, inputs: I) -> Result<ImportReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = ImportReport::default();
        for input in inputs {
            let input = input.as_ref();
            report.record(input, self.add_channel_checked(input).await)?;
        }
        Ok(report)
    }

    /// Add every channel `user` follows that is not already present.
    pub async fn import_followed<F>(&self, source: &F, user: &str) -> Result<ImportReport>
    where
        F: FollowSource + ?Sized,
    {
        let followed = source.followed_channels(user).await?;
        let report = self.add_channels_checked(&followed).await?;
        info!(
            service = %self.inner.service,
            user = %user,
            added = report.added.len(),
            duplicates = report.duplicates.len(),
            unknown = report.unknown.len(),
            "Imported followed channels"
        );
        Ok(report)
    }

    // ========== Views ==========

    /// Current records in display order.
    pub fn channels(&self) -> Vec<Arc<ChannelRecord>> {
        self.inner.view.borrow().clone()
    }

    /// Receive the ordered records whenever membership or order changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Arc<ChannelRecord>>> {
        self.inner.view.subscribe()
    }

    /// Channel events of this set's pollers, plus any other set sharing the
    /// same broadcaster.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    /// Look up a record by id or URL, normalized like `add_channel`.
    pub fn get(&self, input: &str) -> Option<Arc<ChannelRecord>> {
        let id = self.normalize(input).unwrap_or_else(|_| input.to_string());
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .find(|e| e.record.id() == id)
            .map(|e| e.record.clone())
    }

    pub fn contains(&self, input: &str) -> bool {
        self.get(input).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========== Ordering ==========

    pub fn sort_policy(&self) -> SortPolicy {
        self.inner.state.lock().policy
    }

    pub fn set_sort_policy(&self, policy: SortPolicy) {
        {
            let mut state = self.inner.state.lock();
            if state.policy == policy {
                return;
            }
            state.policy = policy;
            self.inner.publish_view(&state);
        }

        debug!(service = %self.inner.service, policy = %policy, "Changed sort policy");
        self.inner.events.publish(ChannelEvent::SortPolicyChanged {
            service: self.inner.service.clone(),
            policy,
            timestamp: Utc::now(),
        });
    }

    // ========== Lifecycle ==========

    /// Cancel every poller and wait for their tasks to exit.
    ///
    /// The set rejects new channels afterwards.
    pub async fn shutdown(&self) -> Vec<PollSummary> {
        let pollers: Vec<PollerHandle> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let pollers = state.entries.drain(..).map(|e| e.poller).collect();
            self.inner.view.send_replace(Vec::new());
            pollers
        };
        for poller in &pollers {
            poller.cancel();
        }

        let mut summaries = Vec::with_capacity(pollers.len());
        for poller in pollers {
            let channel = poller.channel().to_string();
            match poller.join().await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(channel = %channel, error = %e, "Poller task did not exit cleanly"),
            }
        }

        info!(
            service = %self.inner.service,
            pollers = summaries.len(),
            "Channel set shut down"
        );
        summaries
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().closed
    }

    fn normalize(&self, input: &str) -> Result<String> {
        self.inner
            .fetcher
            .normalize_channel(input)
            .map_err(|e| match e {
                FetchError::InvalidChannel(raw) => Error::InvalidChannel(raw),
                other => Error::Fetch(other),
            })
    }

    fn spawn_poller(&self, record: Arc<ChannelRecord>) -> PollerHandle {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let hook: MergeHook = Arc::new(move |_record: &ChannelRecord| {
            if let Some(inner) = weak.upgrade() {
                inner.resort();
            }
        });

        let mut poller = ChannelPoller::new(
            self.inner.service.clone(),
            record,
            self.inner.fetcher.clone(),
            self.inner.registry.clone(),
            self.inner.events.clone(),
            self.inner.settings,
            &self.inner.shutdown_token,
        )
        .on_live_state_change(hook);
        if let Some(resolver) = &self.inner.resolver {
            poller = poller.with_quality_resolver(resolver.clone());
        }
        poller.spawn()
    }
}

impl std::fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ChannelSet")
            .field("service", &self.inner.service)
            .field("channels", &state.entries.len())
            .field("policy", &state.policy)
            .field("closed", &state.closed)
            .finish()
    }
}

/// Builder for [`ChannelSet`].
pub struct ChannelSetBuilder {
    service: String,
    fetcher: Arc<dyn SnapshotFetcher>,
    resolver: Option<Arc<dyn QualityResolver>>,
    registry: Option<ActivePollRegistry>,
    events: Option<ChannelEventBroadcaster>,
    settings: PollerSettings,
    policy: SortPolicy,
    parent_token: Option<CancellationToken>,
}

impl ChannelSetBuilder {
    fn new(service: impl Into<String>, fetcher: Arc<dyn SnapshotFetcher>) -> Self {
        Self {
            service: service.into(),
            fetcher,
            resolver: None,
            registry: None,
            events: None,
            settings: PollerSettings::default(),
            policy: SortPolicy::default(),
            parent_token: None,
        }
    }

    /// Shared registry. Defaults to a private one.
    pub fn registry(mut self, registry: ActivePollRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn events(mut self, events: ChannelEventBroadcaster) -> Self {
        self.events = Some(events);
        self
    }

    pub fn quality_resolver(mut self, resolver: Arc<dyn QualityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn settings(mut self, settings: PollerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn sort_policy(mut self, policy: SortPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cancelling `token` stops every poller of the set.
    pub fn parent_token(mut self, token: CancellationToken) -> Self {
        self.parent_token = Some(token);
        self
    }

    pub fn build(self) -> Result<ChannelSet> {
        self.settings.validate()?;
        if self.service.trim().is_empty() {
            return Err(Error::config("service name must not be empty"));
        }

        let shutdown_token = match &self.parent_token {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let (view, _) = watch::channel(Vec::new());

        Ok(ChannelSet {
            inner: Arc::new(Inner {
                service: self.service,
                fetcher: self.fetcher,
                resolver: self.resolver,
                registry: self.registry.unwrap_or_default(),
                events: self.events.unwrap_or_default(),
                settings: self.settings,
                shutdown_token,
                state: Mutex::new(SetState {
                    entries: Vec::new(),
                    policy: self.policy,
                    closed: false,
                }),
                view,
            }),
        })
    }
}
