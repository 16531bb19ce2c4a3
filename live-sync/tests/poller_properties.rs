//! Poll loop behaviour observed through a channel set.

mod common;

use std::time::Duration;

use common::{ScriptedFetcher, Step, channel_set, channel_set_with, wait_until, within};
use live_sync::channel::LiveState;
use live_sync::events::ChannelEvent;
use live_sync::poller::PollerSettings;
use live_sync::registry::ActivePollRegistry;
use live_sync::service::SortPolicy;
use platforms_api::FetchError;

#[tokio::test]
async fn test_at_most_one_fetch_in_flight_per_channel() {
    let fetcher = ScriptedFetcher::new();
    let channels = ["alpha", "bravo", "charlie"];
    // Every fetch outlasts the period, so ticks pile up behind it
    for channel in channels {
        fetcher.script(
            channel,
            [Step::live(channel, 1).delayed(Duration::from_millis(70))],
        );
    }

    let registry = ActivePollRegistry::new();
    let set = channel_set_with(
        fetcher.clone(),
        registry.clone(),
        PollerSettings::new(Duration::from_millis(10), Duration::from_millis(500)),
        SortPolicy::LiveFirst,
    );
    set.add_channels(channels).unwrap();

    wait_until(|| channels.iter().all(|c| fetcher.calls(c) >= 4)).await;
    set.shutdown().await;

    for channel in channels {
        assert_eq!(fetcher.max_in_flight(channel), 1, "{} overlapped", channel);
    }
    assert!(!registry.is_active());
}

#[tokio::test]
async fn test_failed_fetch_keeps_state_and_polling_continues() {
    let fetcher = ScriptedFetcher::new();
    fetcher.script(
        "foo",
        [
            Step::live("foo", 42),
            Step::fail(FetchError::NetworkUnreachable("connection refused".into())),
        ],
    );

    let registry = ActivePollRegistry::new();
    let set = channel_set(fetcher.clone(), registry.clone());
    let record = set.add_channel("foo").unwrap();

    wait_until(|| record.is_live()).await;
    let merged = record.state();

    // Failures repeat from here on; the loop must keep going
    let calls_after_merge = fetcher.calls("foo");
    wait_until(|| fetcher.calls("foo") >= calls_after_merge + 3).await;

    assert_eq!(record.state(), merged);
    assert_eq!(record.live_state().viewer_count(), 42);

    let summaries = set.shutdown().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].merged, 1);
    assert!(summaries[0].failures >= 3);
}

#[tokio::test]
async fn test_live_then_timeout_keeps_stale_viewer_count() {
    let fetcher = ScriptedFetcher::new();
    fetcher.script(
        "foo",
        [
            Step::live("foo", 42),
            Step::live("foo", 99).delayed(Duration::from_secs(2)),
        ],
    );

    let registry = ActivePollRegistry::new();
    let set = channel_set_with(
        fetcher.clone(),
        registry.clone(),
        PollerSettings::new(Duration::from_millis(25), Duration::from_millis(100)),
        SortPolicy::LiveFirst,
    );
    let mut events = set.events();
    let record = set.add_channel("foo").unwrap();
    assert!(record.last_refreshed_at().is_none());

    let timed_out = within(async {
        loop {
            match events.recv().await.unwrap() {
                ChannelEvent::FetchFailed { channel, error, .. } if channel == "foo" => {
                    break error;
                }
                _ => continue,
            }
        }
    })
    .await;
    assert_eq!(timed_out, FetchError::Timeout(Duration::from_millis(100)));

    let state = record.state();
    match &state.live {
        LiveState::Live(info) => {
            assert_eq!(info.viewer_count, 42);
            assert_eq!(info.title, "foo stream");
        }
        LiveState::Offline => panic!("expected foo to stay live"),
    }
    assert!(state.last_refreshed_at.is_some());

    // Later fetches keep timing out; none of them may stay registered
    set.shutdown().await;
    assert!(!registry.is_active());
    assert_eq!(fetcher.in_flight("foo"), 0);
}

#[tokio::test]
async fn test_went_live_and_offline_events() {
    let fetcher = ScriptedFetcher::new();
    fetcher.script(
        "foo",
        [Step::offline("foo"), Step::live("foo", 5), Step::offline("foo")],
    );

    let set = channel_set(fetcher.clone(), ActivePollRegistry::new());
    let mut events = set.events();
    set.add_channel("foo").unwrap();

    let transitions = within(async {
        let mut seen = Vec::new();
        while seen.len() < 2 {
            match events.recv().await.unwrap() {
                ChannelEvent::WentLive { viewer_count, .. } => {
                    seen.push(format!("live:{}", viewer_count))
                }
                ChannelEvent::WentOffline { .. } => seen.push("offline".to_string()),
                _ => {}
            }
        }
        seen
    })
    .await;

    assert_eq!(transitions, vec!["live:5", "offline"]);
    set.shutdown().await;
}

#[tokio::test]
async fn test_record_subscribers_see_whole_states() {
    let fetcher = ScriptedFetcher::new();
    fetcher.script("foo", [Step::live("foo", 7)]);

    let set = channel_set(fetcher, ActivePollRegistry::new());
    let record = set.add_channel("foo").unwrap();
    let mut updates = record.subscribe();

    within(updates.changed()).await.unwrap();
    let state = updates.borrow_and_update().clone();
    // Live info and refresh time arrive together
    assert!(state.live.is_live());
    assert!(state.last_refreshed_at.is_some());

    set.shutdown().await;
}
