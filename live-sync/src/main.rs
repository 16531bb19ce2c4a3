use std::sync::Arc;

use live_sync::config::SyncConfig;
use live_sync::events::{ChannelEvent, ChannelEventBroadcaster};
use live_sync::logging;
use live_sync::registry::ActivePollRegistry;
use live_sync::service::ChannelSet;
use platforms_api::FixedQualityResolver;
use platforms_api::twitch::{TwitchClient, TwitchConfig};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = SyncConfig::from_env()?;
    let (logging_config, _log_guard) = logging::init_logging(config.log_dir.as_deref())?;

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.child_token());

    let client = Arc::new(TwitchClient::new(TwitchConfig {
        base_url: config.api_base_url.clone(),
        client_id: config.client_id.clone(),
        request_timeout: config.fetch_timeout(),
        ..Default::default()
    })?);

    let registry = ActivePollRegistry::new();
    let events = ChannelEventBroadcaster::with_capacity(config.event_capacity);

    let mut builder = ChannelSet::builder(config.service.clone(), client.clone())
        .registry(registry.clone())
        .events(events.clone())
        .settings(config.poller_settings())
        .sort_policy(config.sort_policy)
        .parent_token(shutdown.clone());
    if !config.qualities.is_empty() {
        builder = builder.quality_resolver(Arc::new(FixedQualityResolver::new(
            config.qualities.iter().cloned(),
        )));
    }
    let channels = builder.build()?;

    tokio::spawn(log_events(events.subscribe(), shutdown.child_token()));
    tokio::spawn(log_activity(registry.clone(), shutdown.child_token()));

    let report = channels.add_channels_checked(&config.channels).await?;
    for input in &report.invalid {
        warn!(channel = %input, "Ignoring invalid channel");
    }
    for channel in &report.unknown {
        warn!(channel = %channel, "Ignoring channel unknown to the service");
    }

    if let Some(user) = &config.follow_user {
        match channels.import_followed(client.as_ref(), user).await {
            Ok(report) => info!(user = %user, added = report.added.len(), "Imported follows"),
            Err(e) => warn!(user = %user, error = %e, "Failed to import followed channels"),
        }
    }

    info!(
        service = %channels.service(),
        channels = channels.len(),
        period_ms = config.poll_interval_ms,
        "live-sync started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    channels.shutdown().await;
    shutdown.cancel();

    Ok(())
}

async fn log_events(
    mut receiver: tokio::sync::broadcast::Receiver<ChannelEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            event = receiver.recv() => match event {
                Ok(event @ (ChannelEvent::WentLive { .. } | ChannelEvent::WentOffline { .. })) => {
                    info!("{}", event.description());
                }
                Ok(event) => debug!("{}", event.description()),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

async fn log_activity(registry: ActivePollRegistry, cancel_token: CancellationToken) {
    let mut count = registry.subscribe();
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            changed = count.changed() => {
                if changed.is_err() {
                    break;
                }
                let active = *count.borrow_and_update();
                debug!(active, "Active refreshes");
            }
        }
    }
}
