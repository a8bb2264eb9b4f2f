// Console tracking demo
//
// Connects to a tracking server, follows live position updates, prints a
// periodic summary of the rendered live map, and optionally replays one
// subject's recent history at startup.

mod config;

use chrono::{Duration as ChronoDuration, Utc};
use config::ConsoleConfig;
use rastro_core::map::{HistoryMapView, LiveMapView};
use rastro_core::{Channel, HistoryClient, HistoryQuery, ServerEvent, Tracker};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ConsoleConfig::load();
    info!(
        target: "console_tracker",
        server = %config.tracker.server_url,
        api = %config.tracker.api_base_url,
        tiles = config.tracker.map_access_token.is_some(),
        "Starting console tracker"
    );
    if config.tracker.map_access_token.is_none() {
        warn!(
            target: "console_tracker",
            "No map tile access token configured; scenes render without a tile layer"
        );
    }

    let mut tracker = Tracker::new(config.tracker.clone())?;
    let state = tracker.start().await?;
    if !state.connected {
        warn!(
            target: "console_tracker",
            error = ?state.error,
            "Initial connection failed; live updates will resume if the server comes back"
        );
    }

    if let Some(subject_id) = config.history_subject {
        replay_history(&config, subject_id).await;
    }

    // Log every realtime update as it lands
    let (_sub_id, mut updates) = tracker.transport.subscribe(Channel::Update);
    let update_logger = tokio::spawn(async move {
        while let Some(event) = updates.recv().await {
            if let ServerEvent::Update(sample) = event {
                info!(
                    target: "console_tracker",
                    subject = sample.subject_id,
                    lat = sample.latitude,
                    lng = sample.longitude,
                    "Position update"
                );
            }
        }
    });

    match tracker
        .control
        .request_status(config.tracker.status_timeout())
        .await
    {
        Ok(status) => info!(target: "console_tracker", status = ?status, "Tracking status"),
        Err(e) => warn!(target: "console_tracker", error = %e, "Tracking status unavailable"),
    }

    let mut live_view = LiveMapView::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(config.print_interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let positions = tracker.store.all();
                let scene = live_view.render(&positions);
                info!(
                    target: "console_tracker",
                    subjects = positions.len(),
                    online = tracker.store.online_count(),
                    markers = scene.markers.len(),
                    "Live summary"
                );
                for marker in &scene.markers {
                    info!(
                        target: "console_tracker",
                        subject = marker.id,
                        label = %marker.label,
                        lat = marker.position.lat,
                        lng = marker.position.lng,
                        "  marker"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(target: "console_tracker", "Interrupt received");
                break;
            }
        }
    }

    update_logger.abort();
    tracker.shutdown().await;

    let stats = tracker.transport.stats();
    info!(
        target: "console_tracker",
        frames = stats.frames_received,
        delivered = stats.events_delivered,
        dropped = stats.dropped_events,
        malformed = stats.malformed_frames,
        "Session stats"
    );
    Ok(())
}

/// Fetch and render the last hour of history for one subject.
async fn replay_history(config: &ConsoleConfig, subject_id: i64) {
    let client = HistoryClient::new(&config.tracker);
    let end = Utc::now();
    let query = HistoryQuery {
        subject_id,
        start: end - ChronoDuration::hours(1),
        end,
        limit: 500,
        offset: 0,
    };

    match client.query(&query).await {
        Ok(page) => {
            let mut view = HistoryMapView::new();
            let scene = view.render(&page.points);
            info!(
                target: "console_tracker",
                subject = subject_id,
                points = page.points.len(),
                total = page.total,
                dropped = page.dropped,
                route = scene.route.as_ref().map(|r| r.len()).unwrap_or(0),
                "History replay"
            );
        }
        Err(e) => error!(target: "console_tracker", subject = subject_id, error = %e, "History replay failed"),
    }
}
