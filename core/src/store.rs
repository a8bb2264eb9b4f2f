// Live location store
//
// Keyed collection of "last known position per tracked subject", folded from
// snapshot and single-update events. Entities are never deleted; they only go
// offline via the periodic staleness sweep, and the whole collection clears
// on an explicit disconnect.

use crate::protocol::{Channel, DisconnectReason, PositionSample, ServerEvent};
use crate::transport::SocketTransport;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Last known position of one tracked subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub subject_id: i64,
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    /// When the sample was produced at the source
    pub sample_timestamp: DateTime<Utc>,
    /// When the most recent sample was applied to this entity
    pub last_update: DateTime<Utc>,
    /// Derived: last_update within the staleness window at last evaluation
    pub online: bool,
}

fn synthesized_name(subject_id: i64) -> String {
    format!("Subject {}", subject_id)
}

/// In-memory reconciled collection keyed by subject id, last-write-wins.
#[derive(Clone)]
pub struct LiveLocationStore {
    positions: Arc<DashMap<i64, TrackedPosition>>,
    staleness_window: chrono::Duration,
}

impl LiveLocationStore {
    pub fn new(staleness_window: Duration) -> Self {
        Self {
            positions: Arc::new(DashMap::new()),
            staleness_window: chrono::Duration::from_std(staleness_window)
                .unwrap_or_else(|_| chrono::Duration::minutes(2)),
        }
    }

    /// Replace the whole collection with the snapshot contents. Snapshot
    /// entries are current knowledge, so every entity comes up online no
    /// matter what its embedded timestamp says; the next sweep re-evaluates.
    pub fn apply_snapshot(&self, samples: Vec<PositionSample>) {
        let now = Utc::now();
        self.positions.clear();
        let count = samples.len();
        for sample in samples {
            let ts = sample.timestamp.unwrap_or(now);
            self.positions.insert(
                sample.subject_id,
                TrackedPosition {
                    subject_id: sample.subject_id,
                    display_name: sample
                        .display_name
                        .unwrap_or_else(|| synthesized_name(sample.subject_id)),
                    latitude: sample.latitude,
                    longitude: sample.longitude,
                    accuracy: sample.accuracy,
                    sample_timestamp: ts,
                    last_update: ts,
                    online: true,
                },
            );
        }
        info!(target: "store", subjects = count, "Applied snapshot");
    }

    /// Merge a single-subject update: replace position fields in place, or
    /// insert a new entity on first sight of the subject.
    pub fn apply_update(&self, sample: PositionSample) {
        let now = Utc::now();
        let sample_ts = sample.timestamp.unwrap_or(now);

        match self.positions.entry(sample.subject_id) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let position = entry.get_mut();
                position.latitude = sample.latitude;
                position.longitude = sample.longitude;
                position.accuracy = sample.accuracy;
                position.sample_timestamp = sample_ts;
                position.last_update = now;
                position.online = true;
                if let Some(name) = sample.display_name {
                    position.display_name = name;
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(TrackedPosition {
                    subject_id: sample.subject_id,
                    display_name: sample
                        .display_name
                        .unwrap_or_else(|| synthesized_name(sample.subject_id)),
                    latitude: sample.latitude,
                    longitude: sample.longitude,
                    accuracy: sample.accuracy,
                    sample_timestamp: sample_ts,
                    last_update: now,
                    online: true,
                });
            }
        }
        debug!(target: "store", subject = sample.subject_id, "Applied update");
    }

    /// Recompute `online` for every entity against `now`. This is the only
    /// path that flips a subject offline; the server never declares it.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let cutoff = now - self.staleness_window;
        let mut went_offline = 0usize;
        for mut entry in self.positions.iter_mut() {
            let fresh = entry.last_update > cutoff;
            if entry.online && !fresh {
                went_offline += 1;
            }
            entry.online = fresh;
        }
        if went_offline > 0 {
            info!(target: "store", count = went_offline, "Subjects went offline");
        }
    }

    /// Clear the collection (explicit disconnect, not reconnection).
    pub fn reset(&self) {
        self.positions.clear();
        info!(target: "store", "Store reset");
    }

    pub fn get(&self, subject_id: i64) -> Option<TrackedPosition> {
        self.positions.get(&subject_id).map(|p| p.clone())
    }

    /// All tracked positions, ordered by subject id for stable output.
    pub fn all(&self) -> Vec<TrackedPosition> {
        let mut positions: Vec<TrackedPosition> =
            self.positions.iter().map(|p| p.clone()).collect();
        positions.sort_by_key(|p| p.subject_id);
        positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.positions.iter().filter(|p| p.online).count()
    }

    /// Fold transport events into the store until the transport goes away.
    pub fn attach(&self, transport: &SocketTransport) -> tokio::task::JoinHandle<()> {
        let (_snap_id, mut snapshots) = transport.subscribe(Channel::Snapshot);
        let (_upd_id, mut updates) = transport.subscribe(Channel::Update);
        let (_disc_id, mut lifecycle) = transport.subscribe(Channel::Disconnected);
        let store = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = snapshots.recv() => match event {
                        Some(ServerEvent::Snapshot(samples)) => store.apply_snapshot(samples),
                        Some(_) => {}
                        None => break,
                    },
                    event = updates.recv() => match event {
                        Some(ServerEvent::Update(sample)) => store.apply_update(sample),
                        Some(_) => {}
                        None => break,
                    },
                    event = lifecycle.recv() => match event {
                        Some(ServerEvent::Disconnected { reason: DisconnectReason::Requested }) => {
                            store.reset();
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            debug!(target: "store", "Store listener exited");
        })
    }

    /// Run the staleness sweep on a fixed interval.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.sweep(Utc::now());
            }
        })
    }
}
