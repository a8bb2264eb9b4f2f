// Realtime transport adapter
//
// Owns the single websocket connection to the location-streaming server and
// multiplexes decoded frames into per-channel subscriptions. Connection
// failures are never thrown at callers: connect() resolves a ConnectionState
// and failures also reach the Error channel. A dropped connection triggers a
// bounded auto-reconnect; an explicit disconnect() does not.

use crate::config::TrackerConfig;
use crate::protocol::{self, Channel, ClientMessage, DisconnectReason, ServerEvent};
use crate::{RastroError, Result};
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Resolved connection status. `error` holds the most recent failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub connecting: bool,
    pub error: Option<String>,
}

impl ConnectionState {
    fn connected() -> Self {
        Self {
            connected: true,
            connecting: false,
            error: None,
        }
    }

    fn failed(reason: String) -> Self {
        Self {
            connected: false,
            connecting: false,
            error: Some(reason),
        }
    }
}

/// Transport counters, snapshot-able for diagnostics.
#[derive(Debug, Default)]
pub struct TransportStats {
    pub frames_received: AtomicU64,
    pub events_delivered: AtomicU64,
    pub dropped_events: AtomicU64,
    pub malformed_frames: AtomicU64,
    pub dropped_samples: AtomicU64,
    pub reconnect_attempts: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportStatsSnapshot {
    pub frames_received: u64,
    pub events_delivered: u64,
    pub dropped_events: u64,
    pub malformed_frames: u64,
    pub dropped_samples: u64,
    pub reconnect_attempts: u64,
}

impl TransportStats {
    fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

struct Subscription {
    id: String,
    sender: mpsc::Sender<ServerEvent>,
}

enum Phase {
    Idle,
    /// A connect attempt is in flight; late callers fold into it
    Connecting(watch::Receiver<Option<ConnectionState>>),
    Connected,
}

struct Inner {
    phase: Phase,
    writer: Option<mpsc::Sender<ClientMessage>>,
    /// Bumped per established connection and per explicit disconnect, so a
    /// stale reader task cannot trigger a reconnect for a superseded socket
    generation: u64,
    /// Set by disconnect(); suppresses auto-reconnect until the next connect()
    closed: bool,
    last_error: Option<String>,
}

/// The process-wide websocket connection plus its subscription registry.
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct SocketTransport {
    server_url: String,
    snapshot_request_delay: Duration,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    inner: Arc<Mutex<Inner>>,
    subscriptions: Arc<DashMap<Channel, Vec<Subscription>>>,
    stats: Arc<TransportStats>,
    next_sub_id: Arc<AtomicU64>,
}

/// Per-subscriber queue depth. A subscriber that falls this far behind starts
/// losing events rather than blocking the reader.
const SUBSCRIBER_QUEUE: usize = 256;

impl SocketTransport {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            server_url: config.server_url.clone(),
            snapshot_request_delay: config.snapshot_request_delay(),
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay(),
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                writer: None,
                generation: 0,
                closed: false,
                last_error: None,
            })),
            subscriptions: Arc::new(DashMap::new()),
            stats: Arc::new(TransportStats::default()),
            next_sub_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Open the connection. Idempotent: an established connection returns
    /// immediately and concurrent callers share a single attempt. Failures
    /// resolve as state, never as an error.
    pub async fn connect(&self) -> ConnectionState {
        loop {
            enum Action {
                Done(ConnectionState),
                Wait(watch::Receiver<Option<ConnectionState>>),
                Dial(watch::Sender<Option<ConnectionState>>, u64),
            }

            let action = {
                let mut inner = self.inner.lock().await;
                match &inner.phase {
                    Phase::Connected => Action::Done(ConnectionState::connected()),
                    Phase::Connecting(rx) => Action::Wait(rx.clone()),
                    Phase::Idle => {
                        let (tx, rx) = watch::channel(None);
                        inner.phase = Phase::Connecting(rx);
                        inner.closed = false;
                        Action::Dial(tx, inner.generation)
                    }
                }
            };

            match action {
                Action::Done(state) => return state,
                Action::Dial(tx, dial_generation) => return self.dial(tx, dial_generation).await,
                Action::Wait(mut rx) => {
                    loop {
                        let resolved = rx.borrow().clone();
                        if let Some(state) = resolved {
                            return state;
                        }
                        if rx.changed().await.is_err() {
                            // Attempt owner vanished; re-evaluate the phase
                            break;
                        }
                    }
                }
            }
        }
    }

    /// `dial_generation` pins the attempt to the state it started from: a
    /// disconnect() during the handshake bumps the generation, and a dial
    /// that comes back to a different generation abandons its socket instead
    /// of resurrecting a connection the owner already tore down.
    async fn dial(
        &self,
        resolve: watch::Sender<Option<ConnectionState>>,
        dial_generation: u64,
    ) -> ConnectionState {
        info!(target: "transport", url = %self.server_url, "Connecting to tracking server");

        match connect_async(self.server_url.as_str()).await {
            Err(e) => {
                let reason = e.to_string();
                {
                    let mut inner = self.inner.lock().await;
                    if inner.generation == dial_generation && !inner.closed {
                        inner.phase = Phase::Idle;
                        inner.last_error = Some(reason.clone());
                    }
                }
                warn!(target: "transport", error = %reason, "Connection failed");
                let state = ConnectionState::failed(reason.clone());
                let _ = resolve.send(Some(state.clone()));
                self.dispatch(ServerEvent::Error { message: reason });
                state
            }
            Ok((ws, _response)) => {
                let (sink, stream) = ws.split();
                let (writer_tx, writer_rx) = mpsc::channel(64);

                let installed = {
                    let mut inner = self.inner.lock().await;
                    if inner.closed || inner.generation != dial_generation {
                        None
                    } else {
                        inner.generation += 1;
                        inner.phase = Phase::Connected;
                        inner.writer = Some(writer_tx);
                        inner.last_error = None;
                        Some(inner.generation)
                    }
                };

                let Some(generation) = installed else {
                    // disconnect() won the race; the fresh socket is dropped
                    // unused and the transport stays down
                    info!(target: "transport", "Handshake completed after disconnect, dropping socket");
                    let state =
                        ConnectionState::failed("disconnected during connect".to_string());
                    let _ = resolve.send(Some(state.clone()));
                    return state;
                };

                self.spawn_writer(sink, writer_rx);
                self.spawn_reader(stream, generation);
                self.spawn_snapshot_request();

                info!(target: "transport", "Connected to tracking server");
                let state = ConnectionState::connected();
                let _ = resolve.send(Some(state.clone()));
                self.dispatch(ServerEvent::Connected);
                state
            }
        }
    }

    /// Tear down the active connection, if any. Subscriptions survive so a
    /// later connect() keeps notifying existing subscribers. Idempotent.
    pub async fn disconnect(&self) {
        let was_connected = {
            let mut inner = self.inner.lock().await;
            inner.closed = true;
            inner.generation += 1;
            inner.writer = None;
            let was = matches!(inner.phase, Phase::Connected);
            inner.phase = Phase::Idle;
            was
        };

        if was_connected {
            info!(target: "transport", "Disconnected from tracking server");
            self.dispatch(ServerEvent::Disconnected {
                reason: DisconnectReason::Requested,
            });
        }
    }

    /// Current connection state without side effects.
    pub async fn state(&self) -> ConnectionState {
        let inner = self.inner.lock().await;
        match &inner.phase {
            Phase::Connected => ConnectionState::connected(),
            Phase::Connecting(_) => ConnectionState {
                connected: false,
                connecting: true,
                error: None,
            },
            Phase::Idle => ConnectionState {
                connected: false,
                connecting: false,
                error: inner.last_error.clone(),
            },
        }
    }

    /// Send a message over the active connection.
    pub async fn send(&self, message: ClientMessage) -> Result<()> {
        let sender = {
            let inner = self.inner.lock().await;
            inner.writer.clone()
        }
        .ok_or_else(|| RastroError::TransportError("not connected".to_string()))?;

        sender
            .send(message)
            .await
            .map_err(|_| RastroError::TransportError("connection closed".to_string()))
    }

    /// Subscribe to one channel. Returns the subscription id and a bounded
    /// receiver; a full queue drops events for this subscriber only.
    pub fn subscribe(&self, channel: Channel) -> (String, mpsc::Receiver<ServerEvent>) {
        let id = format!(
            "sub-{}-{}",
            channel.as_str(),
            self.next_sub_id.fetch_add(1, Ordering::Relaxed)
        );
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);

        self.subscriptions
            .entry(channel)
            .or_default()
            .push(Subscription {
                id: id.clone(),
                sender: tx,
            });

        debug!(target: "transport", subscription = %id, "Created subscription");
        (id, rx)
    }

    pub fn unsubscribe(&self, subscription_id: &str) {
        for mut entry in self.subscriptions.iter_mut() {
            entry.value_mut().retain(|sub| sub.id != subscription_id);
        }
        debug!(target: "transport", subscription = %subscription_id, "Removed subscription");
    }

    pub fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }

    /// Deliver an event to every live subscriber of its channel. One slow or
    /// dropped subscriber never blocks or starves the others.
    fn dispatch(&self, event: ServerEvent) {
        let channel = event.channel();
        let Some(mut subs) = self.subscriptions.get_mut(&channel) else {
            return;
        };

        subs.value_mut().retain(|sub| !sub.sender.is_closed());

        let mut delivered = 0u64;
        let mut dropped = 0u64;
        for sub in subs.value() {
            match sub.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    dropped += 1;
                    warn!(
                        target: "transport",
                        subscription = %sub.id,
                        "Subscriber queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dropped += 1,
            }
        }

        self.stats
            .events_delivered
            .fetch_add(delivered, Ordering::Relaxed);
        self.stats
            .dropped_events
            .fetch_add(dropped, Ordering::Relaxed);
    }

    fn spawn_writer(&self, mut sink: WsSink, mut rx: mpsc::Receiver<ClientMessage>) {
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(target: "transport", error = %e, "Failed to encode outbound frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(target: "transport", error = %e, "Failed to send frame");
                    break;
                }
            }
            let _ = sink.close().await;
            debug!(target: "transport", "Writer task exited");
        });
    }

    fn spawn_reader(&self, mut stream: WsStream, generation: u64) {
        let transport = self.clone();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => transport.handle_frame(text.as_str()),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(target: "transport", error = %e, "Read error");
                        break;
                    }
                }
            }
            debug!(target: "transport", "Reader task exited");
            transport.handle_drop(generation).await;
        });
    }

    fn handle_frame(&self, text: &str) {
        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
        match protocol::decode_frame(text) {
            Ok((event, dropped_samples)) => {
                if dropped_samples > 0 {
                    self.stats
                        .dropped_samples
                        .fetch_add(dropped_samples as u64, Ordering::Relaxed);
                    warn!(
                        target: "transport",
                        dropped = dropped_samples,
                        "Snapshot contained malformed entries"
                    );
                }
                self.dispatch(event);
            }
            Err(e) => {
                self.stats.malformed_frames.fetch_add(1, Ordering::Relaxed);
                debug!(target: "transport", error = %e, "Ignoring undecodable frame");
            }
        }
    }

    /// Schedule the full-snapshot request shortly after connect. The settle
    /// delay is a documented workaround for server-side session setup.
    fn spawn_snapshot_request(&self) {
        let transport = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(transport.snapshot_request_delay).await;
            if let Err(e) = transport.send(ClientMessage::GetAllLocations).await {
                debug!(target: "transport", error = %e, "Snapshot request skipped");
            }
        });
    }

    /// Called by a reader task when its stream ends. Ignored if the
    /// connection was superseded or intentionally closed.
    async fn handle_drop(&self, generation: u64) {
        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation || inner.closed {
                return;
            }
            inner.phase = Phase::Idle;
            inner.writer = None;
            inner.last_error = Some("connection lost".to_string());
        }

        warn!(target: "transport", "Connection lost");
        self.dispatch(ServerEvent::Disconnected {
            reason: DisconnectReason::ConnectionLost,
        });

        let transport = self.clone();
        tokio::spawn(async move {
            transport.reconnect_loop().await;
        });
    }

    /// Bounded reconnect: a fixed delay between attempts, and once the budget
    /// is exhausted the adapter stays down until an explicit connect().
    async fn reconnect_loop(&self) {
        for attempt in 1..=self.reconnect_attempts {
            tokio::time::sleep(self.reconnect_delay).await;

            {
                let inner = self.inner.lock().await;
                if inner.closed || !matches!(inner.phase, Phase::Idle) {
                    return;
                }
            }

            self.stats.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
            info!(
                target: "transport",
                attempt,
                max = self.reconnect_attempts,
                "Reconnecting"
            );

            if self.connect().await.connected {
                return;
            }
        }

        warn!(target: "transport", "Reconnect attempts exhausted, staying disconnected");
        self.dispatch(ServerEvent::Error {
            message: "reconnect attempts exhausted".to_string(),
        });
    }
}
