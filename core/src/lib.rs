// Rastro Core Library
// Live GPS tracking and history-replay pipeline for field-inspector oversight

pub mod config;
pub mod control;
pub mod history;
pub mod map;
pub mod protocol;
pub mod store;
pub mod transport;

// Export core types
pub use config::TrackerConfig;
pub use control::{TrackingControl, TrackingState, TrackingStatus};
pub use history::{HistoryClient, HistoryPage, HistoryPoint, HistoryQuery};
pub use protocol::{Channel, ClientMessage, DisconnectReason, PositionSample, ServerEvent};
pub use store::{LiveLocationStore, TrackedPosition};
pub use transport::{ConnectionState, SocketTransport};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RastroError {
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("History fetch error: {0}")]
    HistoryError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, RastroError>;

/// Tracker runtime: owns the transport, the live location store and the
/// tracking control, and wires them together. Explicitly constructed so
/// independent instances can coexist (tests, multiple backends).
pub struct Tracker {
    pub transport: SocketTransport,
    pub store: LiveLocationStore,
    pub control: TrackingControl,
    config: TrackerConfig,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        if !config.server_url.starts_with("ws://") && !config.server_url.starts_with("wss://") {
            return Err(RastroError::ConfigError(format!(
                "server_url must be a ws:// or wss:// endpoint, got {}",
                config.server_url
            )));
        }

        let transport = SocketTransport::new(&config);
        let store = LiveLocationStore::new(config.staleness_window());
        let control = TrackingControl::new(transport.clone());

        Ok(Self {
            transport,
            store,
            control,
            config,
            tasks: Vec::new(),
        })
    }

    /// Attach the store and control listeners, start the staleness sweeper and
    /// open the connection. The resolved [`ConnectionState`] carries a failure
    /// reason instead of an error; callers decide whether to retry.
    pub async fn start(&mut self) -> Result<ConnectionState> {
        tracing::info!(target: "tracker", "Starting tracker");

        self.tasks.push(self.store.attach(&self.transport));
        self.tasks
            .push(self.store.spawn_sweeper(self.config.sweep_interval()));
        self.tasks.push(self.control.attach());

        let state = self.transport.connect().await;
        tracing::info!(
            target: "tracker",
            connected = state.connected,
            "Tracker started"
        );
        Ok(state)
    }

    pub async fn shutdown(&mut self) {
        tracing::info!(target: "tracker", "Shutting down tracker");

        self.transport.disconnect().await;
        for task in self.tasks.drain(..) {
            task.abort();
        }

        tracing::info!(target: "tracker", "Tracker shut down");
    }
}
