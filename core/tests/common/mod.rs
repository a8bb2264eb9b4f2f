// Shared helpers for integration tests: an in-process websocket endpoint and
// a tracker config tuned for fast test timing.

use rastro_core::TrackerConfig;
use tokio::net::TcpListener;

pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let url = format!("ws://{}", listener.local_addr().expect("local addr"));
    (listener, url)
}

pub fn test_config(url: &str) -> TrackerConfig {
    TrackerConfig {
        server_url: url.to_string(),
        snapshot_request_delay_ms: 20,
        reconnect_delay_ms: 50,
        status_timeout_ms: 100,
        ..TrackerConfig::default()
    }
}
