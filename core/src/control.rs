// Tracking control
//
// Represents the single server-confirmed flag gating whether position
// broadcasts occur at all. Toggles are optimistic: local state flips
// immediately, and the server's echo is applied on top whenever it lands,
// so the authoritative value always wins over a stale guess.

use crate::protocol::{Channel, ClientMessage, ServerEvent, TrackingStatusPayload};
use crate::transport::SocketTransport;
use crate::{RastroError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    /// No server answer seen yet; a timed-out query stays here, never Inactive
    Unknown,
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingState {
    pub status: TrackingStatus,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Server-confirmed tracking switch.
#[derive(Clone)]
pub struct TrackingControl {
    transport: SocketTransport,
    state: Arc<RwLock<TrackingState>>,
}

impl TrackingControl {
    pub fn new(transport: SocketTransport) -> Self {
        Self {
            transport,
            state: Arc::new(RwLock::new(TrackingState {
                status: TrackingStatus::Unknown,
                updated_by: None,
                updated_at: None,
            })),
        }
    }

    pub async fn state(&self) -> TrackingState {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> TrackingStatus {
        self.state.read().await.status
    }

    /// Apply an authoritative server value. Always overwrites local state,
    /// including any optimistic guess still awaiting confirmation.
    pub async fn apply_server(&self, payload: TrackingStatusPayload) {
        let mut state = self.state.write().await;
        state.status = if payload.active {
            TrackingStatus::Active
        } else {
            TrackingStatus::Inactive
        };
        state.updated_by = payload.updated_by;
        state.updated_at = payload.timestamp.or_else(|| Some(Utc::now()));
        debug!(
            target: "control",
            active = payload.active,
            "Applied server tracking status"
        );
    }

    /// Negate the current flag on behalf of an operator. Unknown counts as
    /// inactive, so the first toggle always requests activation. The emitted
    /// set-status is confirmed asynchronously on the status channel.
    pub async fn toggle(&self, operator_id: &str) -> Result<TrackingStatus> {
        let desired = {
            let state = self.state.read().await;
            !matches!(state.status, TrackingStatus::Active)
        };

        self.transport
            .send(ClientMessage::SetTrackingStatus {
                active: desired,
                updated_by: operator_id.to_string(),
            })
            .await?;

        let new_status = if desired {
            TrackingStatus::Active
        } else {
            TrackingStatus::Inactive
        };
        {
            let mut state = self.state.write().await;
            state.status = new_status;
            state.updated_by = Some(operator_id.to_string());
            state.updated_at = Some(Utc::now());
        }

        info!(
            target: "control",
            active = desired,
            operator = %operator_id,
            "Tracking toggle requested"
        );
        Ok(new_status)
    }

    /// Query the server for the authoritative flag and wait for the answer
    /// with an explicit bound. On timeout local state is left untouched.
    pub async fn request_status(&self, wait: Duration) -> Result<TrackingStatus> {
        let (sub_id, mut rx) = self.transport.subscribe(Channel::Status);

        let result = async {
            self.transport.send(ClientMessage::GetTrackingStatus).await?;
            loop {
                match tokio::time::timeout(wait, rx.recv()).await {
                    Err(_) => {
                        warn!(target: "control", "Status request timed out");
                        return Err(RastroError::Timeout);
                    }
                    Ok(None) => {
                        return Err(RastroError::TransportError(
                            "subscription closed".to_string(),
                        ));
                    }
                    Ok(Some(ServerEvent::StatusResponse(payload)))
                    | Ok(Some(ServerEvent::StatusChanged(payload))) => {
                        let status = if payload.active {
                            TrackingStatus::Active
                        } else {
                            TrackingStatus::Inactive
                        };
                        self.apply_server(payload).await;
                        return Ok(status);
                    }
                    Ok(Some(_)) => continue,
                }
            }
        }
        .await;

        self.transport.unsubscribe(&sub_id);
        result
    }

    /// Reconcile local state from status broadcasts for as long as the
    /// transport lives.
    pub fn attach(&self) -> tokio::task::JoinHandle<()> {
        let (_sub_id, mut rx) = self.transport.subscribe(Channel::Status);
        let control = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let ServerEvent::StatusChanged(payload)
                | ServerEvent::StatusResponse(payload) = event
                {
                    control.apply_server(payload).await;
                }
            }
            debug!(target: "control", "Status listener exited");
        })
    }
}
