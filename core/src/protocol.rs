// Wire protocol for the tracking server connection
//
// Frames are JSON text messages of the shape {"event": <name>, "data": <payload>}.
// Inbound payloads are loosely typed at the wire (ids and coordinates may be
// numbers or strings, realtime coordinates may be nested under "location" or
// flattened), so decoding normalizes everything into the closed ServerEvent
// enum here, before any business logic sees it.

use crate::{RastroError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

// Inbound event names
pub const EVT_ALL_LOCATIONS: &str = "location:allLocations";
pub const EVT_REALTIME: &str = "location:realtime";
pub const EVT_TRACKING_STATUS: &str = "tracking:status";
pub const EVT_TRACKING_STATUS_CHANGED: &str = "tracking:statusChanged";
pub const EVT_TRACKING_STATUS_RESPONSE: &str = "tracking:statusResponse";

/// One normalized position sample as carried by snapshot and realtime events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub subject_id: i64,
    pub display_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    /// Timestamp the sample was produced at the source, when the payload has one
    pub timestamp: Option<DateTime<Utc>>,
}

/// Server-confirmed tracking flag payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingStatusPayload {
    pub active: bool,
    pub updated_by: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Why the transport went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Explicit disconnect() by the owner; the store resets on this
    Requested,
    /// The underlying connection dropped; auto-reconnect follows
    ConnectionLost,
}

/// Closed set of events delivered to subscribers.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Full replacement set of current positions
    Snapshot(Vec<PositionSample>),
    /// Single-subject position update
    Update(PositionSample),
    /// Authoritative tracking-flag broadcast
    StatusChanged(TrackingStatusPayload),
    /// Direct answer to a status query
    StatusResponse(TrackingStatusPayload),
    Connected,
    Disconnected { reason: DisconnectReason },
    Error { message: String },
}

/// Subscription channels; each ServerEvent maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Snapshot,
    Update,
    Status,
    Connected,
    Disconnected,
    Error,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Snapshot => "snapshot",
            Channel::Update => "update",
            Channel::Status => "status",
            Channel::Connected => "connected",
            Channel::Disconnected => "disconnected",
            Channel::Error => "error",
        }
    }
}

impl ServerEvent {
    pub fn channel(&self) -> Channel {
        match self {
            ServerEvent::Snapshot(_) => Channel::Snapshot,
            ServerEvent::Update(_) => Channel::Update,
            ServerEvent::StatusChanged(_) | ServerEvent::StatusResponse(_) => Channel::Status,
            ServerEvent::Connected => Channel::Connected,
            ServerEvent::Disconnected { .. } => Channel::Disconnected,
            ServerEvent::Error { .. } => Channel::Error,
        }
    }
}

/// Messages emitted to the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Request a full snapshot of current positions
    #[serde(rename = "location:getAll")]
    GetAllLocations,
    /// Query the tracking flag; answered on the status channel
    #[serde(rename = "tracking:getStatus")]
    GetTrackingStatus,
    /// Set the tracking flag on behalf of an operator
    #[serde(rename = "tracking:setStatus")]
    SetTrackingStatus {
        active: bool,
        #[serde(rename = "updatedBy")]
        updated_by: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Decode one inbound text frame. Returns the event plus the number of
/// malformed snapshot entries that were dropped while decoding it.
pub fn decode_frame(text: &str) -> Result<(ServerEvent, usize)> {
    let frame: RawFrame = serde_json::from_str(text)?;
    let data = frame.data.unwrap_or(Value::Null);

    match frame.event.as_str() {
        EVT_ALL_LOCATIONS => {
            let entries = data.as_array().cloned().unwrap_or_default();
            let mut samples = Vec::with_capacity(entries.len());
            let mut dropped = 0usize;
            for entry in &entries {
                match parse_sample(entry, entry) {
                    Ok(sample) => samples.push(sample),
                    Err(e) => {
                        dropped += 1;
                        debug!(target: "protocol", error = %e, "Dropped malformed snapshot entry");
                    }
                }
            }
            Ok((ServerEvent::Snapshot(samples), dropped))
        }
        EVT_REALTIME => {
            let sample = parse_realtime(&data)?;
            Ok((ServerEvent::Update(sample), 0))
        }
        EVT_TRACKING_STATUS | EVT_TRACKING_STATUS_CHANGED => {
            Ok((ServerEvent::StatusChanged(parse_status(&data)?), 0))
        }
        EVT_TRACKING_STATUS_RESPONSE => {
            Ok((ServerEvent::StatusResponse(parse_status(&data)?), 0))
        }
        other => Err(RastroError::ProtocolError(format!(
            "unknown event: {}",
            other
        ))),
    }
}

/// Parse a realtime update. Coordinates may be nested under a "location" key
/// or flattened at the top level; both shapes yield the same sample.
fn parse_realtime(data: &Value) -> Result<PositionSample> {
    let coords = match data.get("location") {
        Some(nested) if nested.is_object() => nested,
        _ => data,
    };
    parse_sample(data, coords)
}

fn parse_sample(root: &Value, coords: &Value) -> Result<PositionSample> {
    let subject_id = root
        .get("userId")
        .and_then(value_to_i64)
        .ok_or_else(|| RastroError::ProtocolError("missing or invalid userId".to_string()))?;

    let latitude = coords
        .get("latitude")
        .and_then(value_to_f64)
        .ok_or_else(|| RastroError::ProtocolError("missing or invalid latitude".to_string()))?;

    let longitude = coords
        .get("longitude")
        .and_then(value_to_f64)
        .ok_or_else(|| RastroError::ProtocolError("missing or invalid longitude".to_string()))?;

    let accuracy = coords.get("accuracy").and_then(value_to_f64);

    // Sample timestamp may sit next to the coordinates or on the envelope
    let timestamp = coords
        .get("timestamp")
        .and_then(parse_timestamp)
        .or_else(|| root.get("timestamp").and_then(parse_timestamp));

    let display_name = root
        .get("username")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(PositionSample {
        subject_id,
        display_name,
        latitude,
        longitude,
        accuracy,
        timestamp,
    })
}

fn parse_status(data: &Value) -> Result<TrackingStatusPayload> {
    let active = data
        .get("active")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| RastroError::ProtocolError("missing or invalid active flag".to_string()))?;

    Ok(TrackingStatusPayload {
        active,
        updated_by: data
            .get("updatedBy")
            .and_then(|v| v.as_str())
            .map(String::from),
        timestamp: data.get("timestamp").and_then(parse_timestamp),
    })
}

/// Numbers and numeric strings both count; NaN/inf never leak through.
pub(crate) fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn value_to_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    v.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
