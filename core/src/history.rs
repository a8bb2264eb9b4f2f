// History query component
//
// Bounded request/response fetch of past positions for one subject over a
// time window, independent of the realtime transport. Coordinates arrive as
// strings on the wire and are parsed here; records that fail to parse are
// dropped (and counted) rather than propagated as NaN.

use crate::config::TrackerConfig;
use crate::protocol::value_to_f64;
use crate::{RastroError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Immutable historical position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub subject_id: i64,
    pub display_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub sample_timestamp: DateTime<Utc>,
}

/// Inclusive time-window query for one subject, with pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub subject_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: u32,
    pub offset: u32,
}

/// Query result: points sorted ascending by sample timestamp, the
/// total-available count for pagination, and how many records were dropped
/// for unparsable coordinates. An empty page is a valid outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryPage {
    pub points: Vec<HistoryPoint>,
    pub total: u64,
    pub dropped: usize,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    data: Option<RawHistoryData>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawHistoryData {
    #[serde(default)]
    history: Vec<Value>,
    total: Option<u64>,
}

/// History client over the REST collaborator.
#[derive(Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HistoryClient {
    pub fn new(config: &TrackerConfig) -> Self {
        Self::with_base_url(&config.api_base_url, config.request_timeout())
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch one page of history. Network and server failures surface as
    /// [`RastroError::HistoryError`], carrying the server-supplied message
    /// when there is one; "no data in range" is an empty page, not an error.
    pub async fn query(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        let url = format!("{}/locations/history/{}", self.base_url, query.subject_id);
        debug!(
            target: "history",
            subject = query.subject_id,
            start = %query.start,
            end = %query.end,
            "Fetching location history"
        );

        let response = self
            .http
            .get(&url)
            .query(&[
                ("startDate", query.start.to_rfc3339()),
                ("endDate", query.end.to_rfc3339()),
                ("limit", query.limit.to_string()),
                ("offset", query.offset.to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!(target: "history", error = %e, "History request failed");
                RastroError::HistoryError(format!("History request failed: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RastroError::HistoryError(format!("Failed to read history response: {}", e))
        })?;

        if !status.is_success() {
            let message = error_message_from_body(&body)
                .unwrap_or_else(|| format!("History API returned status {}", status));
            warn!(target: "history", status = %status, message = %message, "History API error");
            return Err(RastroError::HistoryError(message));
        }

        let page = parse_history_body(query.subject_id, &body)?;
        debug!(
            target: "history",
            subject = query.subject_id,
            points = page.points.len(),
            dropped = page.dropped,
            "History fetched"
        );
        Ok(page)
    }
}

/// Extract the server-supplied error message from a failure body, if any.
pub(crate) fn error_message_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<RawEnvelope>(body)
        .ok()
        .and_then(|env| env.message)
        .filter(|m| !m.is_empty())
}

/// Parse a success body into a page: string coordinates become floats,
/// unparsable records are dropped and counted, and the surviving points come
/// out sorted ascending by sample timestamp.
pub(crate) fn parse_history_body(subject_id: i64, body: &str) -> Result<HistoryPage> {
    let envelope: RawEnvelope = serde_json::from_str(body)
        .map_err(|e| RastroError::HistoryError(format!("Invalid history response: {}", e)))?;
    let data = envelope.data.unwrap_or(RawHistoryData {
        history: Vec::new(),
        total: None,
    });

    let mut points = Vec::with_capacity(data.history.len());
    let mut dropped = 0usize;
    for record in &data.history {
        match parse_history_point(subject_id, record) {
            Some(point) => points.push(point),
            None => {
                dropped += 1;
                warn!(target: "history", "Dropped history record with unparsable coordinates");
            }
        }
    }

    points.sort_by_key(|p| p.sample_timestamp);
    let total = data.total.unwrap_or(points.len() as u64);

    Ok(HistoryPage {
        points,
        total,
        dropped,
    })
}

fn parse_history_point(subject_id: i64, record: &Value) -> Option<HistoryPoint> {
    let latitude = record.get("latitude").and_then(value_to_f64)?;
    let longitude = record.get("longitude").and_then(value_to_f64)?;
    let sample_timestamp = record
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))?;

    Some(HistoryPoint {
        subject_id,
        display_name: record
            .get("username")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from),
        latitude,
        longitude,
        accuracy: record.get("accuracy").and_then(value_to_f64),
        sample_timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body_with(records: Vec<Value>) -> String {
        json!({"data": {"history": records}}).to_string()
    }

    #[test]
    fn unsorted_records_come_out_ascending() {
        let body = body_with(vec![
            json!({"latitude": "1.0", "longitude": "1.0", "timestamp": "2026-08-24T12:02:00Z"}),
            json!({"latitude": "2.0", "longitude": "2.0", "timestamp": "2026-08-24T12:00:00Z"}),
            json!({"latitude": "3.0", "longitude": "3.0", "timestamp": "2026-08-24T12:01:00Z"}),
        ]);

        let page = parse_history_body(1, &body).unwrap();
        let timestamps: Vec<_> = page
            .points
            .iter()
            .map(|p| p.sample_timestamp.to_rfc3339())
            .collect();
        assert_eq!(
            timestamps,
            vec![
                "2026-08-24T12:00:00+00:00",
                "2026-08-24T12:01:00+00:00",
                "2026-08-24T12:02:00+00:00"
            ]
        );
    }

    #[test]
    fn string_coordinates_are_parsed_and_bad_records_dropped() {
        let body = body_with(vec![
            json!({"latitude": "-12.0464", "longitude": "-77.0428", "accuracy": "8.5",
                   "timestamp": "2026-08-24T12:00:00Z"}),
            json!({"latitude": "garbage", "longitude": "-77.0", "timestamp": "2026-08-24T12:01:00Z"}),
            json!({"latitude": "-12.0", "longitude": "-77.0"}),
        ]);

        let page = parse_history_body(9, &body).unwrap();
        assert_eq!(page.points.len(), 1);
        assert_eq!(page.dropped, 2);

        let point = &page.points[0];
        assert_eq!(point.subject_id, 9);
        assert!((point.latitude + 12.0464).abs() < 1e-9);
        assert_eq!(point.accuracy, Some(8.5));
    }

    #[test]
    fn empty_username_yields_no_display_name() {
        let body = body_with(vec![
            json!({"latitude": "1.0", "longitude": "1.0", "username": "",
                   "timestamp": "2026-08-24T12:00:00Z"}),
            json!({"latitude": "1.0", "longitude": "1.0", "username": "ana",
                   "timestamp": "2026-08-24T12:01:00Z"}),
        ]);

        let page = parse_history_body(1, &body).unwrap();
        assert_eq!(page.points[0].display_name, None);
        assert_eq!(page.points[1].display_name.as_deref(), Some("ana"));
    }

    #[test]
    fn empty_history_is_a_valid_page_not_an_error() {
        let page = parse_history_body(1, &body_with(vec![])).unwrap();
        assert!(page.points.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.dropped, 0);
    }

    #[test]
    fn total_prefers_the_server_count() {
        let body = json!({"data": {"history": [
            {"latitude": "1.0", "longitude": "1.0", "timestamp": "2026-08-24T12:00:00Z"}
        ], "total": 250}})
        .to_string();

        let page = parse_history_body(1, &body).unwrap();
        assert_eq!(page.total, 250);
        assert_eq!(page.points.len(), 1);
    }

    #[test]
    fn server_error_message_is_extracted_when_present() {
        assert_eq!(
            error_message_from_body(r#"{"message": "subject not found"}"#).as_deref(),
            Some("subject not found")
        );
        assert_eq!(error_message_from_body(r#"{"message": ""}"#), None);
        assert_eq!(error_message_from_body("<html>502</html>"), None);
    }

    #[test]
    fn garbage_success_body_is_a_history_error() {
        let err = parse_history_body(1, "not json").unwrap_err();
        assert!(err.to_string().contains("History fetch error"));
    }
}
