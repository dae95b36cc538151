//! Remote telemetry channel (ThingSpeak-compatible).
//!
//! Uploads are best effort: [`TelemetrySink::send`] reports what happened and
//! the caller decides what to do with a failure. The walker logs it and moves
//! on; nothing is ever retried.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;
use thiserror::Error;

use crate::models::{FeedRow, Metric, SensorValues};

// ---

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("telemetry endpoint rejected the update (HTTP {status}, body {body:?})")]
    Rejected { status: u16, body: String },
}

/// What a sink did with one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The channel stored the update under this entry id.
    Accepted { entry_id: String },
    /// The sink is disabled; nothing left the process.
    Skipped,
}

/// Capability to push one set of sensor values somewhere remote.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send(&self, values: &SensorValues) -> Result<SendOutcome, TelemetryError>;
}

/// Sink used when no write key is configured or the walk runs offline.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSink;

#[async_trait]
impl TelemetrySink for DisabledSink {
    async fn send(&self, _values: &SensorValues) -> Result<SendOutcome, TelemetryError> {
        Ok(SendOutcome::Skipped)
    }
}

/// Writes readings to a channel through `GET {base}/update`.
#[derive(Debug, Clone)]
pub struct ThingSpeakSink {
    client: reqwest::Client,
    base_url: String,
    write_key: String,
}

impl ThingSpeakSink {
    // ---
    pub fn new(
        base_url: impl Into<String>,
        write_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TelemetryError> {
        // ---
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(ThingSpeakSink {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            write_key: write_key.into(),
        })
    }
}

#[async_trait]
impl TelemetrySink for ThingSpeakSink {
    /// Success means HTTP 200 with a body other than `"0"`; the channel answers
    /// `0` when it drops an update (rate limit, bad key).
    async fn send(&self, values: &SensorValues) -> Result<SendOutcome, TelemetryError> {
        // ---
        let mut params: Vec<(&str, String)> = vec![("api_key", self.write_key.clone())];
        for m in Metric::ALL {
            params.push((m.field(), values.get(m).to_string()));
        }

        let url = format!("{}/update", self.base_url);
        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();
        let body = response.text().await?.trim().to_string();

        tracing::debug!("Telemetry update answered {} with body {:?}", status, body);

        if status == reqwest::StatusCode::OK && body != "0" {
            Ok(SendOutcome::Accepted { entry_id: body })
        } else {
            Err(TelemetryError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Reads the most recent entries of a channel feed.
#[derive(Debug, Clone)]
pub struct ThingSpeakFeed {
    client: reqwest::Client,
    base_url: String,
    channel_id: String,
    read_key: Option<String>,
    results: u32,
}

impl ThingSpeakFeed {
    // ---
    pub fn new(
        base_url: impl Into<String>,
        channel_id: impl Into<String>,
        read_key: Option<String>,
        results: u32,
    ) -> Result<Self, TelemetryError> {
        // ---
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(ThingSpeakFeed {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            channel_id: channel_id.into(),
            read_key,
            results,
        })
    }

    /// Fetch up to `results` entries, oldest first.
    pub async fn fetch(&self) -> Result<Vec<FeedRow>, TelemetryError> {
        // ---
        let url = format!("{}/channels/{}/feeds.json", self.base_url, self.channel_id);
        let mut params: Vec<(&str, String)> = vec![("results", self.results.to_string())];
        if let Some(key) = self.read_key.as_deref().filter(|k| !k.is_empty()) {
            params.push(("api_key", key.to_string()));
        }

        tracing::debug!("Fetching channel feed from: {}", url);

        let response: Value = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let rows = parse_feed(&response);
        tracing::debug!("Channel feed returned {} rows", rows.len());
        Ok(rows)
    }
}

/// Turn a `feeds.json` document into rows sorted by creation time.
///
/// A document without a `feeds` array yields no rows.
pub fn parse_feed(doc: &Value) -> Vec<FeedRow> {
    // ---
    let Some(feeds) = doc.get("feeds").and_then(|f| f.as_array()) else {
        tracing::debug!("Feed response missing 'feeds' field or not an array");
        return Vec::new();
    };

    let mut rows: Vec<FeedRow> = feeds
        .iter()
        .map(|item| {
            let mut row = FeedRow {
                timestamp: item
                    .get("created_at")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.naive_utc()),
                ..FeedRow::default()
            };
            for m in Metric::ALL {
                row.set(m, item.get(m.field()).and_then(coerce_number));
            }
            row
        })
        .collect();

    rows.sort_by_key(|r| r.timestamp);
    rows
}

fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    fn values() -> SensorValues {
        SensorValues::from_ordered([36.5, 20.0, 6.0, 50.0, 20.0, 100.0])
    }

    #[tokio::test]
    async fn test_send_accepted() {
        // ---
        let server = MockServer::start_async().await;
        let update = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/update")
                    .query_param("api_key", "WRITEKEY")
                    .query_param("field1", "36.5")
                    .query_param_exists("field6");
                then.status(200).body("17\n");
            })
            .await;

        let sink = ThingSpeakSink::new(server.base_url(), "WRITEKEY", Duration::from_secs(6)).unwrap();
        let outcome = sink.send(&values()).await.unwrap();

        update.assert_async().await;
        assert_eq!(
            outcome,
            SendOutcome::Accepted {
                entry_id: "17".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_send_zero_body_is_rejected() {
        // ---
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/update");
                then.status(200).body("0");
            })
            .await;

        let sink = ThingSpeakSink::new(server.base_url(), "K", Duration::from_secs(6)).unwrap();
        let err = sink.send(&values()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Rejected { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_send_server_error_is_rejected() {
        // ---
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/update");
                then.status(500).body("boom");
            })
            .await;

        let sink = ThingSpeakSink::new(server.base_url(), "K", Duration::from_secs(6)).unwrap();
        let err = sink.send(&values()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Rejected { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_send_transport_failure() {
        // ---
        // Nothing listens on port 9 of localhost
        let sink = ThingSpeakSink::new("http://127.0.0.1:9", "K", Duration::from_secs(1)).unwrap();
        let err = sink.send(&values()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Transport(_)));
    }

    #[tokio::test]
    async fn test_disabled_sink_skips() {
        // ---
        tokio_test::assert_ok!(DisabledSink.send(&values()).await);
        assert_eq!(
            DisabledSink.send(&values()).await.unwrap(),
            SendOutcome::Skipped
        );
    }

    #[test]
    fn test_parse_feed_coerces_and_sorts() {
        // ---
        let doc = json!({
            "channel": { "id": 1 },
            "feeds": [
                { "created_at": "2025-03-26T18:45:05Z", "entry_id": 2,
                  "field1": "20.5", "field2": null, "field3": "x", "field4": 50,
                  "field5": "21", "field6": "100" },
                { "created_at": "2025-03-26T18:45:00Z", "entry_id": 1,
                  "field1": "36", "field2": "20", "field3": "6", "field4": "50",
                  "field5": "20", "field6": "100" }
            ]
        });

        let rows = parse_feed(&doc);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(Metric::SoilMoisture), Some(36.0));
        assert_eq!(rows[1].get(Metric::SoilMoisture), Some(20.5));
        assert_eq!(rows[1].get(Metric::SoilTemperature), None);
        assert_eq!(rows[1].get(Metric::SoilPh), None);
        assert_eq!(rows[1].get(Metric::AirHumidity), Some(50.0));
    }

    #[test]
    fn test_parse_feed_without_feeds() {
        // ---
        assert!(parse_feed(&json!({ "status": "-1" })).is_empty());
        assert!(parse_feed(&json!({ "feeds": [] })).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_feed_passes_read_key() {
        // ---
        let server = MockServer::start_async().await;
        let feed = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/channels/123/feeds.json")
                    .query_param("results", "50")
                    .query_param("api_key", "READ");
                then.status(200).json_body(json!({
                    "feeds": [
                        { "created_at": "2025-03-26T18:45:00Z", "field1": "30" }
                    ]
                }));
            })
            .await;

        let reader =
            ThingSpeakFeed::new(server.base_url(), "123", Some("READ".to_string()), 50).unwrap();
        let rows = reader.fetch().await.unwrap();

        feed.assert_async().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(Metric::SoilMoisture), Some(30.0));
        assert_eq!(rows[0].get(Metric::Radiation), None);
    }
}
