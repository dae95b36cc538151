//! Live dashboard: poll a data source, rebuild the view, repeat.
//!
//! The view starts [`DashboardView::Idle`] and switches to
//! [`DashboardView::Rendering`] on the first read that returns rows. It never
//! goes back: a later read that is empty or fails leaves the last snapshot in
//! place. The poll task only writes the shared view; the HTTP routes only read
//! it.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::models::{FeedRow, Metric, MetricStatus};
use crate::thresholds::{evaluate_metric, ThresholdConfig};

mod source;

pub use source::{CsvSource, DataSource, RemoteSource, SourceError};

// ---

/// Latest status of one metric, for the alert panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricAlert {
    pub metric: Metric,
    pub label: &'static str,
    pub value: Option<f64>,
    pub threshold: f64,
    pub status: MetricStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: Option<NaiveDateTime>,
    pub value: Option<f64>,
    pub exceeded: bool,
}

/// Full history of one metric plus its threshold, for a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub metric: Metric,
    pub label: &'static str,
    pub threshold: f64,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: &'static str,
    pub threshold: f64,
}

/// Everything one render needs, computed from a single read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub total_rows: usize,
    pub latest_timestamp: Option<NaiveDateTime>,
    pub alerts: Vec<MetricAlert>,
    pub series: Vec<MetricSeries>,
    /// Most recent rows, oldest first.
    pub history: Vec<FeedRow>,
    pub legend: Vec<LegendEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DashboardView {
    #[default]
    Idle,
    Rendering(Snapshot),
}

pub type SharedView = Arc<RwLock<DashboardView>>;

/// Build a snapshot from a non-empty row set.
pub fn compute_snapshot(
    rows: &[FeedRow],
    thresholds: &ThresholdConfig,
    history_rows: usize,
) -> Option<Snapshot> {
    // ---
    let latest = rows.last()?;

    let alerts = Metric::ALL
        .into_iter()
        .map(|m| {
            let threshold = thresholds.max_for(m);
            let value = latest.get(m);
            MetricAlert {
                metric: m,
                label: m.label(),
                value,
                threshold,
                status: evaluate_metric(value, threshold),
            }
        })
        .collect();

    let series = Metric::ALL
        .into_iter()
        .map(|m| {
            let threshold = thresholds.max_for(m);
            let points = rows
                .iter()
                .map(|r| {
                    let value = r.get(m);
                    SeriesPoint {
                        timestamp: r.timestamp,
                        value,
                        exceeded: evaluate_metric(value, threshold) == MetricStatus::OutOfRange,
                    }
                })
                .collect();
            MetricSeries {
                metric: m,
                label: m.label(),
                threshold,
                points,
            }
        })
        .collect();

    let legend = Metric::ALL
        .into_iter()
        .map(|m| LegendEntry {
            label: m.label(),
            threshold: thresholds.max_for(m),
        })
        .collect();

    let start = rows.len().saturating_sub(history_rows);

    Some(Snapshot {
        total_rows: rows.len(),
        latest_timestamp: latest.timestamp,
        alerts,
        series,
        history: rows[start..].to_vec(),
        legend,
    })
}

/// Periodic read-compute-publish task.
pub struct Poller {
    source: Arc<dyn DataSource>,
    thresholds: ThresholdConfig,
    history_rows: usize,
    interval: Duration,
    view: SharedView,
}

impl Poller {
    // ---
    pub fn new(
        source: Arc<dyn DataSource>,
        thresholds: ThresholdConfig,
        history_rows: usize,
        interval: Duration,
    ) -> Self {
        Poller {
            source,
            thresholds,
            history_rows,
            interval,
            view: Arc::new(RwLock::new(DashboardView::Idle)),
        }
    }

    /// Handle to the view this poller publishes into.
    pub fn view(&self) -> SharedView {
        self.view.clone()
    }

    /// One full read-compute-publish cycle.
    ///
    /// Returns the number of rows read. An empty read keeps the current view;
    /// a failed read is returned to the caller with the view untouched.
    pub async fn tick(&self) -> Result<usize, SourceError> {
        // ---
        let rows = self.source.fetch().await?;

        match compute_snapshot(&rows, &self.thresholds, self.history_rows) {
            Some(snapshot) => {
                let mut guard = self.view.write().await;
                if matches!(*guard, DashboardView::Idle) {
                    tracing::info!("First data from {}", self.source.describe());
                }
                *guard = DashboardView::Rendering(snapshot);
            }
            None => {
                tracing::debug!("No data yet in {}", self.source.describe());
            }
        }

        Ok(rows.len())
    }

    /// Tick every `interval` until `stop` is cancelled.
    pub async fn run(&self, stop: CancellationToken) {
        // ---
        tracing::info!(
            "Polling {} every {}s",
            self.source.describe(),
            self.interval.as_secs()
        );

        while !stop.is_cancelled() {
            match self.tick().await {
                Ok(n) => tracing::debug!("Tick read {} rows", n),
                Err(e) => tracing::warn!("Dashboard read failed: {}", e),
            }

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Poller stopped");
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::telemetry::TelemetryError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves queued responses, then repeats the last one.
    struct ScriptedSource {
        script: Mutex<Vec<Result<Vec<FeedRow>, ()>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(mut script: Vec<Result<Vec<FeedRow>, ()>>) -> Self {
            script.reverse();
            ScriptedSource {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn fetch(&self) -> Result<Vec<FeedRow>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop().unwrap()
            } else {
                script.last().cloned().unwrap_or(Ok(Vec::new()))
            };
            next.map_err(|_| {
                SourceError::Remote(TelemetryError::Rejected {
                    status: 503,
                    body: String::new(),
                })
            })
        }
    }

    fn row(v: [Option<f64>; 6]) -> FeedRow {
        FeedRow {
            timestamp: None,
            values: v,
        }
    }

    fn full(v: f64) -> FeedRow {
        row([Some(v); 6])
    }

    fn poller(script: Vec<Result<Vec<FeedRow>, ()>>) -> (Arc<ScriptedSource>, Poller) {
        let source = Arc::new(ScriptedSource::new(script));
        let p = Poller::new(
            source.clone(),
            ThresholdConfig::default(),
            2,
            Duration::from_millis(10),
        );
        (source, p)
    }

    #[test]
    fn test_snapshot_empty_is_none() {
        // ---
        assert!(compute_snapshot(&[], &ThresholdConfig::default(), 50).is_none());
    }

    #[test]
    fn test_snapshot_latest_status_per_metric() {
        // ---
        let rows = vec![
            full(1.0),
            row([Some(36.0), None, Some(f64::NAN), Some(50.0), Some(35.0), Some(100.0)]),
        ];
        let snap = compute_snapshot(&rows, &ThresholdConfig::default(), 50).unwrap();

        let statuses: Vec<MetricStatus> = snap.alerts.iter().map(|a| a.status).collect();
        assert_eq!(
            statuses,
            vec![
                MetricStatus::OutOfRange,
                MetricStatus::NoData,
                MetricStatus::NoData,
                MetricStatus::Normal,
                MetricStatus::Normal,
                MetricStatus::Normal,
            ]
        );
        assert_eq!(snap.total_rows, 2);
        assert_eq!(snap.legend.len(), 6);
        assert_eq!(snap.legend[2].threshold, 7.5);
    }

    #[test]
    fn test_snapshot_series_and_history() {
        // ---
        let rows: Vec<FeedRow> = [20.0, 36.0, 30.0, 40.0].into_iter().map(full).collect();
        let snap = compute_snapshot(&rows, &ThresholdConfig::default(), 3).unwrap();

        let moisture = &snap.series[0];
        assert_eq!(moisture.points.len(), 4);
        let exceeded: Vec<bool> = moisture.points.iter().map(|p| p.exceeded).collect();
        assert_eq!(exceeded, vec![false, true, false, true]);

        assert_eq!(snap.history.len(), 3);
        assert_eq!(snap.history[0].get(Metric::SoilMoisture), Some(36.0));
    }

    #[tokio::test]
    async fn test_tick_idle_then_rendering() {
        // ---
        let (_src, p) = poller(vec![Ok(vec![]), Ok(vec![full(20.0)])]);

        assert_eq!(p.tick().await.unwrap(), 0);
        assert_eq!(*p.view().read().await, DashboardView::Idle);

        assert_eq!(p.tick().await.unwrap(), 1);
        assert!(matches!(*p.view().read().await, DashboardView::Rendering(_)));
    }

    #[tokio::test]
    async fn test_rendering_survives_empty_and_failed_reads() {
        // ---
        let (_src, p) = poller(vec![Ok(vec![full(20.0)]), Ok(vec![]), Err(())]);

        p.tick().await.unwrap();
        let before = p.view().read().await.clone();

        assert_eq!(p.tick().await.unwrap(), 0);
        assert!(p.tick().await.is_err());

        assert_eq!(*p.view().read().await, before);
        assert!(matches!(before, DashboardView::Rendering(_)));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        // ---
        let (src, p) = poller(vec![Ok(vec![full(20.0)])]);
        let p = Arc::new(p);
        let stop = CancellationToken::new();

        let task = {
            let p = p.clone();
            let stop = stop.clone();
            tokio::spawn(async move { p.run(stop).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("poller did not stop")
            .unwrap();

        assert!(src.calls.load(Ordering::SeqCst) >= 1);
        assert!(matches!(*p.view().read().await, DashboardView::Rendering(_)));
    }

    #[tokio::test]
    async fn test_run_with_cancelled_token_never_ticks() {
        // ---
        let (src, p) = poller(vec![Ok(vec![full(20.0)])]);
        let stop = CancellationToken::new();
        stop.cancel();
        p.run(stop).await;
        assert_eq!(src.calls.load(Ordering::SeqCst), 0);
    }
}
