use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::Value;

use vineyard_monitor::config;
use vineyard_monitor::dashboard::{CsvSource, DashboardView, Poller};
use vineyard_monitor::generator::SensorGenerator;
use vineyard_monitor::report;
use vineyard_monitor::routes;
use vineyard_monitor::store::LogStore;
use vineyard_monitor::telemetry::DisabledSink;
use vineyard_monitor::walker::GridWalker;
use vineyard_monitor::{AlertStatus, ThresholdConfig};

const ROWS: usize = 4;
const COLS: usize = 5;

async fn walk_into(store: &LogStore) -> Result<vineyard_monitor::walker::WalkOutcome> {
    // ---
    let mut walker = GridWalker::new(
        ROWS,
        COLS,
        Duration::ZERO,
        SensorGenerator::seeded(42),
        ThresholdConfig::default(),
    );
    Ok(walker.walk(Some(store), &DisabledSink).await?)
}

#[tokio::test]
async fn walk_logs_every_cell_in_serpentine_order() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let store = LogStore::new(dir.path().join("datos_sensores.csv"));

    let outcome = walk_into(&store).await?;
    assert_eq!(outcome.readings.len(), ROWS * COLS);
    assert_eq!(outcome.telemetry_sent, 0);
    assert_eq!(outcome.telemetry_failed, 0);

    // Header plus one line per cell
    let text = std::fs::read_to_string(store.path())?;
    assert_eq!(text.lines().count(), ROWS * COLS + 1);
    assert!(text.starts_with("timestamp,fila,columna,humedad_suelo"));

    let logged = store.read_readings()?;
    let positions: Vec<(usize, usize)> = logged.iter().map(|r| (r.row, r.col)).collect();
    assert_eq!(&positions[..6], &[(1, 1), (1, 2), (1, 3), (1, 4), (1, 5), (2, 5)]);
    assert_eq!(positions[ROWS * COLS - 1], (4, 1));

    // Every alerted reading is marked on the grid, and only those
    let alerted = logged
        .iter()
        .filter(|r| r.status == AlertStatus::OutOfRange)
        .count();
    assert_eq!(outcome.grid.alerted_count(), alerted);
    for r in &logged {
        assert_eq!(
            r.status == AlertStatus::OutOfRange,
            !r.violated.is_empty(),
            "status and violated list disagree at ({}, {})",
            r.row,
            r.col
        );
    }

    Ok(())
}

#[tokio::test]
async fn second_walk_appends_without_second_header() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let store = LogStore::new(dir.path().join("datos_sensores.csv"));

    walk_into(&store).await?;
    walk_into(&store).await?;

    let text = std::fs::read_to_string(store.path())?;
    assert_eq!(text.matches("timestamp,fila").count(), 1);
    assert_eq!(store.read_readings()?.len(), 2 * ROWS * COLS);

    Ok(())
}

#[tokio::test]
async fn dashboard_serves_walked_data() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let store = LogStore::new(dir.path().join("datos_sensores.csv"));
    let cfg = config::load_with(|_| None)?;

    let poller = Poller::new(
        Arc::new(CsvSource::new(store.clone())),
        cfg.thresholds,
        cfg.history_rows,
        cfg.refresh,
    );

    // Nothing logged yet
    assert_eq!(poller.tick().await?, 0);
    assert_eq!(*poller.view().read().await, DashboardView::Idle);

    walk_into(&store).await?;
    assert_eq!(poller.tick().await?, ROWS * COLS);

    match &*poller.view().read().await {
        DashboardView::Rendering(snap) => assert_eq!(snap.total_rows, ROWS * COLS),
        DashboardView::Idle => panic!("view should be rendering after data arrived"),
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    let app = routes::router(poller.view(), cfg);
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health["status"], "ok");

    let status: Value = client
        .get(format!("{base}/api/status"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["view"]["state"], "rendering");
    assert_eq!(status["view"]["total_rows"], ROWS * COLS);
    assert_eq!(status["refresh_secs"], 2);

    let page = client.get(format!("{base}/")).send().await?;
    assert!(page.status().is_success());
    let html = page.text().await?;
    assert!(html.contains("Alertas en vivo"));
    assert_eq!(html.matches("<svg").count(), 6);

    Ok(())
}

#[tokio::test]
async fn report_from_logged_readings() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let store = LogStore::new(dir.path().join("datos_sensores.csv"));
    walk_into(&store).await?;

    let readings = store.read_readings()?;
    let out = dir.path().join("reporte.xlsx");
    report::write(&readings, &ThresholdConfig::default(), &out)?;

    let bytes = std::fs::read(&out)?;
    assert!(bytes.starts_with(b"PK"));

    let summary = report::summarize(&readings);
    let total_alerts: usize = summary.iter().map(|s| s.alerts).sum();
    let violations: usize = readings.iter().map(|r| r.violated.len()).sum();
    assert_eq!(total_alerts, violations);

    Ok(())
}
