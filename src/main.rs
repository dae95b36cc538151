//! Application entry point for the `vineyard-monitor` binary.
//!
//! Subcommands:
//! - `walk`      – one serpentine pass over the grid, logging every reading to
//!                 the CSV log store, optionally uploading it to the remote
//!                 channel, then writing the Excel report
//! - `dashboard` – poll the log store or the remote channel and serve the live
//!                 dashboard over HTTP until Ctrl-C
//! - `report`    – rebuild the Excel report from an existing log store
//!
//! Startup is the same for all of them: load `.env`, initialize tracing, load
//! configuration from the environment and log it with secrets masked.
//!
//! # Environment Variables
//! See [`vineyard_monitor::config::load_with`] for the full list. Logging is
//! controlled by:
//! - `VINEYARD_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `VINEYARD_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{bail, ensure, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use uuid::Uuid;

use vineyard_monitor::dashboard::{CsvSource, DataSource, Poller, RemoteSource};
use vineyard_monitor::generator::SensorGenerator;
use vineyard_monitor::store::LogStore;
use vineyard_monitor::telemetry::{DisabledSink, TelemetrySink, ThingSpeakFeed, ThingSpeakSink};
use vineyard_monitor::walker::{grid_cells, GridWalker, MAX_CELLS};
use vineyard_monitor::{config, report, routes, Config};

// ---

#[derive(Debug, Parser)]
#[command(name = "vineyard-monitor", version, about = "Simulated IoT vineyard monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Walk the grid once, logging every reading.
    Walk(WalkArgs),
    /// Serve the live dashboard.
    Dashboard(DashboardArgs),
    /// Rebuild the Excel report from a log store.
    Report(ReportArgs),
}

#[derive(Debug, Args)]
struct WalkArgs {
    /// Grid rows (overrides GRID_ROWS).
    #[arg(long)]
    rows: Option<usize>,

    /// Grid columns (overrides GRID_COLS).
    #[arg(long)]
    cols: Option<usize>,

    /// Pause after each cell in milliseconds (overrides PACE_MS).
    #[arg(long)]
    pace_ms: Option<u64>,

    /// Skip telemetry upload even when a write key is configured.
    #[arg(long)]
    offline: bool,

    /// Skip the Excel report at the end of the walk.
    #[arg(long)]
    no_report: bool,

    /// Seed the sensor generator for a reproducible walk.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// The CSV log store written by `walk`.
    Local,
    /// The remote telemetry channel.
    Thingspeak,
}

#[derive(Debug, Args)]
struct DashboardArgs {
    #[arg(long, value_enum, default_value_t = SourceKind::Local)]
    source: SourceKind,

    /// Bind address (overrides DASHBOARD_ADDR).
    #[arg(long)]
    addr: Option<SocketAddr>,
}

#[derive(Debug, Args)]
struct ReportArgs {
    /// Log store to read (defaults to LOG_STORE_PATH).
    #[arg(long)]
    input: Option<PathBuf>,

    /// Spreadsheet to write (defaults to REPORT_PATH).
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    match cli.command {
        Command::Walk(args) => run_walk(cfg, args).await,
        Command::Dashboard(args) => run_dashboard(cfg, args).await,
        Command::Report(args) => run_report(&cfg, args),
    }
}

// ---

async fn run_walk(cfg: Config, args: WalkArgs) -> Result<()> {
    // ---
    let rows = args.rows.unwrap_or(cfg.grid_rows);
    let cols = args.cols.unwrap_or(cfg.grid_cols);
    ensure!(rows > 0 && cols > 0, "grid must have at least one row and one column");
    ensure!(
        grid_cells(rows, cols).is_some(),
        "grid of {}x{} exceeds {} cells",
        rows,
        cols,
        MAX_CELLS
    );

    let pace = args
        .pace_ms
        .map(std::time::Duration::from_millis)
        .unwrap_or(cfg.pace);

    let store = LogStore::new(&cfg.log_path);
    if store.ensure_initialized()? {
        tracing::info!("Created log store {}", store.path().display());
    }

    let sink: Box<dyn TelemetrySink> = match (&cfg.thingspeak.write_key, args.offline) {
        (Some(key), false) => Box::new(ThingSpeakSink::new(
            cfg.thingspeak.base_url.clone(),
            key.clone(),
            cfg.thingspeak.timeout,
        )?),
        _ => {
            tracing::info!("Telemetry upload disabled");
            Box::new(DisabledSink)
        }
    };

    let generator = match args.seed {
        Some(seed) => SensorGenerator::seeded(seed),
        None => SensorGenerator::from_entropy(),
    };

    let mut walker = GridWalker::new(rows, cols, pace, generator, cfg.thresholds);

    let run_id = Uuid::new_v4();
    let outcome = walker
        .walk(Some(&store), sink.as_ref())
        .instrument(tracing::info_span!("walk", %run_id))
        .await?;

    tracing::info!("Alert map ('#' = alerted):\n{}", outcome.grid);
    tracing::info!(
        "Telemetry: {} accepted, {} failed",
        outcome.telemetry_sent,
        outcome.telemetry_failed
    );

    if cfg.generate_report && !args.no_report {
        report::write(&outcome.readings, &cfg.thresholds, &cfg.report_path)?;
    }

    Ok(())
}

async fn run_dashboard(cfg: Config, args: DashboardArgs) -> Result<()> {
    // ---
    let source: Arc<dyn DataSource> = match args.source {
        SourceKind::Local => {
            let store = LogStore::new(&cfg.log_path);
            if cfg.reset_log_on_start {
                store.reset()?;
            }
            Arc::new(CsvSource::new(store))
        }
        SourceKind::Thingspeak => {
            let ts = &cfg.thingspeak;
            let Some(channel_id) = ts.channel_id.clone() else {
                bail!("THINGSPEAK_CHANNEL_ID must be set in .env or environment to read the remote channel");
            };
            let feed = ThingSpeakFeed::new(
                ts.base_url.clone(),
                channel_id.clone(),
                ts.read_key.clone(),
                ts.results,
            )?;
            Arc::new(RemoteSource::new(feed, channel_id, ts.results as usize))
        }
    };

    let poller = Arc::new(Poller::new(
        source,
        cfg.thresholds,
        cfg.history_rows,
        cfg.refresh,
    ));
    let stop = CancellationToken::new();

    let poll_task = {
        let poller = poller.clone();
        let stop = stop.clone();
        tokio::spawn(async move { poller.run(stop).await })
    };

    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, shutting down");
                stop.cancel();
            }
        });
    }

    let addr = args.addr.unwrap_or(cfg.dashboard_addr);
    let app = routes::router(poller.view(), cfg);

    tracing::info!("Dashboard listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown = stop.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    stop.cancel();
    poll_task.await?;
    Ok(())
}

fn run_report(cfg: &Config, args: ReportArgs) -> Result<()> {
    // ---
    let input = args.input.unwrap_or_else(|| cfg.log_path.clone());
    let output = args.output.unwrap_or_else(|| cfg.report_path.clone());

    let readings = LogStore::new(&input).read_readings()?;
    if readings.is_empty() {
        tracing::warn!(
            "No readings in {}; writing an empty report",
            input.display()
        );
    }

    report::write(&readings, &cfg.thresholds, &output)?;
    Ok(())
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `VINEYARD_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, or `VINEYARD_LOG_LEVEL` when unset
///
/// Called once at startup, before any logging macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("VINEYARD_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to VINEYARD_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("VINEYARD_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},hyper=warn,reqwest=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
