//! Configuration loader for the `vineyard-monitor` simulator and dashboard.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). The walker and the dashboard both take their
//! thresholds from the single [`ThresholdConfig`] built here, so the two sides
//! cannot drift apart.
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::thresholds::ThresholdConfig;
use crate::walker::{grid_cells, MAX_CELLS};

/// Parse an optional environment variable with a default value.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string variable, treating an empty value as unset.
macro_rules! optional_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name).filter(|v: &String| !v.trim().is_empty())
    };
}

/// Remote channel settings.
#[derive(Debug, Clone)]
pub struct ThingSpeakConfig {
    // ---
    /// API base URL.
    pub base_url: String,

    /// Write key; uploads are disabled when unset.
    pub write_key: Option<String>,

    /// Channel to read from; required by the remote dashboard source.
    pub channel_id: Option<String>,

    /// Optional read key for private channels.
    pub read_key: Option<String>,

    /// Maximum number of feed rows fetched per tick.
    pub results: u32,

    /// Upload timeout.
    pub timeout: Duration,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// CSV log store shared by the walker and the local dashboard.
    pub log_path: PathBuf,

    /// Spreadsheet written at the end of a walk.
    pub report_path: PathBuf,

    /// Build the spreadsheet after each walk.
    pub generate_report: bool,

    pub grid_rows: usize,
    pub grid_cols: usize,

    /// Pause after each cell visit.
    pub pace: Duration,

    /// Dashboard tick interval.
    pub refresh: Duration,

    /// Rows shown in the dashboard history table.
    pub history_rows: usize,

    /// Dashboard HTTP bind address.
    pub dashboard_addr: SocketAddr,

    /// Delete the log store when the dashboard starts.
    pub reset_log_on_start: bool,

    pub thresholds: ThresholdConfig,

    pub thingspeak: ThingSpeakConfig,
}

/// Load configuration from the process environment.
pub fn load_from_env() -> Result<Config> {
    load_with(|key| env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
///
/// Optional (defaults in parentheses):
/// - `LOG_STORE_PATH` (`datos.csv`), `REPORT_PATH` (`Reporte_Vinedo.xlsx`),
///   `GENERATE_REPORT` (`true`)
/// - `GRID_ROWS` (4), `GRID_COLS` (5), `PACE_MS` (1000)
/// - `REFRESH_SECS` (2), `HISTORY_ROWS` (50), `DASHBOARD_ADDR`
///   (`0.0.0.0:8080`), `RESET_LOG_ON_START` (`false`)
/// - `THINGSPEAK_URL`, `THINGSPEAK_WRITE_API_KEY`, `THINGSPEAK_CHANNEL_ID`,
///   `THINGSPEAK_READ_API_KEY`, `THINGSPEAK_RESULTS` (8000),
///   `THINGSPEAK_TIMEOUT_SECS` (6)
/// - `UMBRAL_HUMEDAD_SUELO` (35), `UMBRAL_TEMP_SUELO` (33), `UMBRAL_PH_SUELO`
///   (7.5), `UMBRAL_HUMEDAD_AIRE` (85), `UMBRAL_TEMP_AIRE` (35),
///   `UMBRAL_RADIACION` (45000)
///
/// Returns an error if any variable is present but invalid.
pub fn load_with<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let defaults = ThresholdConfig::default();
    let thresholds = ThresholdConfig {
        soil_moisture: parse_env!(lookup, "UMBRAL_HUMEDAD_SUELO", f64, defaults.soil_moisture),
        soil_temperature: parse_env!(lookup, "UMBRAL_TEMP_SUELO", f64, defaults.soil_temperature),
        soil_ph: parse_env!(lookup, "UMBRAL_PH_SUELO", f64, defaults.soil_ph),
        air_humidity: parse_env!(lookup, "UMBRAL_HUMEDAD_AIRE", f64, defaults.air_humidity),
        air_temperature: parse_env!(lookup, "UMBRAL_TEMP_AIRE", f64, defaults.air_temperature),
        radiation: parse_env!(lookup, "UMBRAL_RADIACION", f64, defaults.radiation),
    };

    let thingspeak = ThingSpeakConfig {
        base_url: optional_env!(lookup, "THINGSPEAK_URL")
            .unwrap_or_else(|| "https://api.thingspeak.com".to_string()),
        write_key: optional_env!(lookup, "THINGSPEAK_WRITE_API_KEY"),
        channel_id: optional_env!(lookup, "THINGSPEAK_CHANNEL_ID"),
        read_key: optional_env!(lookup, "THINGSPEAK_READ_API_KEY"),
        results: parse_env!(lookup, "THINGSPEAK_RESULTS", u32, 8000),
        timeout: Duration::from_secs(parse_env!(lookup, "THINGSPEAK_TIMEOUT_SECS", u64, 6)),
    };

    let grid_rows = parse_env!(lookup, "GRID_ROWS", usize, 4);
    let grid_cols = parse_env!(lookup, "GRID_COLS", usize, 5);
    if grid_rows == 0 || grid_cols == 0 {
        return Err(anyhow!("GRID_ROWS and GRID_COLS must be at least 1"));
    }
    if grid_cells(grid_rows, grid_cols).is_none() {
        return Err(anyhow!(
            "GRID_ROWS x GRID_COLS must not exceed {} cells",
            MAX_CELLS
        ));
    }

    let refresh_secs = parse_env!(lookup, "REFRESH_SECS", u64, 2);
    if refresh_secs == 0 {
        return Err(anyhow!("REFRESH_SECS must be at least 1"));
    }

    Ok(Config {
        log_path: PathBuf::from(
            optional_env!(lookup, "LOG_STORE_PATH").unwrap_or_else(|| "datos.csv".to_string()),
        ),
        report_path: PathBuf::from(
            optional_env!(lookup, "REPORT_PATH")
                .unwrap_or_else(|| "Reporte_Vinedo.xlsx".to_string()),
        ),
        generate_report: parse_env!(lookup, "GENERATE_REPORT", bool, true),
        grid_rows,
        grid_cols,
        pace: Duration::from_millis(parse_env!(lookup, "PACE_MS", u64, 1000)),
        refresh: Duration::from_secs(refresh_secs),
        history_rows: parse_env!(lookup, "HISTORY_ROWS", usize, 50),
        dashboard_addr: parse_env!(
            lookup,
            "DASHBOARD_ADDR",
            SocketAddr,
            SocketAddr::from(([0, 0, 0, 0], 8080))
        ),
        reset_log_on_start: parse_env!(lookup, "RESET_LOG_ON_START", bool, false),
        thresholds,
        thingspeak,
    })
}

/// Show only the last four characters of a secret.
fn mask(secret: &Option<String>) -> String {
    match secret {
        None => "(unset)".to_string(),
        Some(s) if s.chars().count() <= 4 => "****".to_string(),
        Some(s) => {
            let tail: String = s.chars().skip(s.chars().count() - 4).collect();
            format!("****{tail}")
        }
    }
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// API keys are masked.
    pub fn log_config(&self) {
        // ---
        let t = &self.thresholds;
        let ts = &self.thingspeak;

        tracing::info!("Configuration loaded:");
        tracing::info!("  LOG_STORE_PATH     : {}", self.log_path.display());
        tracing::info!("  REPORT_PATH        : {}", self.report_path.display());
        tracing::info!("  GENERATE_REPORT    : {}", self.generate_report);
        tracing::info!("  GRID               : {}x{}", self.grid_rows, self.grid_cols);
        tracing::info!("  PACE_MS            : {}", self.pace.as_millis());
        tracing::info!("  REFRESH_SECS       : {}", self.refresh.as_secs());
        tracing::info!("  HISTORY_ROWS       : {}", self.history_rows);
        tracing::info!("  DASHBOARD_ADDR     : {}", self.dashboard_addr);
        tracing::info!("  RESET_LOG_ON_START : {}", self.reset_log_on_start);
        tracing::info!("  THINGSPEAK_URL     : {}", ts.base_url);
        tracing::info!("  THINGSPEAK_WRITE   : {}", mask(&ts.write_key));
        tracing::info!(
            "  THINGSPEAK_CHANNEL : {}",
            ts.channel_id.as_deref().unwrap_or("(unset)")
        );
        tracing::info!("  THINGSPEAK_READ    : {}", mask(&ts.read_key));
        tracing::info!(
            "  THRESHOLDS         : suelo {}% / {}°C / pH {}, aire {}% / {}°C, radiación {} lux",
            t.soil_moisture,
            t.soil_temperature,
            t.soil_ph,
            t.air_humidity,
            t.air_temperature,
            t.radiation
        );
    }
}
