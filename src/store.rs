//! Append-only CSV log store.
//!
//! The walker is the single writer; any number of dashboards may poll the file.
//! There is no locking. Every append is flushed and synced before returning so
//! a reader polling the file sees the row on its next tick.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AlertStatus, FeedRow, Metric, Reading, SensorValues, TIMESTAMP_FORMAT};

// ---

/// Fixed column header of the log file.
pub const HEADER: [&str; 11] = [
    "timestamp",
    "fila",
    "columna",
    "humedad_suelo",
    "temperatura_suelo",
    "ph_suelo",
    "humedad_aire",
    "temperatura_aire",
    "radiacion",
    "alerta",
    "tipo_alerta",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("log store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("log store CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// One row exactly as it is laid out on disk.
#[derive(Debug, Serialize, Deserialize)]
struct LogRecord {
    // ---
    timestamp: String,
    fila: usize,
    columna: usize,
    humedad_suelo: f64,
    temperatura_suelo: f64,
    ph_suelo: f64,
    humedad_aire: f64,
    temperatura_aire: f64,
    radiacion: f64,
    alerta: String,
    tipo_alerta: String,
}

impl From<&Reading> for LogRecord {
    fn from(r: &Reading) -> Self {
        // ---
        LogRecord {
            timestamp: r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            fila: r.row,
            columna: r.col,
            humedad_suelo: r.values.soil_moisture,
            temperatura_suelo: r.values.soil_temperature,
            ph_suelo: r.values.soil_ph,
            humedad_aire: r.values.air_humidity,
            temperatura_aire: r.values.air_temperature,
            radiacion: r.values.radiation,
            alerta: r.status.as_str().to_string(),
            tipo_alerta: r.violated_names(),
        }
    }
}

impl LogRecord {
    // ---
    fn into_reading(self) -> Option<Reading> {
        let timestamp = NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT).ok()?;
        let status = AlertStatus::parse(&self.alerta)?;
        let violated = self
            .tipo_alerta
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|name| Metric::ALL.into_iter().find(|m| m.alert_name() == name))
            .collect();

        Some(Reading {
            timestamp,
            row: self.fila,
            col: self.columna,
            values: SensorValues::from_ordered([
                self.humedad_suelo,
                self.temperatura_suelo,
                self.ph_suelo,
                self.humedad_aire,
                self.temperatura_aire,
                self.radiacion,
            ]),
            status,
            violated,
        })
    }
}

/// Handle to a CSV log file.
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    // ---
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LogStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the header if the file is missing or empty.
    ///
    /// Returns `true` when the header was written, `false` when a non-empty
    /// file was already in place and left untouched.
    pub fn ensure_initialized(&self) -> Result<bool, StoreError> {
        // ---
        let populated = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() > 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(self.io_err(e)),
        };
        if populated {
            return Ok(false);
        }

        let file = File::create(&self.path).map_err(|e| self.io_err(e))?;
        let mut w = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        w.write_record(HEADER).map_err(|e| self.csv_err(e))?;
        w.flush().map_err(|e| self.io_err(e))?;

        tracing::debug!("Initialized log store at {}", self.path.display());
        Ok(true)
    }

    /// Append one reading, creating the file with its header first if needed.
    pub fn append(&self, reading: &Reading) -> Result<(), StoreError> {
        // ---
        self.ensure_initialized()?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        {
            let mut w = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&file);
            w.serialize(LogRecord::from(reading))
                .map_err(|e| self.csv_err(e))?;
            w.flush().map_err(|e| self.io_err(e))?;
        }
        file.sync_data().map_err(|e| self.io_err(e))?;
        Ok(())
    }

    /// Remove the log file if present.
    pub fn reset(&self) -> Result<(), StoreError> {
        // ---
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Removed previous log store {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Read every row leniently for display.
    ///
    /// A missing, empty or header-only file yields no rows. Fields that cannot
    /// be parsed become `None`; rows the CSV reader cannot decode at all (for
    /// example a line caught half-written) are skipped.
    pub fn read_rows(&self) -> Result<Vec<FeedRow>, StoreError> {
        // ---
        let Some(mut rdr) = self.open_reader()? else {
            return Ok(Vec::new());
        };

        let headers = rdr.headers().map_err(|e| self.csv_err(e))?.clone();
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim(), i))
            .collect();

        let mut rows = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!("Skipping unreadable log row {}: {}", i + 1, e);
                    continue;
                }
            };

            let field = |name: &str| index.get(name).and_then(|&i| record.get(i));

            let mut row = FeedRow {
                timestamp: field("timestamp").and_then(|s| {
                    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
                }),
                ..FeedRow::default()
            };
            for m in Metric::ALL {
                row.set(m, field(m.column()).and_then(|s| s.trim().parse::<f64>().ok()));
            }
            rows.push(row);
        }

        Ok(rows)
    }

    /// Read every well-formed row back as a [`Reading`], in write order.
    ///
    /// Malformed rows are logged and skipped.
    pub fn read_readings(&self) -> Result<Vec<Reading>, StoreError> {
        // ---
        let Some(mut rdr) = self.open_reader()? else {
            return Ok(Vec::new());
        };

        let mut readings = Vec::new();
        for (i, record) in rdr.deserialize::<LogRecord>().enumerate() {
            match record.ok().and_then(LogRecord::into_reading) {
                Some(r) => readings.push(r),
                None => tracing::warn!("Skipping malformed log row {}", i + 1),
            }
        }
        Ok(readings)
    }

    fn open_reader(&self) -> Result<Option<csv::Reader<File>>, StoreError> {
        // ---
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
        if empty {
            return Ok(None);
        }

        Ok(Some(
            csv::ReaderBuilder::new()
                .flexible(true)
                .from_reader(file),
        ))
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}
