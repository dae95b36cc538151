//! Data models for the vineyard sensor pipeline.
//!
//! The six metrics always appear in the same order ([`Metric::ALL`]); the log
//! store columns, the telemetry fields, the alert list and the report sheets all
//! follow it.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ---

/// Timestamp layout used on disk and in the dashboard.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One of the six monitored quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SoilMoisture,
    SoilTemperature,
    SoilPh,
    AirHumidity,
    AirTemperature,
    Radiation,
}

impl Metric {
    // ---
    pub const ALL: [Metric; 6] = [
        Metric::SoilMoisture,
        Metric::SoilTemperature,
        Metric::SoilPh,
        Metric::AirHumidity,
        Metric::AirTemperature,
        Metric::Radiation,
    ];

    /// Column name in the log store.
    pub fn column(self) -> &'static str {
        match self {
            Metric::SoilMoisture => "humedad_suelo",
            Metric::SoilTemperature => "temperatura_suelo",
            Metric::SoilPh => "ph_suelo",
            Metric::AirHumidity => "humedad_aire",
            Metric::AirTemperature => "temperatura_aire",
            Metric::Radiation => "radiacion",
        }
    }

    /// Name used in the `tipo_alerta` list and the report summary.
    pub fn alert_name(self) -> &'static str {
        match self {
            Metric::SoilMoisture => "Humedad Suelo",
            Metric::SoilTemperature => "Temperatura Suelo",
            Metric::SoilPh => "pH Suelo",
            Metric::AirHumidity => "Humedad Aire",
            Metric::AirTemperature => "Temperatura Aire",
            Metric::Radiation => "Radiación",
        }
    }

    /// Human label with unit, used for chart titles.
    pub fn label(self) -> &'static str {
        match self {
            Metric::SoilMoisture => "Humedad Suelo (%)",
            Metric::SoilTemperature => "Temperatura Suelo (°C)",
            Metric::SoilPh => "pH Suelo",
            Metric::AirHumidity => "Humedad Aire (%)",
            Metric::AirTemperature => "Temperatura Aire (°C)",
            Metric::Radiation => "Radiación (lux)",
        }
    }

    /// Remote channel field carrying this metric.
    pub fn field(self) -> &'static str {
        match self {
            Metric::SoilMoisture => "field1",
            Metric::SoilTemperature => "field2",
            Metric::SoilPh => "field3",
            Metric::AirHumidity => "field4",
            Metric::AirTemperature => "field5",
            Metric::Radiation => "field6",
        }
    }

    /// Closed generation range `(low, high)`.
    pub fn range(self) -> (f64, f64) {
        match self {
            Metric::SoilMoisture => (10.0, 40.0),
            Metric::SoilTemperature => (15.0, 35.0),
            Metric::SoilPh => (5.5, 8.0),
            Metric::AirHumidity => (40.0, 90.0),
            Metric::AirTemperature => (15.0, 35.0),
            Metric::Radiation => (0.0, 50_000.0),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// The six values of a single sensor sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorValues {
    // ---
    pub soil_moisture: f64,
    pub soil_temperature: f64,
    pub soil_ph: f64,
    pub air_humidity: f64,
    pub air_temperature: f64,
    pub radiation: f64,
}

impl SensorValues {
    // ---
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::SoilMoisture => self.soil_moisture,
            Metric::SoilTemperature => self.soil_temperature,
            Metric::SoilPh => self.soil_ph,
            Metric::AirHumidity => self.air_humidity,
            Metric::AirTemperature => self.air_temperature,
            Metric::Radiation => self.radiation,
        }
    }

    /// Build from values listed in [`Metric::ALL`] order.
    pub fn from_ordered(v: [f64; 6]) -> Self {
        SensorValues {
            soil_moisture: v[0],
            soil_temperature: v[1],
            soil_ph: v[2],
            air_humidity: v[3],
            air_temperature: v[4],
            radiation: v[5],
        }
    }
}

/// Binary alert status of a whole reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    Normal,
    OutOfRange,
}

impl AlertStatus {
    // ---
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Normal => "NORMAL",
            AlertStatus::OutOfRange => "FUERA DE LO NORMAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "NORMAL" => Some(AlertStatus::Normal),
            "FUERA DE LO NORMAL" => Some(AlertStatus::OutOfRange),
            _ => None,
        }
    }
}

/// Per-metric status as shown on the dashboard. `NoData` only arises from
/// read-back of external data, never from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Normal,
    OutOfRange,
    NoData,
}

/// One observed cell visit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    // ---
    pub timestamp: NaiveDateTime,
    /// 1-indexed grid row.
    pub row: usize,
    /// 1-indexed grid column.
    pub col: usize,
    pub values: SensorValues,
    pub status: AlertStatus,
    pub violated: Vec<Metric>,
}

impl Reading {
    // ---
    /// Violated metrics joined the way the `tipo_alerta` column stores them.
    pub fn violated_names(&self) -> String {
        self.violated
            .iter()
            .map(|m| m.alert_name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn to_feed_row(&self) -> FeedRow {
        // ---
        let mut values = [None; 6];
        for m in Metric::ALL {
            values[m.index()] = Some(self.values.get(m));
        }
        FeedRow {
            timestamp: Some(self.timestamp),
            values,
        }
    }
}

/// A loosely typed row read back from the log store or the remote feed.
///
/// Fields that are missing or fail to parse are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedRow {
    // ---
    pub timestamp: Option<NaiveDateTime>,
    pub values: [Option<f64>; 6],
}

impl FeedRow {
    // ---
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values[metric.index()]
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        self.values[metric.index()] = value;
    }
}
