//! Simulated IoT vineyard monitor.
//!
//! A robot walks a rows x columns grid of vines in serpentine order, samples
//! six synthetic sensors at every cell, flags readings above their thresholds,
//! appends them to a CSV log store and optionally uploads them to a remote
//! telemetry channel. A separate dashboard polls the log store (or the remote
//! channel) and serves live alerts and charts over HTTP. After a walk an Excel
//! report summarizes the pass.
//!
//! The binary in `main.rs` wires these together; the types most callers need
//! are re-exported at the crate root.

pub mod config;
pub mod dashboard;
pub mod generator;
pub mod models;
pub mod report;
pub mod routes;
pub mod store;
pub mod telemetry;
pub mod thresholds;
pub mod walker;

pub use config::Config;
pub use models::{AlertStatus, FeedRow, Metric, MetricStatus, Reading, SensorValues};
pub use thresholds::ThresholdConfig;
