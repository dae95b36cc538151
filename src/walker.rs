//! Serpentine walk over the vineyard grid.
//!
//! One pass visits every cell exactly once. Each visit produces a reading,
//! evaluates it, marks the cell if it alerted, pushes the reading downstream
//! and then waits the pacing delay.

use std::fmt;
use std::time::Duration;

use chrono::{Local, Timelike};

use crate::generator::SensorGenerator;
use crate::models::{AlertStatus, Reading};
use crate::store::{LogStore, StoreError};
use crate::telemetry::{SendOutcome, TelemetrySink};
use crate::thresholds::{evaluate, ThresholdConfig};

// ---

/// Zero-indexed grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

/// Largest grid a single walk accepts.
pub const MAX_CELLS: usize = 1_000_000;

/// Number of cells in a `rows x cols` grid, or `None` when it overflows or
/// exceeds [`MAX_CELLS`].
pub fn grid_cells(rows: usize, cols: usize) -> Option<usize> {
    rows.checked_mul(cols).filter(|n| *n <= MAX_CELLS)
}

/// Visit order for a `rows x cols` grid.
///
/// Direction is one flag that flips after every completed row, starting left
/// to right.
pub fn serpentine(rows: usize, cols: usize) -> Vec<Cell> {
    // ---
    let mut order = Vec::with_capacity(rows.saturating_mul(cols).min(MAX_CELLS));
    let mut forward = true;
    for row in 0..rows {
        if forward {
            order.extend((0..cols).map(|col| Cell { row, col }));
        } else {
            order.extend((0..cols).rev().map(|col| Cell { row, col }));
        }
        forward = !forward;
    }
    order
}

/// Which cells have alerted during the current pass. Marks are never cleared
/// mid-pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridState {
    rows: usize,
    cols: usize,
    alerted: Vec<bool>,
}

impl GridState {
    // ---
    pub fn new(rows: usize, cols: usize) -> Self {
        GridState {
            rows,
            cols,
            alerted: vec![false; rows.saturating_mul(cols)],
        }
    }

    /// Mark a cell as alerted. Cells outside the grid are ignored.
    pub fn mark(&mut self, cell: Cell) {
        if cell.row < self.rows && cell.col < self.cols {
            self.alerted[cell.row * self.cols + cell.col] = true;
        }
    }

    pub fn is_alerted(&self, cell: Cell) -> bool {
        cell.row < self.rows
            && cell.col < self.cols
            && self.alerted[cell.row * self.cols + cell.col]
    }

    pub fn alerted_count(&self) -> usize {
        self.alerted.iter().filter(|a| **a).count()
    }
}

/// `#` for an alerted cell, `.` otherwise, one line per row.
impl fmt::Display for GridState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            let line: String = (0..self.cols)
                .map(|col| {
                    if self.is_alerted(Cell { row, col }) {
                        '#'
                    } else {
                        '.'
                    }
                })
                .collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Result of one full pass.
#[derive(Debug, Clone)]
pub struct WalkOutcome {
    pub readings: Vec<Reading>,
    pub grid: GridState,
    pub telemetry_sent: usize,
    pub telemetry_failed: usize,
}

pub struct GridWalker {
    rows: usize,
    cols: usize,
    pace: Duration,
    generator: SensorGenerator,
    thresholds: ThresholdConfig,
}

impl GridWalker {
    // ---
    pub fn new(
        rows: usize,
        cols: usize,
        pace: Duration,
        generator: SensorGenerator,
        thresholds: ThresholdConfig,
    ) -> Self {
        GridWalker {
            rows,
            cols,
            pace,
            generator,
            thresholds,
        }
    }

    /// Run a single pass.
    ///
    /// Log store failures abort the pass. Telemetry failures are logged and
    /// counted; the walk carries on.
    pub async fn walk(
        &mut self,
        store: Option<&LogStore>,
        sink: &dyn TelemetrySink,
    ) -> Result<WalkOutcome, StoreError> {
        // ---
        let mut grid = GridState::new(self.rows, self.cols);
        let mut readings = Vec::with_capacity(self.rows.saturating_mul(self.cols).min(MAX_CELLS));
        let mut telemetry_sent = 0;
        let mut telemetry_failed = 0;

        tracing::info!("Starting walk over a {}x{} grid", self.rows, self.cols);

        for cell in serpentine(self.rows, self.cols) {
            let values = self.generator.generate();
            let eval = evaluate(&values, &self.thresholds);

            if eval.status == AlertStatus::OutOfRange {
                grid.mark(cell);
            }

            let now = Local::now().naive_local();
            let reading = Reading {
                timestamp: now.with_nanosecond(0).unwrap_or(now),
                row: cell.row + 1,
                col: cell.col + 1,
                values,
                status: eval.status,
                violated: eval.violated,
            };

            tracing::info!(
                "({},{}) -> {:?} | {} {}",
                reading.row,
                reading.col,
                reading.values,
                reading.status.as_str(),
                reading.violated_names()
            );

            match sink.send(&reading.values).await {
                Ok(SendOutcome::Accepted { entry_id }) => {
                    telemetry_sent += 1;
                    tracing::debug!("Telemetry accepted, entry {}", entry_id);
                }
                Ok(SendOutcome::Skipped) => {}
                Err(e) => {
                    telemetry_failed += 1;
                    tracing::warn!("Telemetry upload failed: {}", e);
                }
            }

            if let Some(store) = store {
                store.append(&reading)?;
            }

            readings.push(reading);

            if !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
        }

        tracing::info!(
            "Walk complete: {} readings, {} cells alerted",
            readings.len(),
            grid.alerted_count()
        );

        Ok(WalkOutcome {
            readings,
            grid,
            telemetry_sent,
            telemetry_failed,
        })
    }
}
