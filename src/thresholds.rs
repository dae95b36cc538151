//! Threshold evaluation.
//!
//! A metric violates its threshold only when the value is strictly greater
//! than the configured maximum. The walker and the dashboard share one
//! [`ThresholdConfig`] built by `config`, so both sides always agree on what
//! counts as an alert.

use serde::Serialize;

use crate::models::{AlertStatus, Metric, MetricStatus, SensorValues};

// ---

/// Per-metric maximum allowed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdConfig {
    // ---
    pub soil_moisture: f64,
    pub soil_temperature: f64,
    pub soil_ph: f64,
    pub air_humidity: f64,
    pub air_temperature: f64,
    pub radiation: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            soil_moisture: 35.0,
            soil_temperature: 33.0,
            soil_ph: 7.5,
            air_humidity: 85.0,
            air_temperature: 35.0,
            radiation: 45_000.0,
        }
    }
}

impl ThresholdConfig {
    // ---
    pub fn max_for(&self, metric: Metric) -> f64 {
        match metric {
            Metric::SoilMoisture => self.soil_moisture,
            Metric::SoilTemperature => self.soil_temperature,
            Metric::SoilPh => self.soil_ph,
            Metric::AirHumidity => self.air_humidity,
            Metric::AirTemperature => self.air_temperature,
            Metric::Radiation => self.radiation,
        }
    }
}

/// Outcome of evaluating one full set of sensor values.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    // ---
    pub status: AlertStatus,
    /// Violated metrics in [`Metric::ALL`] order.
    pub violated: Vec<Metric>,
}

/// Compare every metric against its maximum.
pub fn evaluate(values: &SensorValues, thresholds: &ThresholdConfig) -> Evaluation {
    // ---
    let violated: Vec<Metric> = Metric::ALL
        .into_iter()
        .filter(|m| values.get(*m) > thresholds.max_for(*m))
        .collect();

    let status = if violated.is_empty() {
        AlertStatus::Normal
    } else {
        AlertStatus::OutOfRange
    };

    Evaluation { status, violated }
}

/// Status of a single, possibly missing, value read back from a data source.
///
/// `None` and NaN both map to [`MetricStatus::NoData`].
pub fn evaluate_metric(value: Option<f64>, threshold: f64) -> MetricStatus {
    match value {
        None => MetricStatus::NoData,
        Some(v) if v.is_nan() => MetricStatus::NoData,
        Some(v) if v > threshold => MetricStatus::OutOfRange,
        Some(_) => MetricStatus::Normal,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn values(v: [f64; 6]) -> SensorValues {
        SensorValues::from_ordered(v)
    }

    #[test]
    fn test_single_violation() {
        // ---
        let eval = evaluate(
            &values([36.0, 20.0, 6.0, 50.0, 20.0, 100.0]),
            &ThresholdConfig::default(),
        );
        assert_eq!(eval.status, AlertStatus::OutOfRange);
        assert_eq!(eval.violated, vec![Metric::SoilMoisture]);
        assert_eq!(eval.violated[0].alert_name(), "Humedad Suelo");
    }

    #[test]
    fn test_all_normal() {
        // ---
        let eval = evaluate(
            &values([20.0, 20.0, 6.0, 50.0, 20.0, 100.0]),
            &ThresholdConfig::default(),
        );
        assert_eq!(eval.status, AlertStatus::Normal);
        assert!(eval.violated.is_empty());
    }

    #[test]
    fn test_threshold_is_strict() {
        // ---
        // Exactly at every maximum - no alert
        let t = ThresholdConfig::default();
        let at_max = values([35.0, 33.0, 7.5, 85.0, 35.0, 45_000.0]);
        assert_eq!(evaluate(&at_max, &t).status, AlertStatus::Normal);

        let above = values([35.01, 33.0, 7.5, 85.0, 35.0, 45_000.01]);
        assert_eq!(
            evaluate(&above, &t).violated,
            vec![Metric::SoilMoisture, Metric::Radiation]
        );
    }

    #[test]
    fn test_violations_follow_metric_order() {
        // ---
        let eval = evaluate(
            &values([40.0, 34.0, 8.0, 90.0, 35.5, 50_000.0]),
            &ThresholdConfig::default(),
        );
        assert_eq!(eval.violated, Metric::ALL.to_vec());
    }

    #[test]
    fn test_custom_thresholds() {
        // ---
        let t = ThresholdConfig {
            soil_ph: 6.0,
            ..ThresholdConfig::default()
        };
        let eval = evaluate(&values([20.0, 20.0, 6.5, 50.0, 20.0, 100.0]), &t);
        assert_eq!(eval.violated, vec![Metric::SoilPh]);
    }

    #[test]
    fn test_metric_status_no_data() {
        // ---
        assert_eq!(evaluate_metric(None, 35.0), MetricStatus::NoData);
        assert_eq!(evaluate_metric(Some(f64::NAN), 35.0), MetricStatus::NoData);
        assert_eq!(evaluate_metric(Some(35.0), 35.0), MetricStatus::Normal);
        assert_eq!(evaluate_metric(Some(35.5), 35.0), MetricStatus::OutOfRange);
    }
}
