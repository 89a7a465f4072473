//! Water level estimation from sensor readings

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EstimateError {
    #[error("sensor reading {name} is not a finite number")]
    InvalidReading { name: &'static str },

    #[error("estimator produced a non-finite water level ({0})")]
    NonFinite(f64),
}

/// Raw inputs of a water level model
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorReadings {
    /// Rainfall, in the unit the model was fitted on
    pub rainfall: f64,
    pub river_discharge: f64,
    /// Water level reported by a gauge, meters
    pub sensor_water_level: f64,
}

impl SensorReadings {
    fn validate(&self) -> Result<(), EstimateError> {
        for (name, value) in [
            ("rainfall", self.rainfall),
            ("river_discharge", self.river_discharge),
            ("sensor_water_level", self.sensor_water_level),
        ] {
            if !value.is_finite() {
                return Err(EstimateError::InvalidReading { name });
            }
        }
        Ok(())
    }
}

/// Maps sensor readings to the water level used for flood classification.
///
/// Implementations must be deterministic and return a finite level.
pub trait WaterLevelEstimator: Send + Sync {
    fn estimate(&self, readings: &SensorReadings) -> Result<f64, EstimateError>;
}

/// `intercept + Σ coefficient × reading`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearEstimator {
    pub intercept: f64,
    pub rainfall: f64,
    pub river_discharge: f64,
    pub sensor_water_level: f64,
}

impl Default for LinearEstimator {
    /// Passes the gauge reading through unchanged
    fn default() -> Self {
        Self {
            intercept: 0.0,
            rainfall: 0.0,
            river_discharge: 0.0,
            sensor_water_level: 1.0,
        }
    }
}

impl WaterLevelEstimator for LinearEstimator {
    fn estimate(&self, readings: &SensorReadings) -> Result<f64, EstimateError> {
        readings.validate()?;
        let level = self.intercept
            + self.rainfall * readings.rainfall
            + self.river_discharge * readings.river_discharge
            + self.sensor_water_level * readings.sensor_water_level;
        if level.is_finite() {
            Ok(level)
        } else {
            Err(EstimateError::NonFinite(level))
        }
    }
}
