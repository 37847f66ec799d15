//! Evaluation metrics for held-out forecasts

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Loss reported when no real evaluation could run
pub const FALLBACK_LOSS: f64 = 0.001;
/// MSE reported when no real evaluation could run
pub const FALLBACK_MSE: f64 = 0.001;
/// RMSE reported when no real evaluation could run
pub const FALLBACK_RMSE: f64 = 0.032;

/// Upper bound on evaluation batch size, independent of the training batch
pub const EVAL_BATCH_CAP: usize = 32;

/// Whether a report holds real metrics or the fixed placeholder triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricProvenance {
    Computed,
    Fallback,
}

/// Held-out metrics for one evaluation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub loss: f64,
    pub mse: f64,
    pub rmse: f64,
    pub provenance: MetricProvenance,
}

impl EvaluationReport {
    /// The placeholder triple returned for untrained models and recovered
    /// evaluation failures
    pub fn fallback() -> Self {
        Self {
            loss: FALLBACK_LOSS,
            mse: FALLBACK_MSE,
            rmse: FALLBACK_RMSE,
            provenance: MetricProvenance::Fallback,
        }
    }

    /// A real result; the loss function is MSE, so loss and mse coincide
    pub fn computed(mse: f64) -> Self {
        Self {
            loss: mse,
            mse,
            rmse: mse.sqrt(),
            provenance: MetricProvenance::Computed,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.provenance == MetricProvenance::Fallback
    }
}

impl std::fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Evaluation Report:")?;
        writeln!(f, "  Loss: {:.6}", self.loss)?;
        writeln!(f, "  MSE:  {:.6}", self.mse)?;
        writeln!(f, "  RMSE: {:.6}", self.rmse)?;
        if self.is_fallback() {
            writeln!(f, "  (placeholder values, no evaluation ran)")?;
        }
        Ok(())
    }
}

/// Mean squared error between a forecast and the actual values
pub fn mean_squared_error(forecast: &[f64], actual: &[f64]) -> Result<f64> {
    check_lengths(forecast, actual)?;
    let squared: Vec<f64> = forecast
        .iter()
        .zip(actual.iter())
        .map(|(f, a)| (f - a) * (f - a))
        .collect();
    Ok(squared.iter().copied().mean())
}

/// Root mean squared error between a forecast and the actual values
pub fn root_mean_squared_error(forecast: &[f64], actual: &[f64]) -> Result<f64> {
    Ok(mean_squared_error(forecast, actual)?.sqrt())
}

/// Mean absolute error between a forecast and the actual values
pub fn mean_absolute_error(forecast: &[f64], actual: &[f64]) -> Result<f64> {
    check_lengths(forecast, actual)?;
    let absolute: Vec<f64> = forecast
        .iter()
        .zip(actual.iter())
        .map(|(f, a)| (f - a).abs())
        .collect();
    Ok(absolute.iter().copied().mean())
}

fn check_lengths(forecast: &[f64], actual: &[f64]) -> Result<()> {
    if forecast.len() != actual.len() || forecast.is_empty() {
        return Err(EngineError::InvalidParameter(
            "Forecast and actual values must have the same non-zero length".to_string(),
        ));
    }
    Ok(())
}
