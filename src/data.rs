//! Windowed training data for the forecasting engine
//!
//! Windowing and normalization themselves are owned by the dataset provider;
//! this module only holds the already-prepared tensors and validates their
//! shapes.

use crate::error::{EngineError, Result};
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};

/// One training or inference example: a fixed-length window of normalized
/// values and its forecast target
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedSample {
    pub window: Vec<f64>,
    pub target: Vec<f64>,
}

impl WindowedSample {
    pub fn new(window: Vec<f64>, target: Vec<f64>) -> Self {
        Self { window, target }
    }

    /// Validate the sample against the configured shapes
    pub fn check(&self, window_size: usize, horizon: usize) -> Result<()> {
        if self.window.len() != window_size {
            return Err(EngineError::InvalidParameter(format!(
                "Window length ({}) doesn't match window size ({})",
                self.window.len(),
                window_size
            )));
        }
        if self.target.len() != horizon {
            return Err(EngineError::InvalidParameter(format!(
                "Target length ({}) doesn't match horizon ({})",
                self.target.len(),
                horizon
            )));
        }
        Ok(())
    }
}

/// A batch of windowed samples: inputs of shape `[N, W, 1]` and targets of
/// shape `[N, H]`
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    inputs: Array3<f64>,
    targets: Array2<f64>,
}

impl Dataset {
    /// Create a dataset from already-windowed tensors.
    ///
    /// An empty dataset is constructible; training rejects it separately.
    pub fn new(inputs: Array3<f64>, targets: Array2<f64>) -> Result<Self> {
        if inputs.shape()[0] != targets.shape()[0] {
            return Err(EngineError::InvalidParameter(format!(
                "Input count ({}) doesn't match target count ({})",
                inputs.shape()[0],
                targets.shape()[0]
            )));
        }
        if inputs.shape()[2] != 1 {
            return Err(EngineError::InvalidParameter(format!(
                "Expected univariate windows of shape [N, W, 1], got feature dimension {}",
                inputs.shape()[2]
            )));
        }

        Ok(Self { inputs, targets })
    }

    /// Create a dataset from optional tensors, as handed over by the dataset
    /// provider. A missing tensor is a caller contract violation.
    pub fn from_parts(
        inputs: Option<Array3<f64>>,
        targets: Option<Array2<f64>>,
    ) -> Result<Self> {
        let inputs = inputs.ok_or_else(|| {
            EngineError::MissingData("input windows were not provided".to_string())
        })?;
        let targets = targets.ok_or_else(|| {
            EngineError::MissingData("targets were not provided".to_string())
        })?;

        Self::new(inputs, targets)
    }

    /// Build the tensors from individual samples
    pub fn from_samples(
        samples: &[WindowedSample],
        window_size: usize,
        horizon: usize,
    ) -> Result<Self> {
        let n = samples.len();
        let mut inputs = Array3::zeros((n, window_size, 1));
        let mut targets = Array2::zeros((n, horizon));

        for (i, sample) in samples.iter().enumerate() {
            sample.check(window_size, horizon)?;
            for (t, &value) in sample.window.iter().enumerate() {
                inputs[[i, t, 0]] = value;
            }
            for (h, &value) in sample.target.iter().enumerate() {
                targets[[i, h]] = value;
            }
        }

        Self::new(inputs, targets)
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.inputs.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window length of every sample
    pub fn window_size(&self) -> usize {
        self.inputs.shape()[1]
    }

    /// Target length of every sample
    pub fn horizon(&self) -> usize {
        self.targets.shape()[1]
    }

    pub fn inputs(&self) -> &Array3<f64> {
        &self.inputs
    }

    pub fn targets(&self) -> &Array2<f64> {
        &self.targets
    }

    /// Borrow one sample as `(window [W, 1], target [H])`
    pub fn sample(&self, index: usize) -> (ArrayView2<f64>, ArrayView1<f64>) {
        (
            self.inputs.index_axis(Axis(0), index),
            self.targets.index_axis(Axis(0), index),
        )
    }
}
