//! Model configuration and architecture variants
//!
//! Each variant's layer stack, shuffle policy and optimizer are expressed as
//! data in [`VariantSpec`] rather than duplicated control flow: the builder
//! and the trainer both read the spec and stay variant-agnostic.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Which recurrent cell a layer uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Gru,
    Lstm,
}

/// Optimizer selection carried by a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Plain stochastic gradient descent, low overhead per step
    Sgd,
    /// Adaptive moment estimation, smoother convergence
    Adam,
}

/// One recurrent layer in a variant's stack
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecurrentLayerSpec {
    pub cell: CellKind,
    pub hidden_size: usize,
    /// Dropout rate applied to this layer's outputs during training
    pub dropout: f64,
}

/// A variant's full policy: layer stack, head, optimizer and training behavior
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSpec {
    pub recurrent_layers: Vec<RecurrentLayerSpec>,
    /// Width of the non-linear dense layer before the output, if any
    pub head_hidden: Option<usize>,
    /// Single-step variants always forecast one step ahead regardless of the
    /// configured horizon
    pub single_step: bool,
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    /// Whether training samples are reshuffled between epochs
    pub shuffle: bool,
    /// Yield to the host scheduler every this many epochs
    pub yield_interval: usize,
    /// Global gradient norm clip applied before each optimizer step
    pub gradient_clip: Option<f64>,
}

/// Supported network architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchitectureVariant {
    /// One compact GRU layer with a linear projection to the full horizon.
    /// Tuned for throughput: high-rate SGD, no shuffling between epochs so
    /// temporal locality is preserved.
    Lightweight,
    /// Two stacked LSTM layers with interleaved dropout, a ReLU dense layer
    /// and a single-scalar output. Tuned for convergence quality: Adam with
    /// epoch shuffling.
    Deep,
}

impl ArchitectureVariant {
    /// The variant's policy as data
    pub fn spec(&self) -> VariantSpec {
        match self {
            ArchitectureVariant::Lightweight => VariantSpec {
                recurrent_layers: vec![RecurrentLayerSpec {
                    cell: CellKind::Gru,
                    hidden_size: 32,
                    dropout: 0.0,
                }],
                head_hidden: None,
                single_step: false,
                optimizer: OptimizerKind::Sgd,
                learning_rate: 0.01,
                shuffle: false,
                yield_interval: 5,
                gradient_clip: Some(1.0),
            },
            ArchitectureVariant::Deep => VariantSpec {
                recurrent_layers: vec![
                    RecurrentLayerSpec {
                        cell: CellKind::Lstm,
                        hidden_size: 64,
                        dropout: 0.2,
                    },
                    RecurrentLayerSpec {
                        cell: CellKind::Lstm,
                        hidden_size: 32,
                        dropout: 0.2,
                    },
                ],
                head_hidden: Some(16),
                single_step: true,
                optimizer: OptimizerKind::Adam,
                learning_rate: 0.001,
                shuffle: true,
                yield_interval: 1,
                gradient_clip: Some(1.0),
            },
        }
    }
}

/// Architecture and hyperparameters for one forecasting session.
///
/// Immutable once a model instance is built; rebuilding with a different
/// configuration requires disposing the prior instance first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    window_size: usize,
    horizon: usize,
    variant: ArchitectureVariant,
    batch_size: usize,
}

impl ModelConfig {
    /// Create a new configuration with the default batch size of 32
    pub fn new(
        window_size: usize,
        horizon: usize,
        variant: ArchitectureVariant,
    ) -> Result<Self> {
        if window_size == 0 {
            return Err(EngineError::InvalidParameter(
                "Window size must be at least 1".to_string(),
            ));
        }
        if horizon == 0 {
            return Err(EngineError::InvalidParameter(
                "Prediction horizon must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            window_size,
            horizon,
            variant,
            batch_size: 32,
        })
    }

    /// Set the mini-batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(EngineError::InvalidParameter(
                "Batch size must be at least 1".to_string(),
            ));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn variant(&self) -> ArchitectureVariant {
        self.variant
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of values a forecast actually produces.
    ///
    /// Single-step variants forecast one step ahead regardless of the
    /// configured horizon.
    pub fn effective_horizon(&self) -> usize {
        if self.variant.spec().single_step {
            1
        } else {
            self.horizon
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            window_size: 60,
            horizon: 5,
            variant: ArchitectureVariant::Lightweight,
            batch_size: 32,
        }
    }
}
