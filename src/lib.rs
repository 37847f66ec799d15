//! # forecast_rnn
//!
//! `forecast_rnn` is a windowed recurrent forecasting engine for univariate
//! time series. A [`ForecastSession`] owns one model instance built from a
//! [`ModelConfig`] and drives it through training, multi-step prediction,
//! held-out evaluation and disposal. Two fixed architectures are provided:
//! a single-layer GRU (Lightweight) and a stacked LSTM with dropout (Deep).
//!
//! ## Example
//!
//! ```
//! use forecast_rnn::{
//!     ArchitectureVariant, Dataset, ForecastSession, ModelConfig, SilentSink, WindowedSample,
//! };
//!
//! let config = ModelConfig::new(8, 2, ArchitectureVariant::Lightweight)?;
//! let samples: Vec<WindowedSample> = (0..20)
//!     .map(|i| WindowedSample {
//!         window: (0..8).map(|t| ((i + t) as f64 * 0.1).sin()).collect(),
//!         target: (0..2).map(|h| ((i + 8 + h) as f64 * 0.1).sin()).collect(),
//!     })
//!     .collect();
//! let data = Dataset::from_samples(&samples, 8, 2)?;
//!
//! let mut session = ForecastSession::with_seed(config, 7);
//! session.train(Some(&data), 2, &mut SilentSink)?;
//!
//! let (window, _) = data.sample(0);
//! let forecast = session.predict(Some(&window.to_owned()))?;
//! assert_eq!(forecast.len(), 2);
//!
//! session.dispose();
//! # Ok::<(), forecast_rnn::EngineError>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod models;
pub mod optimizer;
pub mod progress;
pub mod session;
pub mod training;

pub use config::{ArchitectureVariant, CellKind, ModelConfig, OptimizerKind};
pub use data::{Dataset, WindowedSample};
pub use error::{EngineError, Result};
pub use metrics::{EvaluationReport, MetricProvenance};
pub use models::{ParameterArena, RecurrentNet};
pub use progress::{
    EpochRecord, EventLog, ProgressEvent, ProgressSink, SilentSink, TrainingCompleted,
};
pub use session::{ForecastSession, RetainedEvaluation};
pub use training::TrainingOutcome;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
