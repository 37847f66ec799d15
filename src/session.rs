//! Forecasting session lifecycle
//!
//! [`ForecastSession`] is the sole owner of the model instance: it builds,
//! trains, predicts, evaluates and disposes it, and serializes those
//! operations. Recovered-failure paths are logged as warnings so degraded
//! results stay distinguishable from real ones.

use crate::config::{ArchitectureVariant, ModelConfig};
use crate::data::Dataset;
use crate::error::{EngineError, Result};
use crate::metrics::{EvaluationReport, EVAL_BATCH_CAP};
use crate::models::{ParameterArena, RecurrentNet};
use crate::progress::{EpochRecord, ProgressSink};
use crate::training::{run_training, TrainingOutcome};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Per-window predictions and actual targets retained from the most recent
/// evaluation, for downstream charting
#[derive(Debug, Clone, PartialEq)]
pub struct RetainedEvaluation {
    pub predictions: Vec<f64>,
    pub actuals: Vec<f64>,
}

/// Owns one model instance through its build → train → predict/evaluate →
/// dispose lifetime.
///
/// Operations on a session must be serialized; reentry while one is in
/// flight fails fast with [`EngineError::Busy`].
#[derive(Debug)]
pub struct ForecastSession {
    config: ModelConfig,
    net: Option<RecurrentNet>,
    trained: bool,
    busy: bool,
    history: Vec<EpochRecord>,
    arena: ParameterArena,
    retained: Option<RetainedEvaluation>,
    last_training: Option<TrainingOutcome>,
    rng: StdRng,
}

impl ForecastSession {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            net: None,
            trained: false,
            busy: false,
            history: Vec::new(),
            arena: ParameterArena::default(),
            retained: None,
            last_training: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic shuffling and dropout, for reproducible runs
    pub fn with_seed(config: ModelConfig, seed: u64) -> Self {
        let mut session = Self::new(config);
        session.rng = StdRng::seed_from_u64(seed);
        session
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Replace the configuration. Only allowed while no model instance is
    /// held; dispose first to reconfigure.
    pub fn set_config(&mut self, config: ModelConfig) -> Result<()> {
        if self.net.is_some() {
            return Err(EngineError::InvalidParameter(
                "dispose the current model before reconfiguring".to_string(),
            ));
        }
        self.config = config;
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.net.is_some()
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Per-epoch records of the most recent training run
    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    pub fn last_training(&self) -> Option<&TrainingOutcome> {
        self.last_training.as_ref()
    }

    /// Predictions and actuals retained by the most recent Deep-variant
    /// evaluation
    pub fn last_evaluation(&self) -> Option<&RetainedEvaluation> {
        self.retained.as_ref()
    }

    /// Parameter accounting for the currently held model
    pub fn arena(&self) -> &ParameterArena {
        &self.arena
    }

    /// Instantiate fresh model parameters for the configured variant.
    ///
    /// Any previously held parameters are released and the arena is cleared
    /// first, so repeated rebuilds cannot accumulate backend state.
    pub fn build(&mut self) {
        self.net = None;
        self.retained = None;
        self.arena.reset();

        let net = RecurrentNet::new(&self.config);
        net.register_parameters(&mut self.arena);
        self.net = Some(net);
        self.trained = false;
        self.history.clear();
        debug!(
            variant = ?self.config.variant(),
            parameters = self.arena.elements(),
            "model built"
        );
    }

    fn ensure_built(&mut self) {
        if self.net.is_none() {
            self.build();
        }
    }

    fn guarded<T>(
        &mut self,
        operation: &str,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.busy {
            return Err(EngineError::Busy(operation.to_string()));
        }
        self.busy = true;
        let result = body(self);
        self.busy = false;
        result
    }

    /// Run supervised training over the windowed dataset.
    ///
    /// The model is lazily built if absent. On a numeric failure the model
    /// is still marked trained before the error propagates, so downstream
    /// predict/evaluate calls keep working on the partially fitted weights;
    /// callers must treat the error as "trained, possibly low quality".
    pub fn train(
        &mut self,
        data: Option<&Dataset>,
        epoch_count: usize,
        sink: &mut dyn ProgressSink,
    ) -> Result<()> {
        self.guarded("train", |session| {
            let data = data.ok_or_else(|| {
                EngineError::MissingData("training dataset was not provided".to_string())
            })?;
            if data.is_empty() {
                return Err(EngineError::EmptyDataset);
            }
            if data.window_size() != session.config.window_size() {
                return Err(EngineError::InvalidParameter(format!(
                    "Dataset window size ({}) doesn't match configuration ({})",
                    data.window_size(),
                    session.config.window_size()
                )));
            }
            if data.horizon() != session.config.effective_horizon() {
                return Err(EngineError::InvalidParameter(format!(
                    "Dataset horizon ({}) doesn't match configuration ({})",
                    data.horizon(),
                    session.config.effective_horizon()
                )));
            }

            session.ensure_built();
            session.history.clear();

            let config = session.config.clone();
            let spec = config.variant().spec();
            let net = match session.net.as_mut() {
                Some(net) => net,
                None => {
                    return Err(EngineError::Training(
                        "model instance missing after build".to_string(),
                    ))
                }
            };

            let result = run_training(
                net,
                &config,
                &spec,
                data,
                epoch_count,
                sink,
                &mut session.rng,
                &mut session.history,
            );

            match result {
                Ok(outcome) => {
                    session.trained = true;
                    session.last_training = Some(outcome);
                    Ok(())
                }
                Err(error) => {
                    // Partial-success recovery: keep the partially fitted
                    // weights usable instead of blocking downstream calls.
                    session.trained = true;
                    warn!(
                        policy = "partial-success-on-failure",
                        %error,
                        "training failed; model kept and marked trained"
                    );
                    Err(error)
                }
            }
        })
    }

    /// Forecast from one window of shape `[W, 1]`.
    ///
    /// A missing window is a contract violation; everything else is
    /// recovered internally, falling back to a zero forecast of horizon
    /// length.
    pub fn predict(&mut self, window: Option<&Array2<f64>>) -> Result<Vec<f64>> {
        self.guarded("predict", |session| {
            let window = window.ok_or_else(|| {
                EngineError::MissingInput("forecast window was not provided".to_string())
            })?;
            let (rows, cols) = window.dim();
            if rows != session.config.window_size() || cols != 1 {
                return Err(EngineError::InvalidParameter(format!(
                    "Window shape [{}, {}] doesn't match [{}, 1]",
                    rows,
                    cols,
                    session.config.window_size()
                )));
            }

            session.ensure_built();
            let horizon = session.config.effective_horizon();
            let forecast = match session.net.as_ref() {
                Some(net) => net.forward(window.view()),
                None => return Ok(vec![0.0; horizon]),
            };

            if forecast.iter().all(|v| v.is_finite()) {
                Ok(forecast.to_vec())
            } else {
                warn!("prediction produced non-finite values; returning zero forecast");
                Ok(vec![0.0; horizon])
            }
        })
    }

    /// Compute held-out loss/MSE/RMSE over the test set.
    ///
    /// Never fails from the caller's perspective: an absent or untrained
    /// model, a shape mismatch, or a numeric failure all yield the fixed
    /// fallback report, tagged as such.
    pub fn evaluate(&mut self, test_data: &Dataset) -> EvaluationReport {
        if self.busy {
            warn!("evaluate rejected while another operation is in flight; returning fallback metrics");
            return EvaluationReport::fallback();
        }
        self.busy = true;
        let report = self.evaluate_inner(test_data);
        self.busy = false;
        report
    }

    fn evaluate_inner(&mut self, test_data: &Dataset) -> EvaluationReport {
        let net = match (&self.net, self.trained) {
            (Some(net), true) => net,
            _ => {
                debug!("evaluate on an untrained model; returning fallback metrics");
                return EvaluationReport::fallback();
            }
        };

        if test_data.is_empty()
            || test_data.window_size() != self.config.window_size()
            || test_data.horizon() != self.config.effective_horizon()
        {
            warn!("test dataset shape mismatch; returning fallback metrics");
            return EvaluationReport::fallback();
        }

        let mut predictions = Vec::new();
        let mut actuals = Vec::new();
        let mut sum = 0.0;
        let mut count = 0usize;

        let indices: Vec<usize> = (0..test_data.len()).collect();
        for chunk in indices.chunks(EVAL_BATCH_CAP) {
            for &index in chunk {
                let (window, target) = test_data.sample(index);
                let forecast = net.forward(window);
                if forecast.iter().any(|v| !v.is_finite()) {
                    warn!("evaluation produced non-finite predictions; returning fallback metrics");
                    return EvaluationReport::fallback();
                }
                for (predicted, actual) in forecast.iter().zip(target.iter()) {
                    sum += (predicted - actual) * (predicted - actual);
                    count += 1;
                    predictions.push(*predicted);
                    actuals.push(*actual);
                }
            }
        }

        if count == 0 {
            return EvaluationReport::fallback();
        }
        let mse = sum / count as f64;
        if !mse.is_finite() {
            warn!("evaluation metrics were non-finite; returning fallback metrics");
            return EvaluationReport::fallback();
        }

        if self.config.variant() == ArchitectureVariant::Deep {
            self.retained = Some(RetainedEvaluation {
                predictions,
                actuals,
            });
        }

        EvaluationReport::computed(mse)
    }

    /// Persist a weight snapshot, only for trained models.
    ///
    /// Best effort: every failure is swallowed and reported as `false`.
    pub fn save_weights<P: AsRef<Path>>(&self, path: P) -> bool {
        if !self.trained {
            debug!("save_weights skipped: model not trained");
            return false;
        }
        let net = match &self.net {
            Some(net) => net,
            None => return false,
        };

        let snapshot = match serde_json::to_string(net) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(%error, "weight snapshot serialization failed");
                return false;
            }
        };
        match fs::write(path, snapshot) {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "weight snapshot write failed");
                false
            }
        }
    }

    /// Restore a weight snapshot written by [`Self::save_weights`].
    ///
    /// Same best-effort contract: any failure leaves the session untouched
    /// and returns `false`. A successful load marks the model trained.
    pub fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> bool {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) => {
                debug!(%error, "weight snapshot read failed");
                return false;
            }
        };
        let net: RecurrentNet = match serde_json::from_str(&raw) {
            Ok(net) => net,
            Err(error) => {
                warn!(%error, "weight snapshot deserialization failed");
                return false;
            }
        };
        if net.window_size() != self.config.window_size()
            || net.output_size() != self.config.effective_horizon()
        {
            warn!("weight snapshot doesn't match the configured shapes");
            return false;
        }

        self.arena.reset();
        net.register_parameters(&mut self.arena);
        self.net = Some(net);
        self.trained = true;
        debug!("weight snapshot restored");
        true
    }

    /// Release the model and every retained artifact.
    ///
    /// Idempotent: disposing an already-disposed or never-built session is
    /// a no-op, never an error.
    pub fn dispose(&mut self) {
        self.net = None;
        self.trained = false;
        self.retained = None;
        self.history.clear();
        self.last_training = None;
        self.arena.reset();
        self.busy = false;
        debug!("session disposed");
    }
}
