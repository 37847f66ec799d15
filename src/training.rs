//! Supervised mini-batch training loop
//!
//! Shuffle policy, optimizer and yield cadence all come from the variant's
//! [`crate::config::VariantSpec`]. The loop itself is variant-agnostic.

use crate::config::{ModelConfig, VariantSpec};
use crate::data::Dataset;
use crate::error::{EngineError, Result};
use crate::models::RecurrentNet;
use crate::optimizer::{clip_gradients, Optimizer};
use crate::progress::{EpochRecord, ProgressEvent, ProgressSink, TrainingCompleted};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::thread;
use std::time::Instant;
use tracing::debug;

/// Fraction of the training set withheld each run to estimate
/// generalization loss without touching the test set
pub const VALIDATION_FRACTION: f64 = 0.1;

/// Summary of one completed training invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub started_at: DateTime<Utc>,
    pub total_elapsed_seconds: f64,
    /// Epoch count actually executed, after clamping to at least 1
    pub epochs_run: usize,
    pub effective_batch_size: usize,
}

/// Run `epoch_count` epochs of mini-batch gradient descent over `data`.
///
/// Progress events go to `sink` at the end of every epoch; per-epoch records
/// accumulate in `history` so a failed run still leaves the completed epochs
/// behind. Returns `EngineError::Training` when the loss goes non-finite.
pub(crate) fn run_training(
    net: &mut RecurrentNet,
    config: &ModelConfig,
    spec: &VariantSpec,
    data: &Dataset,
    epoch_count: usize,
    sink: &mut dyn ProgressSink,
    rng: &mut StdRng,
    history: &mut Vec<EpochRecord>,
) -> Result<TrainingOutcome> {
    let sample_count = data.len();
    let epochs = epoch_count.max(1);
    let effective_batch_size = config.batch_size().min(sample_count).max(1);

    // Hold out the tail of the set, keeping the split temporally ordered
    let validation_len = (sample_count as f64 * VALIDATION_FRACTION) as usize;
    let train_len = sample_count - validation_len;

    let mut optimizer = Optimizer::new(spec.optimizer, spec.learning_rate);
    let mut train_indices: Vec<usize> = (0..train_len).collect();

    let started_at = Utc::now();
    let start = Instant::now();

    for epoch in 0..epochs {
        if spec.shuffle {
            train_indices.shuffle(rng);
        }

        let mut epoch_loss = 0.0;
        let mut batch_count = 0usize;
        for chunk in train_indices.chunks(effective_batch_size) {
            net.zero_grads();
            let mut batch_loss = 0.0;
            for &index in chunk {
                let (window, target) = data.sample(index);
                batch_loss += net.train_sample(window, target, rng);
            }
            let batch_loss = batch_loss / chunk.len() as f64;
            if !batch_loss.is_finite() {
                return Err(EngineError::Training(format!(
                    "non-finite loss in epoch {}",
                    epoch
                )));
            }

            let mut grads = net.gradients();
            let scale = 1.0 / chunk.len() as f64;
            for grad in grads.iter_mut() {
                *grad *= scale;
            }
            if let Some(max_norm) = spec.gradient_clip {
                clip_gradients(&mut grads, max_norm);
            }
            optimizer.step(net.parameters_mut(), &grads);

            epoch_loss += batch_loss;
            batch_count += 1;
        }

        let training_loss = epoch_loss / batch_count.max(1) as f64;
        let validation_loss = if validation_len > 0 {
            Some(validation_mse(net, data, train_len, sample_count))
        } else {
            None
        };

        history.push(EpochRecord {
            epoch_index: epoch,
            training_loss,
            validation_loss,
        });

        sink.on_epoch_end(&ProgressEvent {
            epoch_index: epoch,
            training_loss,
            validation_loss,
            elapsed_seconds: start.elapsed().as_secs_f64(),
            progress_percent: (epoch + 1) as f64 / epochs as f64 * 100.0,
            epochs_remaining: epochs - epoch - 1,
        });

        // Let the host scheduler run between epochs
        if (epoch + 1) % spec.yield_interval.max(1) == 0 {
            thread::yield_now();
        }
    }

    let total_elapsed_seconds = start.elapsed().as_secs_f64();
    sink.on_train_end(&TrainingCompleted {
        total_elapsed_seconds,
    });
    debug!(epochs, total_elapsed_seconds, "training run completed");

    Ok(TrainingOutcome {
        started_at,
        total_elapsed_seconds,
        epochs_run: epochs,
        effective_batch_size,
    })
}

fn validation_mse(net: &RecurrentNet, data: &Dataset, from: usize, to: usize) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for index in from..to {
        let (window, target) = data.sample(index);
        let forecast = net.forward(window);
        for (predicted, actual) in forecast.iter().zip(target.iter()) {
            sum += (predicted - actual) * (predicted - actual);
            count += 1;
        }
    }

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArchitectureVariant;
    use crate::progress::EventLog;
    use ndarray::{Array2, Array3};
    use rand::SeedableRng;

    fn tiny_dataset(samples: usize, window: usize, horizon: usize) -> Dataset {
        let inputs = Array3::from_shape_fn((samples, window, 1), |(i, t, _)| {
            ((i + t) as f64 * 0.07).sin()
        });
        let targets = Array2::from_shape_fn((samples, horizon), |(i, h)| {
            ((i + window + h) as f64 * 0.07).sin()
        });
        Dataset::new(inputs, targets).unwrap()
    }

    #[test]
    fn test_zero_epochs_clamped_to_one() {
        let config = ModelConfig::new(6, 1, ArchitectureVariant::Lightweight).unwrap();
        let spec = config.variant().spec();
        let mut net = RecurrentNet::new(&config);
        let data = tiny_dataset(8, 6, 1);
        let mut rng = StdRng::seed_from_u64(11);
        let mut log = EventLog::default();
        let mut history = Vec::new();

        let outcome = run_training(
            &mut net,
            &config,
            &spec,
            &data,
            0,
            &mut log,
            &mut rng,
            &mut history,
        )
        .unwrap();

        assert_eq!(outcome.epochs_run, 1);
        assert_eq!(history.len(), 1);
        assert!(log.completed.is_some());
    }

    #[test]
    fn test_progress_percent_strictly_increases() {
        let config = ModelConfig::new(6, 1, ArchitectureVariant::Lightweight).unwrap();
        let spec = config.variant().spec();
        let mut net = RecurrentNet::new(&config);
        let data = tiny_dataset(20, 6, 1);
        let mut rng = StdRng::seed_from_u64(11);
        let mut log = EventLog::default();
        let mut history = Vec::new();

        run_training(
            &mut net,
            &config,
            &spec,
            &data,
            4,
            &mut log,
            &mut rng,
            &mut history,
        )
        .unwrap();

        assert_eq!(log.epochs.len(), 4);
        for pair in log.epochs.windows(2) {
            assert!(pair[1].progress_percent > pair[0].progress_percent);
        }
        assert_eq!(log.epochs.last().unwrap().progress_percent, 100.0);
        assert_eq!(log.epochs.last().unwrap().epochs_remaining, 0);
    }

    #[test]
    fn test_validation_split_reported_for_larger_sets() {
        let config = ModelConfig::new(6, 1, ArchitectureVariant::Lightweight).unwrap();
        let spec = config.variant().spec();
        let mut net = RecurrentNet::new(&config);
        let data = tiny_dataset(30, 6, 1);
        let mut rng = StdRng::seed_from_u64(11);
        let mut log = EventLog::default();
        let mut history = Vec::new();

        run_training(
            &mut net,
            &config,
            &spec,
            &data,
            1,
            &mut log,
            &mut rng,
            &mut history,
        )
        .unwrap();

        assert!(history[0].validation_loss.is_some());
    }
}
