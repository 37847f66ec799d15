//! Cooperative progress reporting for training runs
//!
//! The training engine produces a finite sequence of [`ProgressEvent`]
//! values per call, one at the end of every epoch; the host consumes them
//! through a [`ProgressSink`] without blocking the engine's forward
//! progress. Cancellation is not part of the contract.

use serde::{Deserialize, Serialize};

/// Emitted at the end of every training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub epoch_index: usize,
    pub training_loss: f64,
    /// Absent when the dataset is too small for a validation split
    pub validation_loss: Option<f64>,
    pub elapsed_seconds: f64,
    /// Strictly increases across epochs, reaching 100 at the final epoch
    pub progress_percent: f64,
    /// Decreases to 0 at the final epoch
    pub epochs_remaining: usize,
}

/// Emitted once after a training run completes successfully
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingCompleted {
    pub total_elapsed_seconds: f64,
}

/// Per-epoch record kept in the model's training history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch_index: usize,
    pub training_loss: f64,
    pub validation_loss: Option<f64>,
}

/// Host-side consumer of training progress
pub trait ProgressSink {
    fn on_epoch_end(&mut self, _event: &ProgressEvent) {}

    fn on_train_end(&mut self, _completed: &TrainingCompleted) {}
}

/// Sink that discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl ProgressSink for SilentSink {}

/// Sink that records the full event sequence of one training call
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    pub epochs: Vec<ProgressEvent>,
    pub completed: Option<TrainingCompleted>,
}

impl ProgressSink for EventLog {
    fn on_epoch_end(&mut self, event: &ProgressEvent) {
        self.epochs.push(event.clone());
    }

    fn on_train_end(&mut self, completed: &TrainingCompleted) {
        self.completed = Some(completed.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_records_sequence() {
        let mut log = EventLog::default();
        log.on_epoch_end(&ProgressEvent {
            epoch_index: 0,
            training_loss: 0.5,
            validation_loss: None,
            elapsed_seconds: 0.1,
            progress_percent: 100.0,
            epochs_remaining: 0,
        });
        log.on_train_end(&TrainingCompleted {
            total_elapsed_seconds: 0.1,
        });

        assert_eq!(log.epochs.len(), 1);
        assert!(log.completed.is_some());
    }
}
