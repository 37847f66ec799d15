use forecast_rnn::{
    ArchitectureVariant, Dataset, EngineError, EventLog, ForecastSession, ModelConfig,
    ProgressSink, SilentSink, WindowedSample,
};
use ndarray::Array2;

fn sine_dataset(count: usize, window: usize, horizon: usize) -> Dataset {
    let samples: Vec<WindowedSample> = (0..count)
        .map(|i| WindowedSample {
            window: (0..window).map(|t| ((i + t) as f64 * 0.05).sin()).collect(),
            target: (0..horizon)
                .map(|h| ((i + window + h) as f64 * 0.05).sin())
                .collect(),
        })
        .collect();
    Dataset::from_samples(&samples, window, horizon).unwrap()
}

#[test]
fn test_training_populates_history() {
    let config = ModelConfig::new(8, 2, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 42);
    let data = sine_dataset(40, 8, 2);

    session.train(Some(&data), 5, &mut SilentSink).unwrap();

    assert!(session.is_trained());
    assert_eq!(session.history().len(), 5);
    for record in session.history() {
        assert!(record.training_loss.is_finite());
    }
}

#[test]
fn test_progress_events_follow_epoch_sequence() {
    let config = ModelConfig::new(8, 2, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 42);
    let data = sine_dataset(40, 8, 2);
    let mut log = EventLog::default();

    session.train(Some(&data), 4, &mut log).unwrap();

    assert_eq!(log.epochs.len(), 4);
    for (i, event) in log.epochs.iter().enumerate() {
        assert_eq!(event.epoch_index, i);
        assert_eq!(event.epochs_remaining, 4 - i - 1);
    }
    for pair in log.epochs.windows(2) {
        assert!(pair[1].progress_percent > pair[0].progress_percent);
    }
    assert_eq!(log.epochs.last().unwrap().progress_percent, 100.0);
    assert!(log.completed.is_some());
}

#[test]
fn test_missing_dataset_rejected_before_any_state_change() {
    let config = ModelConfig::new(8, 2, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 42);

    let err = session.train(None, 3, &mut SilentSink).unwrap_err();
    assert!(matches!(err, EngineError::MissingData(_)));
    assert!(!session.is_trained());
    assert!(!session.is_built());
    assert!(session.history().is_empty());
}

#[test]
fn test_empty_dataset_rejected() {
    let config = ModelConfig::new(8, 2, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 42);
    let data = sine_dataset(0, 8, 2);

    let err = session.train(Some(&data), 3, &mut SilentSink).unwrap_err();
    assert!(matches!(err, EngineError::EmptyDataset));
    assert!(!session.is_trained());
}

#[test]
fn test_shape_mismatch_rejected() {
    let config = ModelConfig::new(8, 2, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 42);
    let data = sine_dataset(10, 12, 2);

    let err = session.train(Some(&data), 3, &mut SilentSink).unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter(_)));
}

#[test]
fn test_deep_variant_trains_against_single_step_targets() {
    let config = ModelConfig::new(8, 5, ArchitectureVariant::Deep).unwrap();
    let mut session = ForecastSession::with_seed(config, 42);

    // Deep is single-step, so targets must have length 1, not the horizon
    let wrong = sine_dataset(10, 8, 5);
    assert!(session.train(Some(&wrong), 1, &mut SilentSink).is_err());

    let right = sine_dataset(10, 8, 1);
    session.train(Some(&right), 1, &mut SilentSink).unwrap();
    assert!(session.is_trained());
}

#[test]
fn test_failed_training_still_marks_model_trained() {
    let config = ModelConfig::new(8, 2, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 42);

    // A non-finite target poisons the first batch loss
    let mut samples: Vec<WindowedSample> = (0..20)
        .map(|i| WindowedSample {
            window: (0..8).map(|t| ((i + t) as f64 * 0.05).sin()).collect(),
            target: vec![0.1, 0.2],
        })
        .collect();
    samples[0].target[0] = f64::NAN;
    let data = Dataset::from_samples(&samples, 8, 2).unwrap();

    let err = session.train(Some(&data), 3, &mut SilentSink).unwrap_err();
    assert!(matches!(err, EngineError::Training(_)));

    // The model is kept and marked trained so downstream calls still work
    assert!(session.is_trained());
    let window = Array2::zeros((8, 1));
    let forecast = session.predict(Some(&window)).unwrap();
    assert_eq!(forecast.len(), 2);
    assert!(forecast.iter().all(|v| v.is_finite()));
}

#[test]
fn test_training_outcome_reports_clamped_values() {
    let config = ModelConfig::new(8, 2, ArchitectureVariant::Lightweight)
        .unwrap()
        .with_batch_size(64)
        .unwrap();
    let mut session = ForecastSession::with_seed(config, 42);
    let data = sine_dataset(10, 8, 2);

    session.train(Some(&data), 0, &mut SilentSink).unwrap();

    let outcome = session.last_training().unwrap();
    assert_eq!(outcome.epochs_run, 1);
    assert!(outcome.effective_batch_size <= 10);
}

#[test]
fn test_validation_loss_reported_for_larger_sets() {
    let config = ModelConfig::new(8, 2, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 42);
    let data = sine_dataset(30, 8, 2);
    let mut log = EventLog::default();

    session.train(Some(&data), 1, &mut log).unwrap();

    assert!(log.epochs[0].validation_loss.is_some());
}

struct CountingSink {
    epochs: usize,
    completions: usize,
}

impl ProgressSink for CountingSink {
    fn on_epoch_end(&mut self, _event: &forecast_rnn::ProgressEvent) {
        self.epochs += 1;
    }

    fn on_train_end(&mut self, _completed: &forecast_rnn::TrainingCompleted) {
        self.completions += 1;
    }
}

#[test]
fn test_custom_sink_receives_all_events() {
    let config = ModelConfig::new(8, 2, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 42);
    let data = sine_dataset(20, 8, 2);
    let mut sink = CountingSink {
        epochs: 0,
        completions: 0,
    };

    session.train(Some(&data), 3, &mut sink).unwrap();

    assert_eq!(sink.epochs, 3);
    assert_eq!(sink.completions, 1);
}
