use forecast_rnn::{
    ArchitectureVariant, Dataset, EngineError, ForecastSession, ModelConfig, SilentSink,
    WindowedSample,
};
use ndarray::Array2;
use tempfile::tempdir;

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

fn trained_session(window: usize, horizon: usize) -> ForecastSession {
    let config = ModelConfig::new(window, horizon, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 9);
    let data = sine_dataset(30, window, horizon);
    session.train(Some(&data), 2, &mut SilentSink).unwrap();
    session
}

#[test]
fn test_predict_returns_horizon_values() {
    let mut session = trained_session(8, 3);
    let window = Array2::from_shape_fn((8, 1), |(t, _)| (t as f64 * 0.05).sin());

    let forecast = session.predict(Some(&window)).unwrap();

    assert_eq!(forecast.len(), 3);
    assert!(forecast.iter().all(|v| v.is_finite()));
}

#[test]
fn test_predict_without_window_is_rejected() {
    let mut session = trained_session(8, 3);
    let err = session.predict(None).unwrap_err();
    assert!(matches!(err, EngineError::MissingInput(_)));
}

#[test]
fn test_predict_rejects_wrong_window_shape() {
    let mut session = trained_session(8, 3);
    let window = Array2::zeros((5, 1));
    assert!(session.predict(Some(&window)).is_err());
}

#[test]
fn test_predict_builds_lazily() {
    let config = ModelConfig::new(8, 3, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 9);
    assert!(!session.is_built());

    let window = Array2::zeros((8, 1));
    let forecast = session.predict(Some(&window)).unwrap();

    assert!(session.is_built());
    assert_eq!(forecast.len(), 3);
}

#[test]
fn test_evaluate_untrained_returns_fallback() {
    let config = ModelConfig::new(8, 3, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 9);
    let data = sine_dataset(10, 8, 3);

    let report = session.evaluate(&data);

    assert!(report.is_fallback());
    assert_eq!(report.loss, 0.001);
    assert_eq!(report.mse, 0.001);
    assert_eq!(report.rmse, 0.032);
}

#[test]
fn test_evaluate_trained_returns_computed_metrics() {
    let mut session = trained_session(8, 3);
    let data = sine_dataset(10, 8, 3);

    let report = session.evaluate(&data);

    assert!(!report.is_fallback());
    assert!(report.mse >= 0.0);
    assert!((report.rmse - report.mse.sqrt()).abs() < 1e-12);
    assert_eq!(report.loss, report.mse);
}

#[test]
fn test_evaluate_shape_mismatch_falls_back() {
    let mut session = trained_session(8, 3);
    let wrong = sine_dataset(10, 12, 3);

    assert!(session.evaluate(&wrong).is_fallback());
}

#[test]
fn test_deep_evaluation_retains_predictions() {
    let config = ModelConfig::new(8, 1, ArchitectureVariant::Deep).unwrap();
    let mut session = ForecastSession::with_seed(config, 9);
    let data = sine_dataset(20, 8, 1);
    session.train(Some(&data), 1, &mut SilentSink).unwrap();

    assert!(session.last_evaluation().is_none());
    session.evaluate(&data);

    let retained = session.last_evaluation().unwrap();
    assert_eq!(retained.predictions.len(), 20);
    assert_eq!(retained.actuals.len(), 20);

    session.dispose();
    assert!(session.last_evaluation().is_none());
}

#[test]
fn test_lightweight_evaluation_retains_nothing() {
    let mut session = trained_session(8, 3);
    let data = sine_dataset(10, 8, 3);

    session.evaluate(&data);

    assert!(session.last_evaluation().is_none());
}

#[test]
fn test_save_weights_untrained_returns_false() {
    let config = ModelConfig::new(8, 3, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 9);
    session.build();

    let dir = tempdir().unwrap();
    assert!(!session.save_weights(dir.path().join("weights.json")));
}

#[test]
fn test_save_and_load_weights_round_trip() {
    let mut session = trained_session(8, 3);
    let dir = tempdir().unwrap();
    let path = dir.path().join("weights.json");

    assert!(session.save_weights(&path));

    let window = Array2::from_shape_fn((8, 1), |(t, _)| (t as f64 * 0.05).sin());
    let original = session.predict(Some(&window)).unwrap();

    let config = ModelConfig::new(8, 3, ArchitectureVariant::Lightweight).unwrap();
    let mut restored = ForecastSession::with_seed(config, 1);
    assert!(restored.load_weights(&path));
    assert!(restored.is_trained());

    let reloaded = restored.predict(Some(&window)).unwrap();
    assert_eq!(original, reloaded);
}

#[test]
fn test_load_weights_rejects_mismatched_shapes() {
    let mut session = trained_session(8, 3);
    let dir = tempdir().unwrap();
    let path = dir.path().join("weights.json");
    assert!(session.save_weights(&path));

    let config = ModelConfig::new(16, 3, ArchitectureVariant::Lightweight).unwrap();
    let mut other = ForecastSession::with_seed(config, 1);

    assert!(!other.load_weights(&path));
    assert!(!other.is_trained());
}

#[test]
fn test_load_weights_missing_file_returns_false() {
    let config = ModelConfig::new(8, 3, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 9);
    assert!(!session.load_weights("/nonexistent/weights.json"));
}

#[test]
fn test_dispose_is_idempotent() {
    let mut session = trained_session(8, 3);
    assert!(session.is_built());
    assert!(session.is_trained());

    session.dispose();
    assert!(!session.is_built());
    assert!(!session.is_trained());
    assert!(session.history().is_empty());
    assert!(session.arena().is_empty());

    // A second disposal is a no-op, never an error
    session.dispose();
    assert!(!session.is_built());
}

#[test]
fn test_dispose_never_built_is_a_noop() {
    let config = ModelConfig::new(8, 3, ArchitectureVariant::Lightweight).unwrap();
    let mut session = ForecastSession::with_seed(config, 9);
    session.dispose();
    assert!(!session.is_built());
}

#[test]
fn test_session_is_reusable_after_disposal() {
    let mut session = trained_session(8, 3);
    session.dispose();

    let data = sine_dataset(20, 8, 3);
    session.train(Some(&data), 1, &mut SilentSink).unwrap();
    assert!(session.is_trained());
}
