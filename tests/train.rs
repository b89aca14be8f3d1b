use climcast::{
    autodiff::Tape,
    config::ForecastConfig,
    model::Forecaster,
    normalize::Statistics,
    optim::OptimizerKind,
    series::Series,
    train::Trainer,
    window::WindowGenerator,
};
use rand::{rngs::StdRng, SeedableRng};

fn waves(steps: usize) -> Series {
    let rows: Vec<[f32; 2]> = (0..steps)
        .map(|t| {
            let t = t as f32 * 0.3;
            [t.sin(), 0.5 * t.cos()]
        })
        .collect();
    Series::from_rows(&rows).unwrap()
}

fn config() -> ForecastConfig {
    ForecastConfig {
        input_width: 4,
        output_width: 2,
        batch_size: 8,
        shuffle_buffer: 10,
        epochs: 12,
        learning_rate: 0.01,
        alpha: 0.0625,
        ..ForecastConfig::default()
    }
}

#[test]
fn test_training_lowers_loss() {
    let config = config();
    config.validate().unwrap();
    let series = waves(200);
    let splits = series.split(config.split_ratios()).unwrap();
    let statistics = Statistics::fit(&splits.train).unwrap();
    let generator = WindowGenerator::new(
        config.window_shape(),
        config.batch_size,
        config.shuffle_buffer,
        config.seed,
        statistics,
    )
    .unwrap();
    let mut train = generator.make_dataset(&splits.train, true).unwrap();
    let mut validation = generator.make_dataset(&splits.validation, false).unwrap();
    let mut test = generator.make_dataset(&splits.test, false).unwrap();

    let tape = Tape::default();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let forecaster = Forecaster::new(
        config.window_shape(),
        2,
        config.hidden_width(),
        &mut rng,
    )
    .unwrap();
    let optimizer = config.optimizer.build(config.learning_rate);
    let mut trainer = Trainer::new(&tape, forecaster, optimizer);

    let before = trainer.evaluate(&mut test).unwrap();
    let reports = trainer.fit(&mut train, &mut validation, config.epochs).unwrap();
    assert_eq!(reports.len(), config.epochs);
    assert_eq!(reports[0].epoch, 1);
    let first = &reports[0];
    let last = &reports[reports.len() - 1];
    assert!(last.loss < first.loss, "{} >= {}", last.loss, first.loss);
    assert!(last.validation.loss < first.validation.loss);
    assert_eq!(last.validation.mae.len(), 2);

    let after = trainer.evaluate(&mut test).unwrap();
    assert!(after.loss < before.loss);
    assert!(tape.is_empty());
}

#[test]
fn test_sgd_and_empty_splits() {
    let config = ForecastConfig {
        optimizer: OptimizerKind::Sgd,
        epochs: 2,
        ..config()
    };
    let series = waves(40);
    let statistics = Statistics::fit(&series).unwrap();
    let generator = WindowGenerator::new(config.window_shape(), 8, 10, 3, statistics).unwrap();
    let mut train = generator.make_dataset(&series, true).unwrap();
    // Shorter than one window, so every pass is empty.
    let mut validation = generator.make_dataset(&series.slice(0..3), false).unwrap();

    let tape = Tape::default();
    let mut rng = StdRng::seed_from_u64(3);
    let forecaster = Forecaster::new(config.window_shape(), 2, 4, &mut rng).unwrap();
    let mut trainer = Trainer::new(&tape, forecaster, config.optimizer.build(0.05));
    let reports = trainer.fit(&mut train, &mut validation, config.epochs).unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.loss.is_finite()));
    assert_eq!(reports[1].validation.loss, 0.0);
    assert_eq!(reports[1].validation.mae, vec![0.0, 0.0]);
    assert_eq!(trainer.into_forecaster().parameter_count(), 4 * 9 + 4 * 5 + 4 * 5);
}
