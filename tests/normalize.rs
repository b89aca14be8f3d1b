use approx::assert_relative_eq;
use climcast::{
    normalize::{Statistics, EPSILON},
    series::Series,
    tensor::Tensor,
    Error,
};

#[test]
fn test_fit_statistics() {
    let series = Series::from_rows(&[[1.0_f32, 10.0], [3.0, 10.0], [5.0, 10.0], [7.0, 10.0]]).unwrap();
    let statistics = Statistics::fit(&series).unwrap();
    assert_eq!(statistics.channels(), 2);
    assert_relative_eq!(statistics.mean()[0], 4.0);
    assert_relative_eq!(statistics.mean()[1], 10.0);
    // Population standard deviation: sqrt((9 + 1 + 1 + 9) / 4).
    assert_relative_eq!(statistics.std()[0], 5f32.sqrt(), epsilon = 1e-6);
    assert_eq!(statistics.std()[1], 0.0);
}

#[test]
fn test_fit_empty_series() {
    let series = Series::new(2, Vec::new()).unwrap();
    assert!(Statistics::fit(&series).is_err());
}

#[test]
fn test_constant_channel_stays_finite() {
    let statistics = Statistics::from_parts(vec![10.0], vec![0.0]).unwrap();
    let t = Tensor::new(&[3, 1], &[10.0, 10.0, 10.0]).unwrap();
    let normalized = statistics.normalize(&t).unwrap();
    assert!(normalized.iter().all(|x| x == 0.0));

    let t = Tensor::new(&[1, 1], &[10.5]).unwrap();
    let normalized = statistics.normalize(&t).unwrap();
    assert_relative_eq!(normalized.ravel()[0], 0.5 / EPSILON, max_relative = 1e-3);
}

#[test]
fn test_normalize_round_trip() {
    let rows: Vec<[f32; 2]> = (0..50)
        .map(|t| {
            let t = t as f32;
            [10.0 + (t * 0.3).sin() * 8.0, 60.0 + t * 0.5]
        })
        .collect();
    let series = Series::from_rows(&rows).unwrap();
    let statistics = Statistics::fit(&series).unwrap();

    let t = Tensor::new(&[5, 10, 2], series.rows(0..50)).unwrap();
    let normalized = statistics.normalize(&t).unwrap();
    let mean = normalized.mean(&[0, 1]).unwrap().ravel();
    assert_relative_eq!(mean[0], 0.0, epsilon = 1e-4);
    assert_relative_eq!(mean[1], 0.0, epsilon = 1e-4);

    let restored = statistics.denormalize(&normalized).unwrap();
    for (a, b) in restored.iter().zip(t.iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-4, max_relative = 1e-5);
    }
}

#[test]
fn test_channel_mismatch() {
    let statistics = Statistics::from_parts(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
    let t = Tensor::new(&[2, 3], &[0.0; 6]).unwrap();
    assert!(matches!(
        statistics.normalize(&t),
        Err(Error::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
    assert!(Statistics::from_parts(vec![0.0], vec![1.0, 1.0]).is_err());
}
