use approx::assert_abs_diff_eq;
use climcast::{
    autodiff::Tape,
    export::{self, ExportedModel, FORMAT_VERSION},
    model::{Activation, Forecaster},
    normalize::Statistics,
    tensor::Tensor,
    window::WindowShape,
    Error,
};
use rand::{rngs::StdRng, SeedableRng};

const SHAPE: WindowShape = WindowShape {
    input_width: 3,
    output_width: 2,
};

fn forecaster<'a>() -> Forecaster<'a> {
    let mut rng = StdRng::seed_from_u64(7);
    Forecaster::new(SHAPE, 2, 5, &mut rng).unwrap()
}

fn statistics() -> Statistics {
    Statistics::from_parts(vec![9.5, 71.25], vec![3.0, 12.5]).unwrap()
}

#[test]
fn test_export_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.zlib");
    let original = forecaster();
    let size = export::export(&path, &original, &statistics()).unwrap();
    assert_eq!(size, std::fs::metadata(&path).unwrap().len());

    let model = export::load(&path).unwrap();
    assert_eq!(model.version, FORMAT_VERSION);
    assert_eq!(model.shape(), SHAPE);
    assert_eq!(model.channels, 2);
    assert_eq!(model.statistics, statistics());

    let restored = model.forecaster().unwrap();
    assert_eq!(restored.parameter_count(), original.parameter_count());
    for (a, b) in original.layers().iter().zip(restored.layers()) {
        assert_eq!(a.activation(), b.activation());
        let pairs = a
            .weights()
            .into_iter()
            .zip(b.weights())
            .chain(a.biases().into_iter().zip(b.biases()));
        for (x, y) in pairs {
            assert_abs_diff_eq!(x, y, epsilon = x.abs() * 1e-3 + 1e-7);
        }
    }
    assert_eq!(restored.layers()[0].activation(), Activation::Relu);
    assert_eq!(restored.layers()[2].activation(), Activation::Identity);
}

#[test]
fn test_restored_predictions_are_close() {
    let tape = Tape::default();
    let mut original = forecaster();
    let model = ExportedModel::new(&original, &statistics());
    let mut buffer = Vec::new();
    let size = model.write(&mut buffer).unwrap();
    assert_eq!(size as usize, buffer.len());
    let mut restored = ExportedModel::read(&buffer[..]).unwrap().forecaster().unwrap();

    let inputs: Vec<f32> = (0..12).map(|i| (i as f32 - 6.0) / 4.0).collect();
    let inputs = Tensor::new(&[2, 3, 2], &inputs).unwrap();
    let expected = original.predict(&tape, &inputs).unwrap();
    let actual = restored.predict(&tape, &inputs).unwrap();
    assert_eq!(actual.shape(), &[2, 2, 2]);
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(a, e, epsilon = 1e-2);
    }
}

#[test]
fn test_compression_pays_off() {
    let mut rng = StdRng::seed_from_u64(1);
    let big = Forecaster::new(SHAPE, 2, 40, &mut rng).unwrap();
    let model = ExportedModel::new(&big, &statistics());
    let json = serde_json::to_vec(&model).unwrap();
    let size = model.write(std::io::sink()).unwrap();
    assert!((size as usize) < json.len());
}

#[test]
fn test_rejects_other_versions() {
    let mut model = ExportedModel::new(&forecaster(), &statistics());
    model.version = FORMAT_VERSION + 1;
    let mut buffer = Vec::new();
    model.write(&mut buffer).unwrap();
    assert!(matches!(
        ExportedModel::read(&buffer[..]),
        Err(Error::ModelFormat(_))
    ));
}

#[test]
fn test_rejects_inconsistent_layers() {
    let mut model = ExportedModel::new(&forecaster(), &statistics());
    model.layers[1].weights.pop();
    assert!(model.forecaster().is_err());

    let mut model = ExportedModel::new(&forecaster(), &statistics());
    model.channels = 3;
    assert!(model.forecaster().is_err());
}
