use climcast::{tensor::Tensor, Error};

#[test]
fn test_tensor_iterator() {
    let data = (0..24).map(|x| x as f32).collect::<Vec<_>>();
    let t = Tensor::new(&[2, 3, 4], &data).unwrap();
    for (x, y) in t.into_iter().zip(&data) {
        assert_eq!(x, *y);
    }
    assert_eq!(t.len(), 24);
    assert!(Tensor::new(&[2, 3], &data).is_err());
}

#[test]
fn test_tensor_broadcast_ops() {
    let t = Tensor::new(&[2, 2, 2], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
    let channels = Tensor::new(&[2], &[1.0, 2.0]).unwrap();
    assert_eq!(
        t.sub(&channels).unwrap().ravel(),
        vec![0.0, 0.0, 2.0, 2.0, 4.0, 4.0, 6.0, 6.0]
    );
    assert_eq!(
        t.div(&channels).unwrap().ravel(),
        vec![1.0, 1.0, 3.0, 2.0, 5.0, 3.0, 7.0, 4.0]
    );
    let scaled = t.mul(&Tensor::scalar(0.5)).unwrap();
    assert_eq!(scaled.shape(), &[2, 2, 2]);
    assert_eq!(scaled.ravel()[7], 4.0);

    let wrong = Tensor::new(&[3], &[1.0, 2.0, 3.0]).unwrap();
    assert!(matches!(t.add(&wrong), Err(Error::IncompatibleShapes(..))));
}

#[test]
fn test_tensor_reductions() {
    let t = Tensor::new(&[2, 2, 2], &[1.0, -2.0, 3.0, -4.0, 5.0, -6.0, 7.0, -8.0]).unwrap();
    let sum = t.sum(&[0, 1]).unwrap();
    assert_eq!(sum.shape(), &[1, 1, 2]);
    assert_eq!(sum.ravel(), vec![16.0, -20.0]);
    let mae = t.abs().mean(&[0, 1]).unwrap();
    assert_eq!(mae.ravel(), vec![4.0, 5.0]);
    assert!(matches!(t.sum(&[3]), Err(Error::UnknownAxis(3))));
}

#[test]
fn test_tensor_reshape() {
    let t = Tensor::new(&[4, 3], &[0.0; 12]).unwrap();
    let r = t.reshape(&[2, 3, 2]).unwrap();
    assert_eq!(r.shape(), &[2, 3, 2]);
    assert!(t.reshape(&[5, 2]).is_err());
    assert_eq!(Tensor::zeros(&[3, 2]), Tensor::new(&[3, 2], &[0.0; 6]).unwrap());
}
