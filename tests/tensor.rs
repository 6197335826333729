use densenet_lstm::{Error, Tensor};

#[test]
fn test_tensor_creation_nchw() {
    let vec: Vec<f32> = (0..2 * 3 * 4 * 4).map(|i| i as f32).collect();
    let tensor = Tensor::from_vec(vec.clone(), &[2, 3, 4, 4]).expect("Failed to create tensor");

    assert_eq!(tensor.shape(), &[2, 3, 4, 4]);
    assert_eq!(tensor.ndim(), 4);
    assert_eq!(tensor.to_vec(), vec);
}

#[test]
fn test_tensor_shape_mismatch() {
    let result = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]);

    assert!(
        result.is_err(),
        "Should fail when shape doesn't match vector length"
    );
}

#[test]
fn test_hidden_seed_zeros() {
    let tensor = Tensor::zeros(&[4, 8, 1]);

    assert_eq!(tensor.len(), 32);
    assert!(tensor.to_vec().iter().all(|&x| x == 0.0), "All values should be zero");
}

#[test]
fn test_pooled_features_to_sequence() {
    let pooled = Tensor::from_vec((0..12).map(|i| i as f32).collect(), &[4, 3, 1, 1])
        .expect("Failed to create tensor");

    let sequence = pooled.reshape(&[1, 4, 3]).expect("Reshape failed");

    assert_eq!(sequence.shape(), &[1, 4, 3]);
    assert_eq!(sequence.to_vec(), pooled.to_vec());
}

#[test]
fn test_tensor_reshape_invalid() {
    let tensor = Tensor::zeros(&[2, 3, 1, 1]);

    assert!(matches!(
        tensor.reshape(&[1, 2, 4]),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_channel_concat_keeps_input_first() {
    let input = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[1, 1, 2, 2]).unwrap();
    let delta = Tensor::from_vec(vec![5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[1, 2, 2, 2])
        .unwrap();

    let joined = Tensor::concat(&[&input, &delta], 1).expect("Concat failed");

    assert_eq!(joined.shape(), &[1, 3, 2, 2]);
    assert_eq!(joined.to_vec(), (1..=12).map(|i| i as f32).collect::<Vec<_>>());
}

#[test]
fn test_channel_concat_rejects_spatial_mismatch() {
    let a = Tensor::zeros(&[1, 2, 4, 4]);
    let b = Tensor::zeros(&[1, 2, 2, 2]);

    assert!(Tensor::concat(&[&a, &b], 1).is_err());
    assert!(Tensor::concat(&[], 1).is_err());
}

#[test]
fn test_squeeze_sequence_axis() {
    let tensor = Tensor::zeros(&[1, 5, 7]);

    let squeezed = tensor.clone().squeeze_axis(0).expect("Squeeze failed");
    assert_eq!(squeezed.shape(), &[5, 7]);

    assert!(tensor.squeeze_axis(1).is_err());
}

#[test]
fn test_tensor_empty() {
    let tensor = Tensor::from_vec(vec![], &[0, 3, 1, 1]).expect("Failed to create tensor");

    assert_eq!(tensor.len(), 0);
    assert!(tensor.is_empty());
}
