// Tests for backward propagation: pooling gradient routing (including tie
// duplication), convolution kernel-gradient accumulation and its SGD update,
// and the classifier head's parameter updates against hand-computed
// cross-entropy gradients.

use approx::assert_relative_eq;

use cnn_engine::error::TensorError;
use cnn_engine::layers::{ConvolutionLayer, MaxPoolingLayer, SoftMaxLayer};
use cnn_engine::tensor::Tensor;

#[test]
fn test_max_pooling_backward_routes_to_maximum() {
    let mut layer = MaxPoolingLayer::new(2);
    let image = Tensor::from_vec3(vec![
        vec![vec![1.0], vec![3.0], vec![2.0], vec![4.0]],
        vec![vec![5.0], vec![6.0], vec![8.0], vec![7.0]],
        vec![vec![4.0], vec![2.0], vec![1.0], vec![0.0]],
        vec![vec![9.0], vec![1.0], vec![3.0], vec![5.0]],
    ])
    .unwrap();
    let (_output, ctx) = layer.forward(&image).unwrap();

    // Gradient 1 at the first pooled cell only.
    let gradient = Tensor::from_flat(vec![1.0, 0.0, 0.0, 0.0], &[2, 2, 1]).unwrap();

    let routed = layer.backward(&ctx, &gradient).unwrap();
    assert_eq!(routed.shape(), &[4, 4, 1]);

    // Window (0, 0) attains its maximum 6.0 at input cell (1, 1); every
    // other cell stays zero.
    for i in 0..4 {
        for j in 0..4 {
            let expected = if (i, j) == (1, 1) { 1.0 } else { 0.0 };
            assert_eq!(routed.get(&[i, j, 0]), Some(expected));
        }
    }
}

#[test]
fn test_max_pooling_backward_duplicates_on_ties() {
    let mut layer = MaxPoolingLayer::new(2);
    // Both 7.0 cells tie for the window maximum.
    let image = Tensor::from_vec3(vec![
        vec![vec![7.0], vec![1.0]],
        vec![vec![2.0], vec![7.0]],
    ])
    .unwrap();
    let (_output, ctx) = layer.forward(&image).unwrap();

    let gradient = Tensor::from_flat(vec![3.5], &[1, 1, 1]).unwrap();
    let routed = layer.backward(&ctx, &gradient).unwrap();

    // Every tied cell receives the full upstream value, duplicated.
    assert_eq!(routed.get(&[0, 0, 0]), Some(3.5));
    assert_eq!(routed.get(&[1, 1, 0]), Some(3.5));
    assert_eq!(routed.get(&[0, 1, 0]), Some(0.0));
    assert_eq!(routed.get(&[1, 0, 0]), Some(0.0));
}

#[test]
fn test_max_pooling_backward_shape_check() {
    let mut layer = MaxPoolingLayer::new(2);
    let image = Tensor::zeros(&[4, 4, 1]);
    let (_output, ctx) = layer.forward(&image).unwrap();

    let wrong = Tensor::zeros(&[3, 3, 1]);
    assert!(matches!(
        layer.backward(&ctx, &wrong),
        Err(TensorError::ShapeMismatch(_))
    ));
}

#[test]
fn test_convolution_backward_accumulates_kernel_gradient() {
    // Zero kernels isolate the update: afterwards the kernels hold exactly
    // -alpha * gradient.
    let kernels = Tensor::zeros(&[1, 2, 2]);
    let mut layer = ConvolutionLayer::from_kernels(kernels).unwrap();
    let image = Tensor::from_vec2(vec![
        vec![1.0, 2.0, 3.0],
        vec![4.0, 5.0, 6.0],
        vec![7.0, 8.0, 9.0],
    ])
    .unwrap();
    let (_output, ctx) = layer.forward(&image).unwrap();

    let gradient = Tensor::from_flat(vec![1.0; 4], &[2, 2, 1]).unwrap();
    let alpha = 0.1;
    let kernel_gradient = layer.backward(&ctx, &gradient, alpha).unwrap();

    // With an all-ones upstream gradient, each kernel cell accumulates the
    // sum of the image values it slid over.
    assert_eq!(kernel_gradient.shape(), &[1, 2, 2]);
    assert_eq!(kernel_gradient.get(&[0, 0, 0]), Some(12.0));
    assert_eq!(kernel_gradient.get(&[0, 0, 1]), Some(16.0));
    assert_eq!(kernel_gradient.get(&[0, 1, 0]), Some(24.0));
    assert_eq!(kernel_gradient.get(&[0, 1, 1]), Some(28.0));

    // kernels <- kernels - alpha * gradient.
    assert_relative_eq!(layer.kernels().get(&[0, 0, 0]).unwrap(), -1.2, epsilon = 1e-12);
    assert_relative_eq!(layer.kernels().get(&[0, 0, 1]).unwrap(), -1.6, epsilon = 1e-12);
    assert_relative_eq!(layer.kernels().get(&[0, 1, 0]).unwrap(), -2.4, epsilon = 1e-12);
    assert_relative_eq!(layer.kernels().get(&[0, 1, 1]).unwrap(), -2.8, epsilon = 1e-12);
}

#[test]
fn test_convolution_backward_weights_gradient_by_upstream() {
    let kernels = Tensor::zeros(&[1, 2, 2]);
    let mut layer = ConvolutionLayer::from_kernels(kernels).unwrap();
    let image = Tensor::from_vec2(vec![
        vec![1.0, 2.0, 3.0],
        vec![4.0, 5.0, 6.0],
        vec![7.0, 8.0, 9.0],
    ])
    .unwrap();
    let (_output, ctx) = layer.forward(&image).unwrap();

    // Upstream gradient only at offset (0, 0): the kernel gradient is that
    // patch alone.
    let gradient = Tensor::from_flat(vec![2.0, 0.0, 0.0, 0.0], &[2, 2, 1]).unwrap();
    let kernel_gradient = layer.backward(&ctx, &gradient, 0.0).unwrap();

    assert_eq!(kernel_gradient.get(&[0, 0, 0]), Some(2.0));
    assert_eq!(kernel_gradient.get(&[0, 0, 1]), Some(4.0));
    assert_eq!(kernel_gradient.get(&[0, 1, 0]), Some(8.0));
    assert_eq!(kernel_gradient.get(&[0, 1, 1]), Some(10.0));
}

#[test]
fn test_convolution_backward_shape_check() {
    let kernels = Tensor::zeros(&[1, 2, 2]);
    let mut layer = ConvolutionLayer::from_kernels(kernels).unwrap();
    let image = Tensor::zeros(&[3, 3]);
    let (_output, ctx) = layer.forward(&image).unwrap();

    let wrong = Tensor::zeros(&[3, 3, 1]);
    assert!(matches!(
        layer.backward(&ctx, &wrong, 0.05),
        Err(TensorError::ShapeMismatch(_))
    ));
}

#[test]
fn test_softmax_backward_parameter_updates() {
    // Zero weights and bias give uniform probabilities 0.1, so the
    // cross-entropy gradients are exact: p - onehot for the bias, and
    // flattened_input x (p - onehot) for the weights.
    let input_units = 13 * 13 * 16;
    let output_units = 10;
    let weight = Tensor::zeros(&[input_units, output_units]);
    let bias = Tensor::zeros(&[output_units]);
    let mut head = SoftMaxLayer::from_parameters(weight, bias).unwrap();

    let volume = Tensor::from_flat(vec![0.5; input_units], &[13, 13, 16]).unwrap();
    let (probabilities, ctx) = head.forward(&volume).unwrap();
    assert_relative_eq!(probabilities.data()[3], 0.1, epsilon = 1e-12);

    let label = 3;
    let alpha = 0.05;
    let upstream = -1.0 / probabilities.data()[label];
    let input_gradient = head.backward(&ctx, label, upstream, alpha).unwrap();

    // The input gradient comes back reshaped to the fixed 13x13x16 volume,
    // and with zero (pre-update) weights it is identically zero.
    assert_eq!(input_gradient.shape(), &[13, 13, 16]);
    assert!(input_gradient.data().iter().all(|&g| g == 0.0));

    // bias <- bias - alpha * (p - onehot).
    for j in 0..output_units {
        let expected = if j == label { -0.05 * (0.1 - 1.0) } else { -0.05 * 0.1 };
        assert_relative_eq!(head.bias().data()[j], expected, epsilon = 1e-12);
    }

    // weight <- weight - alpha * input * (p - onehot), uniform over rows
    // because every input is 0.5.
    for j in 0..output_units {
        let expected = if j == label {
            -0.05 * 0.5 * (0.1 - 1.0)
        } else {
            -0.05 * 0.5 * 0.1
        };
        assert_relative_eq!(head.weight().get(&[0, j]).unwrap(), expected, epsilon = 1e-12);
        assert_relative_eq!(
            head.weight().get(&[input_units - 1, j]).unwrap(),
            expected,
            epsilon = 1e-12
        );
    }
}

#[test]
fn test_softmax_backward_requires_reference_volume() {
    // The head reshapes its input gradient to the fixed 13x13x16 volume, so
    // a smaller head fails during backward even though forward succeeds.
    let weight = Tensor::zeros(&[4, 2]);
    let bias = Tensor::zeros(&[2]);
    let mut head = SoftMaxLayer::from_parameters(weight, bias).unwrap();

    let volume = Tensor::zeros(&[2, 2]);
    let (probabilities, ctx) = head.forward(&volume).unwrap();
    let upstream = -1.0 / probabilities.data()[0];
    assert!(matches!(
        head.backward(&ctx, 0, upstream, 0.05),
        Err(TensorError::ShapeMismatch(_))
    ));
}

#[test]
fn test_softmax_backward_input_gradient_uses_pre_update_weights() {
    // Identity-ish weights with two units: the returned input gradient must
    // be W_old * scaled_jacobian, so the deliberate weight update that
    // follows does not leak into it. input_units must still be 2704 for the
    // final reshape, so embed the interesting values in the first two rows.
    let input_units = 13 * 13 * 16;
    let output_units = 2;
    let mut weight_rows = vec![vec![0.0, 0.0]; input_units];
    weight_rows[0] = vec![1.0, 0.0];
    weight_rows[1] = vec![0.0, 1.0];
    let weight = Tensor::from_vec2(weight_rows).unwrap();
    let bias = Tensor::vector(vec![0.0, 0.0]);
    let mut head = SoftMaxLayer::from_parameters(weight, bias).unwrap();

    // Only the first flattened input is lit, so the logits are [1, 0].
    let mut values = vec![0.0; input_units];
    values[0] = 1.0;
    let volume = Tensor::from_flat(values, &[13, 13, 16]).unwrap();
    let (probabilities, ctx) = head.forward(&volume).unwrap();
    let p1 = 1.0 / (1.0 + 1.0f64.exp());
    assert_relative_eq!(probabilities.data()[1], p1, epsilon = 1e-12);

    let label = 0;
    let upstream = -1.0 / probabilities.data()[label];
    let input_gradient = head.backward(&ctx, label, upstream, 0.05).unwrap();

    // scaled jacobian = p - onehot = [-p1, p1]; the first two flattened
    // entries of the input gradient pick out the identity rows of the
    // weights as they were before the update.
    let flat = input_gradient.flatten();
    assert_relative_eq!(flat.data()[0], -p1, epsilon = 1e-12);
    assert_relative_eq!(flat.data()[1], p1, epsilon = 1e-12);
    assert!(flat.data()[2..].iter().all(|&g| g == 0.0));

    // The update really happened, after the input gradient was taken.
    assert_relative_eq!(
        head.weight().get(&[0, 0]).unwrap(),
        1.0 + 0.05 * p1,
        epsilon = 1e-12
    );
}
