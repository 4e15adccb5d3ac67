// Tests for forward propagation: convolution against hand-computed patch
// sums, max pooling, softmax probability validity, and a full-network
// regression fixture with fixed parameters.

use approx::assert_relative_eq;

use cnn_engine::layers::{ConvolutionLayer, Layer, MaxPoolingLayer, SoftMaxLayer};
use cnn_engine::network::forward_pass;
use cnn_engine::tensor::Tensor;

fn ones_kernel_layer() -> ConvolutionLayer {
    let kernels = Tensor::from_vec3(vec![vec![vec![1.0, 1.0], vec![1.0, 1.0]]]).unwrap();
    ConvolutionLayer::from_kernels(kernels).unwrap()
}

#[test]
fn test_convolution_all_ones_kernel_sums_patches() {
    let mut layer = ones_kernel_layer();
    let image = Tensor::from_vec2(vec![
        vec![1.0, 2.0, 3.0],
        vec![4.0, 5.0, 6.0],
        vec![7.0, 8.0, 9.0],
    ])
    .unwrap();

    let (output, _ctx) = layer.forward(&image).unwrap();
    assert_eq!(output.shape(), &[2, 2, 1]);

    // Each cell is the sum of the 2x2 patch under it.
    assert_eq!(output.get(&[0, 0, 0]), Some(12.0));
    assert_eq!(output.get(&[0, 1, 0]), Some(16.0));
    assert_eq!(output.get(&[1, 0, 0]), Some(24.0));
    assert_eq!(output.get(&[1, 1, 0]), Some(28.0));

    // The forward output is cached for visualization consumers.
    assert_eq!(layer.last_output().unwrap(), &output);
}

#[test]
fn test_convolution_multiple_kernels() {
    let kernels = Tensor::from_vec3(vec![
        vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        vec![vec![1.0, 0.0], vec![0.0, 1.0]],
    ])
    .unwrap();
    let mut layer = ConvolutionLayer::from_kernels(kernels).unwrap();
    let image = Tensor::from_vec2(vec![
        vec![1.0, 2.0, 3.0],
        vec![4.0, 5.0, 6.0],
        vec![7.0, 8.0, 9.0],
    ])
    .unwrap();

    let (output, _ctx) = layer.forward(&image).unwrap();
    assert_eq!(output.shape(), &[2, 2, 2]);

    // Kernel 0 sums the whole patch, kernel 1 sums the diagonal.
    assert_eq!(output.get(&[0, 0, 0]), Some(12.0));
    assert_eq!(output.get(&[0, 0, 1]), Some(6.0));
    assert_eq!(output.get(&[1, 1, 0]), Some(28.0));
    assert_eq!(output.get(&[1, 1, 1]), Some(14.0));
}

#[test]
fn test_max_pooling_forward() {
    let mut layer = MaxPoolingLayer::new(2);
    let image = Tensor::from_vec3(vec![
        vec![vec![1.0], vec![3.0], vec![2.0], vec![4.0]],
        vec![vec![5.0], vec![6.0], vec![8.0], vec![7.0]],
        vec![vec![4.0], vec![2.0], vec![1.0], vec![0.0]],
        vec![vec![9.0], vec![1.0], vec![3.0], vec![5.0]],
    ])
    .unwrap();

    let (output, _ctx) = layer.forward(&image).unwrap();
    assert_eq!(output.shape(), &[2, 2, 1]);
    assert_eq!(output.get(&[0, 0, 0]), Some(6.0));
    assert_eq!(output.get(&[0, 1, 0]), Some(8.0));
    assert_eq!(output.get(&[1, 0, 0]), Some(9.0));
    assert_eq!(output.get(&[1, 1, 0]), Some(5.0));

    assert_eq!(layer.last_output().unwrap(), &output);
}

#[test]
fn test_max_pooling_drops_partial_windows() {
    let mut layer = MaxPoolingLayer::new(2);
    // 5x5 input: the trailing row and column never reach the output.
    let image = Tensor::from_flat((0..25).map(|v| v as f64).collect(), &[5, 5, 1]).unwrap();
    let (output, _ctx) = layer.forward(&image).unwrap();
    assert_eq!(output.shape(), &[2, 2, 1]);
    assert_eq!(output.get(&[1, 1, 0]), Some(18.0));
}

#[test]
fn test_softmax_output_is_probability_distribution() {
    let weight = Tensor::from_vec2(vec![
        vec![0.5, -0.25, 1.0],
        vec![-1.0, 0.75, 0.1],
        vec![0.3, 0.3, -0.6],
        vec![2.0, -1.5, 0.0],
    ])
    .unwrap();
    let bias = Tensor::vector(vec![0.1, -0.2, 0.3]);
    let mut head = SoftMaxLayer::from_parameters(weight, bias).unwrap();

    let volume = Tensor::from_vec2(vec![vec![0.6, -1.2], vec![2.5, 0.0]]).unwrap();
    let (probabilities, _ctx) = head.forward(&volume).unwrap();

    assert_eq!(probabilities.shape(), &[3]);
    assert!(probabilities.data().iter().all(|&p| p > 0.0));
    assert_relative_eq!(probabilities.sum_all(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_softmax_linear_computation() {
    // flattened input [1, 2], identity weight, zero bias: the logits are the
    // inputs themselves.
    let weight = Tensor::from_vec2(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    let bias = Tensor::vector(vec![0.0, 0.0]);
    let mut head = SoftMaxLayer::from_parameters(weight, bias).unwrap();

    let volume = Tensor::vector(vec![1.0, 2.0]);
    let (probabilities, _ctx) = head.forward(&volume).unwrap();

    let e1 = 1.0f64.exp();
    let e2 = 2.0f64.exp();
    assert_relative_eq!(probabilities.data()[0], e1 / (e1 + e2), epsilon = 1e-12);
    assert_relative_eq!(probabilities.data()[1], e2 / (e1 + e2), epsilon = 1e-12);
}

#[test]
fn test_softmax_highlight_side_channel() {
    let weight = Tensor::zeros(&[30, 2]);
    let bias = Tensor::zeros(&[2]);
    let mut head = SoftMaxLayer::from_parameters(weight, bias).unwrap();

    let values: Vec<f64> = (0..30).map(|v| v as f64).collect();
    let volume = Tensor::from_flat(values, &[5, 3, 2]).unwrap();
    let (_probabilities, _ctx) = head.forward(&volume).unwrap();

    let highlights = head.highlight_indices().unwrap();
    assert_eq!(highlights.len(), 25);
    // Largest flattened value sits at the last index.
    assert_eq!(highlights[0], 29);
    assert_eq!(head.flattened_input().unwrap().len(), 30);
}

#[test]
fn test_full_network_regression_fixture() {
    // 4x4 image of full-intensity pixels; forward normalization brings every
    // pixel to 1.0, the all-ones 2x2 kernel turns each patch into 4.0, a 3x3
    // pooling window reduces the 3x3x1 volume to a single 4.0, and the fixed
    // head yields logits [4.1, 1.9].
    let image = Tensor::from_flat(vec![255.0; 16], &[4, 4]).unwrap();

    let head_weight = Tensor::from_vec2(vec![vec![1.0, 0.5]]).unwrap();
    let head_bias = Tensor::vector(vec![0.1, -0.1]);
    let mut layers = vec![
        Layer::Convolution(ones_kernel_layer()),
        Layer::MaxPooling(MaxPoolingLayer::new(3)),
        Layer::SoftMax(SoftMaxLayer::from_parameters(head_weight, head_bias).unwrap()),
    ];

    let pass = forward_pass(&image, 0, &mut layers).unwrap();

    let e0 = 4.1f64.exp();
    let e1 = 1.9f64.exp();
    assert_relative_eq!(pass.output.data()[0], e0 / (e0 + e1), epsilon = 1e-12);
    assert_relative_eq!(pass.output.data()[1], e1 / (e0 + e1), epsilon = 1e-12);

    // Manually precomputed: loss = -ln(p0) = ln(1 + e^(1.9 - 4.1)).
    assert_relative_eq!(pass.loss, 0.105083, epsilon = 1e-6);
    assert!(pass.accuracy);

    // The same sample against the losing class.
    let pass = forward_pass(&image, 1, &mut layers).unwrap();
    assert!(!pass.accuracy);
    assert_relative_eq!(pass.loss, 2.305083, epsilon = 1e-6);
}
