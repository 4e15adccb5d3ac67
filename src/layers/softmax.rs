//! Softmax classifier head
//!
//! Flattens the incoming feature volume, applies a linear transform
//! `flattened · weight + bias`, and converts the result into class
//! probabilities with a softmax. The layer owns the weight matrix and bias
//! vector and updates both in place during the backward pass.
//!
//! The softmax is the plain `e^z / sum(e^z)` form without max-subtraction
//! stabilization; logits are expected to stay in a moderate range.

use crate::error::{shape_string, TensorError};
use crate::tensor::Tensor;
use crate::utils::SimpleRng;

/// Softmax classifier head with a weight matrix
/// (input_units × output_units) and a bias vector (output_units).
///
/// # Example
///
/// ```ignore
/// use cnn_engine::layers::SoftMaxLayer;
/// use cnn_engine::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let head = SoftMaxLayer::new(2704, 10, &mut rng);
/// assert_eq!(head.output_units(), 10);
/// ```
#[derive(Debug)]
pub struct SoftMaxLayer {
    input_units: usize,
    output_units: usize,
    weight: Tensor,
    bias: Tensor,
    last_flattened: Option<Tensor>,
    last_highlights: Option<Vec<usize>>,
}

/// Opaque forward context for [`SoftMaxLayer::backward`]; holds the flattened
/// input and the cached linear output of the matching forward call.
pub struct SoftMaxContext {
    flattened: Tensor,
    linear: Tensor,
}

impl SoftMaxLayer {
    /// Shape of the input gradient returned by [`SoftMaxLayer::backward`].
    ///
    /// This is a fixed design constant matching the pooled feature volume of
    /// the reference topology (28×28 image → 26×26×16 convolution → 13×13×16
    /// pool); it is deliberately not derived from the cached input shape.
    pub const GRAD_VOLUME_SHAPE: [usize; 3] = [13, 13, 16];

    /// Number of flattened-input indices retained as the visualization
    /// highlight side channel.
    pub const HIGHLIGHT_COUNT: usize = 25;

    /// Create a head with Gaussian-initialized weights (std-dev 1.0) and a
    /// zero bias.
    ///
    /// # Panics
    ///
    /// Panics if either unit count is zero.
    pub fn new(input_units: usize, output_units: usize, rng: &mut SimpleRng) -> Self {
        assert!(input_units > 0, "input_units must be positive");
        assert!(output_units > 0, "output_units must be positive");
        Self {
            input_units,
            output_units,
            weight: Tensor::randn(&[input_units, output_units], 1.0, rng),
            bias: Tensor::zeros(&[output_units]),
            last_flattened: None,
            last_highlights: None,
        }
    }

    /// Create a head from trained parameters.
    ///
    /// Fails with `ShapeMismatch` unless `weight` is rank 2 and `bias` is
    /// rank 1 with length equal to the weight's column count.
    pub fn from_parameters(weight: Tensor, bias: Tensor) -> Result<Self, TensorError> {
        if weight.rank() != 2 || bias.rank() != 1 || weight.shape()[1] != bias.len() {
            return Err(TensorError::ShapeMismatch(format!(
                "weight {} incompatible with bias {}",
                shape_string(weight.shape()),
                shape_string(bias.shape())
            )));
        }
        let input_units = weight.shape()[0];
        let output_units = weight.shape()[1];
        Ok(Self {
            input_units,
            output_units,
            weight,
            bias,
            last_flattened: None,
            last_highlights: None,
        })
    }

    /// Number of flattened input units.
    pub fn input_units(&self) -> usize {
        self.input_units
    }

    /// Number of output classes.
    pub fn output_units(&self) -> usize {
        self.output_units
    }

    /// Current weight matrix.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Current bias vector.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Flattened input of the most recent forward call, for visualization
    /// consumers. No guarantee beyond that.
    pub fn flattened_input(&self) -> Option<&Tensor> {
        self.last_flattened.as_ref()
    }

    /// Top-25 flattened-input indices of the most recent forward call. Purely
    /// a visualization side channel; never consumed by a gradient.
    pub fn highlight_indices(&self) -> Option<&[usize]> {
        self.last_highlights.as_deref()
    }

    /// Forward propagation.
    ///
    /// Fully flattens the volume, records the highlight side channel,
    /// computes `linear = flattened · weight + bias` and returns the softmax
    /// probabilities `e^linear / sum(e^linear)` together with the forward
    /// context the backward pass needs.
    pub fn forward(&mut self, volume: &Tensor) -> Result<(Tensor, SoftMaxContext), TensorError> {
        let flattened = volume.flatten();
        self.last_highlights = Some(flattened.top_k_indices(Self::HIGHLIGHT_COUNT)?);

        let linear = self
            .weight
            .transpose()?
            .dot(&flattened)?
            .add(&self.bias)?;

        self.last_flattened = Some(flattened.clone());

        let exponentials = linear.exp();
        let total = Tensor::scalar(exponentials.sum_all());
        let probabilities = exponentials.div(&total)?;

        Ok((probabilities, SoftMaxContext { flattened, linear }))
    }

    /// Backward propagation, driven directly by the class label.
    ///
    /// `upstream` is the loss gradient at the label index (for cross-entropy,
    /// `-1 / p[label]`). Computes the analytic softmax Jacobian row for the
    /// label from the cached linear output, accumulates the weight gradient
    /// as the outer product of the flattened input with the scaled row and
    /// the bias gradient as the scaled row itself, applies the
    /// gradient-descent update with step `alpha`, and returns the input
    /// gradient reshaped to [`SoftMaxLayer::GRAD_VOLUME_SHAPE`].
    pub fn backward(
        &mut self,
        ctx: &SoftMaxContext,
        label: usize,
        upstream: f64,
        alpha: f64,
    ) -> Result<Tensor, TensorError> {
        if label >= self.output_units {
            return Err(TensorError::InvalidAxis(format!(
                "class label {} out of range for {} outputs",
                label, self.output_units
            )));
        }

        let exponentials = ctx.linear.exp();
        let total = exponentials.sum_all();
        let denom = total * total;
        let exp_label = exponentials.data()[label];

        // Softmax Jacobian row for the label: -p_i * p_j off the diagonal,
        // p_i * (1 - p_i) on it, written in terms of the raw exponentials.
        let mut row: Vec<f64> = exponentials
            .data()
            .iter()
            .map(|&exp_j| -exp_label * exp_j / denom)
            .collect();
        row[label] = exp_label * (total - exp_label) / denom;
        let scaled = Tensor::vector(row).scale(upstream);

        let weight_gradient = ctx
            .flattened
            .reshape(&[self.input_units, 1])?
            .dot(&scaled.reshape(&[1, self.output_units])?)?;
        let bias_gradient = scaled.clone();

        // Input gradient uses the pre-update weights.
        let input_gradient = self.weight.dot(&scaled)?;

        self.weight = self.weight.sub(&weight_gradient.scale(alpha))?;
        self.bias = self.bias.sub(&bias_gradient.scale(alpha))?;

        input_gradient.reshape(&Self::GRAD_VOLUME_SHAPE)
    }
}
