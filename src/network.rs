//! Network orchestration
//!
//! Sequences the layers for one inference or training step: the forward pass
//! normalizes the image, pipes it through every layer and scores the result;
//! the backward pass walks the layers in reverse, threading each layer's
//! returned gradient into the next `backward` call; a training step is one
//! stochastic-gradient update driven by the cross-entropy loss gradient at
//! the label.

use crate::error::{shape_string, TensorError};
use crate::layers::{ForwardContext, Layer};
use crate::tensor::Tensor;

/// Learning rate used when the caller has no preference.
pub const DEFAULT_LEARNING_RATE: f64 = 0.05;

/// Result of one forward pass: the probability vector, the cross-entropy
/// loss at the label, the 0/1 accuracy flag, and the per-layer forward
/// contexts a subsequent backward pass consumes.
pub struct ForwardPass {
    /// Class probability vector.
    pub output: Tensor,
    /// Cross-entropy loss `-ln(output[label])`.
    pub loss: f64,
    /// Whether the arg-max prediction (first occurrence on ties) equals the
    /// label.
    pub accuracy: bool,
    pub(crate) contexts: Vec<ForwardContext>,
}

impl ForwardPass {
    /// Surrender the per-layer forward contexts for a manual backward pass.
    pub fn into_contexts(self) -> Vec<ForwardContext> {
        self.contexts
    }
}

/// Result of one training step.
pub struct TrainStep {
    /// Cross-entropy loss of the forward half of the step.
    pub loss: f64,
    /// Accuracy flag of the forward half of the step.
    pub accuracy: bool,
}

/// Seed for the backward walk: the loss gradient is non-zero only at the
/// label index, so it is carried as the index and the value at that index.
pub struct LossGradient {
    /// Class label the sample is trained against.
    pub label: usize,
    /// Loss gradient at the label index (for cross-entropy, `-1 / p[label]`).
    pub value: f64,
}

/// Runs one forward pass.
///
/// Normalizes pixel values to [0, 1] (division by 255), pipes the image
/// through every layer in order, and scores the resulting probability
/// vector: loss is `-ln(output[label])`, accuracy compares the arg-max
/// prediction against the label (ties resolve to the first occurrence).
pub fn forward_pass(
    image: &Tensor,
    label: usize,
    layers: &mut [Layer],
) -> Result<ForwardPass, TensorError> {
    let mut output = image.div(&Tensor::scalar(255.0))?;
    let mut contexts = Vec::with_capacity(layers.len());

    for layer in layers.iter_mut() {
        let (next, ctx) = layer.forward(&output)?;
        contexts.push(ctx);
        output = next;
    }

    if output.rank() != 1 {
        return Err(TensorError::ShapeMismatch(format!(
            "network produced {}, expected a rank-1 probability vector",
            shape_string(output.shape())
        )));
    }
    if label >= output.len() {
        return Err(TensorError::InvalidAxis(format!(
            "class label {} out of range for {} outputs",
            label,
            output.len()
        )));
    }

    let loss = -output.data()[label].ln();
    let accuracy = output.argmax()? == label;

    Ok(ForwardPass {
        output,
        loss,
        accuracy,
        contexts,
    })
}

/// Runs one backward pass.
///
/// Walks the layers in reverse, pairing each with the forward context it
/// produced. The classifier head consumes the loss-gradient seed and yields
/// a tensor gradient; pooling layers route it (taking no learning rate);
/// the convolution layer consumes it and yields its kernel gradient, which
/// is threaded onward and finally returned. A layer sitting before a
/// convolution in a hypothetical deeper stack would therefore receive a
/// kernel-shaped tensor; the reference topology never exercises that path.
///
/// `contexts` must be the contexts produced by a forward pass over the same
/// layer sequence, in forward order.
pub fn backward_pass(
    seed: LossGradient,
    layers: &mut [Layer],
    contexts: Vec<ForwardContext>,
    alpha: f64,
) -> Result<Tensor, TensorError> {
    if contexts.len() != layers.len() {
        return Err(TensorError::ShapeMismatch(format!(
            "{} forward contexts for {} layers",
            contexts.len(),
            layers.len()
        )));
    }

    let mut seed = Some(seed);
    let mut gradient: Option<Tensor> = None;

    for (layer, ctx) in layers.iter_mut().zip(contexts).rev() {
        gradient = Some(match (layer, ctx) {
            (Layer::SoftMax(head), ForwardContext::SoftMax(ctx)) => {
                let LossGradient { label, value } = seed.take().ok_or_else(|| {
                    TensorError::ShapeMismatch(
                        "loss gradient already consumed by a later classifier head".to_string(),
                    )
                })?;
                head.backward(&ctx, label, value, alpha)?
            }
            (Layer::MaxPooling(pool), ForwardContext::MaxPooling(ctx)) => {
                let upstream = gradient.take().ok_or_else(|| {
                    TensorError::ShapeMismatch(
                        "no tensor gradient has reached the max-pooling layer".to_string(),
                    )
                })?;
                pool.backward(&ctx, &upstream)?
            }
            (Layer::Convolution(conv), ForwardContext::Convolution(ctx)) => {
                let upstream = gradient.take().ok_or_else(|| {
                    TensorError::ShapeMismatch(
                        "no tensor gradient has reached the convolution layer".to_string(),
                    )
                })?;
                conv.backward(&ctx, &upstream, alpha)?
            }
            _ => {
                return Err(TensorError::ShapeMismatch(
                    "forward context does not match its layer".to_string(),
                ))
            }
        });
    }

    gradient.ok_or_else(|| {
        TensorError::ShapeMismatch("cannot backpropagate through an empty layer sequence".to_string())
    })
}

/// Runs one stochastic-gradient training step.
///
/// Performs a forward pass, seeds the backward walk with the cross-entropy
/// loss gradient `-1 / output[label]` at the label index, and updates every
/// parameterized layer in place with step `alpha`.
pub fn train_step(
    image: &Tensor,
    label: usize,
    layers: &mut [Layer],
    alpha: f64,
) -> Result<TrainStep, TensorError> {
    let pass = forward_pass(image, label, layers)?;
    let seed = LossGradient {
        label,
        value: -1.0 / pass.output.data()[label],
    };
    let loss = pass.loss;
    let accuracy = pass.accuracy;
    backward_pass(seed, layers, pass.contexts, alpha)?;
    Ok(TrainStep { loss, accuracy })
}
