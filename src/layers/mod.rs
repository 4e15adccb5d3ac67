//! Network layers
//!
//! This module provides the three layer types of the convolutional network
//! (convolution, max pooling, softmax classifier head) and the tagged
//! [`Layer`] variant the orchestrator and visualization consumers dispatch
//! on. Each layer's `forward` returns its output together with an opaque
//! context value that the matching `backward` call takes as an explicit
//! argument; the layers additionally retain read-only caches of the most
//! recent forward call for visualization.

pub mod convolution;
pub mod maxpool;
pub mod softmax;

pub use convolution::{ConvolutionContext, ConvolutionLayer};
pub use maxpool::{MaxPoolingContext, MaxPoolingLayer};
pub use softmax::{SoftMaxContext, SoftMaxLayer};

use crate::error::TensorError;
use crate::tensor::Tensor;

/// Tagged layer variant.
///
/// Consumers match on the variant (or use the `as_*` accessors) instead of
/// searching a heterogeneous list for a layer of a given type.
#[derive(Debug)]
pub enum Layer {
    /// Convolutional layer with learnable kernels.
    Convolution(ConvolutionLayer),
    /// Parameterless max-pooling layer.
    MaxPooling(MaxPoolingLayer),
    /// Softmax classifier head with learnable weight and bias.
    SoftMax(SoftMaxLayer),
}

/// Opaque forward context produced by [`Layer::forward`], consumed by the
/// orchestrator's backward walk. Variants always line up with the layer that
/// produced them.
pub enum ForwardContext {
    Convolution(ConvolutionContext),
    MaxPooling(MaxPoolingContext),
    SoftMax(SoftMaxContext),
}

impl Layer {
    /// Forward propagation, dispatched to the wrapped layer.
    pub fn forward(&mut self, input: &Tensor) -> Result<(Tensor, ForwardContext), TensorError> {
        match self {
            Layer::Convolution(layer) => {
                let (output, ctx) = layer.forward(input)?;
                Ok((output, ForwardContext::Convolution(ctx)))
            }
            Layer::MaxPooling(layer) => {
                let (output, ctx) = layer.forward(input)?;
                Ok((output, ForwardContext::MaxPooling(ctx)))
            }
            Layer::SoftMax(layer) => {
                let (output, ctx) = layer.forward(input)?;
                Ok((output, ForwardContext::SoftMax(ctx)))
            }
        }
    }

    /// The wrapped convolution layer, if this is one.
    pub fn as_convolution(&self) -> Option<&ConvolutionLayer> {
        match self {
            Layer::Convolution(layer) => Some(layer),
            _ => None,
        }
    }

    /// The wrapped max-pooling layer, if this is one.
    pub fn as_max_pooling(&self) -> Option<&MaxPoolingLayer> {
        match self {
            Layer::MaxPooling(layer) => Some(layer),
            _ => None,
        }
    }

    /// The wrapped softmax head, if this is one.
    pub fn as_soft_max(&self) -> Option<&SoftMaxLayer> {
        match self {
            Layer::SoftMax(layer) => Some(layer),
            _ => None,
        }
    }
}
