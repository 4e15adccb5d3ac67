//! Convolutional layer
//!
//! Slides a set of square kernels over a grayscale image (stride 1, no
//! padding) so the network can pick up local features. The layer owns its
//! kernel tensor and updates it in place during the backward pass.

use crate::error::{shape_string, TensorError};
use crate::tensor::Tensor;
use crate::utils::SimpleRng;

/// One sliding-window patch together with its top-left offset.
pub(crate) struct Patch {
    pub values: Tensor,
    pub h: usize,
    pub w: usize,
}

/// Finite, restartable sequence of k-by-k patches over every valid top-left
/// offset of a rank-2 image, in row-major offset order.
pub(crate) struct Patches<'a> {
    image: &'a Tensor,
    kernel_size: usize,
    out_h: usize,
    out_w: usize,
    h: usize,
    w: usize,
}

impl<'a> Patches<'a> {
    pub(crate) fn new(image: &'a Tensor, kernel_size: usize) -> Self {
        let out_h = (image.shape()[0] + 1).saturating_sub(kernel_size);
        let out_w = (image.shape()[1] + 1).saturating_sub(kernel_size);
        Self {
            image,
            kernel_size,
            out_h,
            out_w,
            h: 0,
            w: 0,
        }
    }
}

impl Iterator for Patches<'_> {
    type Item = Patch;

    fn next(&mut self) -> Option<Patch> {
        if self.h >= self.out_h || self.out_w == 0 {
            return None;
        }
        let (h, w) = (self.h, self.w);

        let mut values = Tensor::zeros(&[self.kernel_size, self.kernel_size]);
        for i in 0..self.kernel_size {
            for j in 0..self.kernel_size {
                let at = values.offset2(i, j);
                values.data_mut()[at] = self.image.data()[self.image.offset2(h + i, w + j)];
            }
        }

        self.w += 1;
        if self.w == self.out_w {
            self.w = 0;
            self.h += 1;
        }
        Some(Patch { values, h, w })
    }
}

/// Convolutional layer with learnable kernels.
///
/// Applies `kernel_num` square kernels of side `kernel_size` to a rank-2
/// image with stride 1 and no padding, producing an
/// (H-k+1) × (W-k+1) × kernel_num feature volume.
///
/// # Example
///
/// ```ignore
/// use cnn_engine::layers::ConvolutionLayer;
/// use cnn_engine::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = ConvolutionLayer::new(16, 3, &mut rng);
/// assert_eq!(layer.kernel_num(), 16);
/// ```
#[derive(Debug)]
pub struct ConvolutionLayer {
    kernel_num: usize,
    kernel_size: usize,
    kernels: Tensor,
    last_output: Option<Tensor>,
}

/// Opaque forward context for [`ConvolutionLayer::backward`]; holds the image
/// the matching forward call consumed.
pub struct ConvolutionContext {
    image: Tensor,
}

impl ConvolutionLayer {
    /// Create a layer with Gaussian-initialized kernels (std-dev 1.0).
    ///
    /// # Panics
    ///
    /// Panics if `kernel_num` or `kernel_size` is zero.
    pub fn new(kernel_num: usize, kernel_size: usize, rng: &mut SimpleRng) -> Self {
        assert!(kernel_num > 0, "kernel_num must be positive");
        assert!(kernel_size > 0, "kernel_size must be positive");
        Self {
            kernel_num,
            kernel_size,
            kernels: Tensor::randn(&[kernel_num, kernel_size, kernel_size], 1.0, rng),
            last_output: None,
        }
    }

    /// Create a layer from a trained kernel tensor
    /// (kernel_num × kernel_size × kernel_size).
    ///
    /// Fails with `ShapeMismatch` if the tensor is not rank 3 with square,
    /// non-empty kernels.
    pub fn from_kernels(kernels: Tensor) -> Result<Self, TensorError> {
        let shape = kernels.shape();
        if kernels.rank() != 3 || shape[1] != shape[2] || shape[0] == 0 || shape[1] == 0 {
            return Err(TensorError::ShapeMismatch(format!(
                "kernel tensor must be n x k x k with n, k > 0, got {}",
                shape_string(shape)
            )));
        }
        Ok(Self {
            kernel_num: shape[0],
            kernel_size: shape[1],
            kernels,
            last_output: None,
        })
    }

    /// Number of kernels.
    pub fn kernel_num(&self) -> usize {
        self.kernel_num
    }

    /// Kernel side length.
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Current kernel tensor.
    pub fn kernels(&self) -> &Tensor {
        &self.kernels
    }

    /// Feature volume produced by the most recent forward call, for
    /// visualization consumers. No guarantee beyond that.
    pub fn last_output(&self) -> Option<&Tensor> {
        self.last_output.as_ref()
    }

    /// Forward propagation.
    ///
    /// For each valid top-left offset, multiplies every kernel elementwise
    /// with the image patch under it and sums over both spatial axes, storing
    /// one value per kernel at that offset. Returns the
    /// (H-k+1) × (W-k+1) × kernel_num output together with the forward
    /// context the backward pass needs.
    pub fn forward(&mut self, image: &Tensor) -> Result<(Tensor, ConvolutionContext), TensorError> {
        if image.rank() != 2 {
            return Err(TensorError::ShapeMismatch(format!(
                "convolution expects a rank-2 image, got {}",
                shape_string(image.shape())
            )));
        }
        let out_h = (image.shape()[0] + 1).saturating_sub(self.kernel_size);
        let out_w = (image.shape()[1] + 1).saturating_sub(self.kernel_size);
        let mut output = Tensor::zeros(&[out_h, out_w, self.kernel_num]);

        for patch in Patches::new(image, self.kernel_size) {
            for f in 0..self.kernel_num {
                let mut acc = 0.0;
                for i in 0..self.kernel_size {
                    for j in 0..self.kernel_size {
                        acc += self.kernels.data()[self.kernels.offset3(f, i, j)]
                            * patch.values.data()[patch.values.offset2(i, j)];
                    }
                }
                let at = output.offset3(patch.h, patch.w, f);
                output.data_mut()[at] = acc;
            }
        }

        self.last_output = Some(output.clone());
        Ok((
            output,
            ConvolutionContext {
                image: image.clone(),
            },
        ))
    }

    /// Backward propagation.
    ///
    /// Re-walks the same patch sequence as the forward call, accumulating
    /// `kernel_gradient[f] += error_gradient[h][w][f] * patch` for every
    /// offset and kernel, then applies the gradient-descent update
    /// `kernels -= alpha * kernel_gradient`.
    ///
    /// Returns the **kernel gradient** (same shape as the kernel tensor),
    /// not a gradient with respect to the input image. Since this layer sits
    /// first in the pipeline nothing downstream ever consumes the returned
    /// tensor as an input gradient.
    pub fn backward(
        &mut self,
        ctx: &ConvolutionContext,
        error_gradient: &Tensor,
        alpha: f64,
    ) -> Result<Tensor, TensorError> {
        let out_h = (ctx.image.shape()[0] + 1).saturating_sub(self.kernel_size);
        let out_w = (ctx.image.shape()[1] + 1).saturating_sub(self.kernel_size);
        let expected = [out_h, out_w, self.kernel_num];
        if error_gradient.shape() != expected.as_slice() {
            return Err(TensorError::ShapeMismatch(format!(
                "error gradient {} does not match forward output {}",
                shape_string(error_gradient.shape()),
                shape_string(&expected)
            )));
        }

        let mut kernel_gradient = Tensor::zeros(self.kernels.shape());
        for patch in Patches::new(&ctx.image, self.kernel_size) {
            for f in 0..self.kernel_num {
                let g = error_gradient.data()[error_gradient.offset3(patch.h, patch.w, f)];
                for i in 0..self.kernel_size {
                    for j in 0..self.kernel_size {
                        let at = kernel_gradient.offset3(f, i, j);
                        kernel_gradient.data_mut()[at] +=
                            g * patch.values.data()[patch.values.offset2(i, j)];
                    }
                }
            }
        }

        self.kernels = self.kernels.sub(&kernel_gradient.scale(alpha))?;
        Ok(kernel_gradient)
    }
}
