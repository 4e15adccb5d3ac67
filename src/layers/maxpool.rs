//! Max-pooling layer
//!
//! Reduces each non-overlapping k-by-k window of a feature volume to its
//! per-channel maximum. The window size doubles as the stride, and trailing
//! rows/columns beyond the last full window are dropped silently. The layer
//! has no learnable parameters.

use crate::error::{shape_string, TensorError};
use crate::tensor::{Axes, Tensor};

/// One pooling window together with its window-grid position.
pub(crate) struct WindowPatch {
    pub values: Tensor,
    pub h: usize,
    pub w: usize,
}

/// Finite, restartable sequence of non-overlapping k×k×C windows over a
/// rank-3 volume, in row-major window order.
pub(crate) struct WindowPatches<'a> {
    image: &'a Tensor,
    window: usize,
    out_h: usize,
    out_w: usize,
    h: usize,
    w: usize,
}

impl<'a> WindowPatches<'a> {
    pub(crate) fn new(image: &'a Tensor, window: usize) -> Self {
        Self {
            image,
            window,
            out_h: image.shape()[0] / window,
            out_w: image.shape()[1] / window,
            h: 0,
            w: 0,
        }
    }
}

impl Iterator for WindowPatches<'_> {
    type Item = WindowPatch;

    fn next(&mut self) -> Option<WindowPatch> {
        if self.h >= self.out_h || self.out_w == 0 {
            return None;
        }
        let (h, w) = (self.h, self.w);
        let channels = self.image.shape()[2];

        let mut values = Tensor::zeros(&[self.window, self.window, channels]);
        for i in 0..self.window {
            for j in 0..self.window {
                for c in 0..channels {
                    let at = values.offset3(i, j, c);
                    values.data_mut()[at] = self.image.data()
                        [self.image.offset3(h * self.window + i, w * self.window + j, c)];
                }
            }
        }

        self.w += 1;
        if self.w == self.out_w {
            self.w = 0;
            self.h += 1;
        }
        Some(WindowPatch { values, h, w })
    }
}

/// Max-pooling layer.
///
/// Pools an H × W × C feature volume down to
/// floor(H/k) × floor(W/k) × C with non-overlapping windows.
#[derive(Debug)]
pub struct MaxPoolingLayer {
    window: usize,
    last_output: Option<Tensor>,
}

/// Opaque forward context for [`MaxPoolingLayer::backward`]; holds the volume
/// the matching forward call consumed.
pub struct MaxPoolingContext {
    image: Tensor,
}

impl MaxPoolingLayer {
    /// Create a pooling layer with the given window size (also the stride).
    ///
    /// # Panics
    ///
    /// Panics if `window` is zero.
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "pooling window must be positive");
        Self {
            window,
            last_output: None,
        }
    }

    /// Window side length.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Pooled volume produced by the most recent forward call, for
    /// visualization consumers. No guarantee beyond that.
    pub fn last_output(&self) -> Option<&Tensor> {
        self.last_output.as_ref()
    }

    /// Forward propagation.
    ///
    /// Each non-overlapping window reduces to its per-channel maximum.
    pub fn forward(&mut self, image: &Tensor) -> Result<(Tensor, MaxPoolingContext), TensorError> {
        if image.rank() != 3 {
            return Err(TensorError::ShapeMismatch(format!(
                "max pooling expects a rank-3 volume, got {}",
                shape_string(image.shape())
            )));
        }
        let out_h = image.shape()[0] / self.window;
        let out_w = image.shape()[1] / self.window;
        let channels = image.shape()[2];
        let mut output = Tensor::zeros(&[out_h, out_w, channels]);

        for patch in WindowPatches::new(image, self.window) {
            let maxima = patch.values.amax(Axes::Two(0, 1))?;
            for c in 0..channels {
                let at = output.offset3(patch.h, patch.w, c);
                output.data_mut()[at] = maxima.data()[c];
            }
        }

        self.last_output = Some(output.clone());
        Ok((
            output,
            MaxPoolingContext {
                image: image.clone(),
            },
        ))
    }

    /// Backward propagation.
    ///
    /// Routes each upstream gradient value back to the location(s) that
    /// attained the window's maximum; everywhere else stays zero. When
    /// several cells tie for the maximum, **every** tied cell receives the
    /// full upstream value (duplicated, not split). The returned tensor
    /// matches the original input shape, so trailing rows/columns that were
    /// dropped on the way down stay zero.
    pub fn backward(
        &self,
        ctx: &MaxPoolingContext,
        error_gradient: &Tensor,
    ) -> Result<Tensor, TensorError> {
        let out_h = ctx.image.shape()[0] / self.window;
        let out_w = ctx.image.shape()[1] / self.window;
        let channels = ctx.image.shape()[2];
        let expected = [out_h, out_w, channels];
        if error_gradient.shape() != expected.as_slice() {
            return Err(TensorError::ShapeMismatch(format!(
                "error gradient {} does not match pooled output {}",
                shape_string(error_gradient.shape()),
                shape_string(&expected)
            )));
        }

        let mut input_gradient = Tensor::zeros(ctx.image.shape());
        for patch in WindowPatches::new(&ctx.image, self.window) {
            let maxima = patch.values.amax(Axes::Two(0, 1))?;
            for i in 0..self.window {
                for j in 0..self.window {
                    for c in 0..channels {
                        if patch.values.data()[patch.values.offset3(i, j, c)] == maxima.data()[c] {
                            let at = input_gradient.offset3(
                                patch.h * self.window + i,
                                patch.w * self.window + j,
                                c,
                            );
                            input_gradient.data_mut()[at] = error_gradient.data()
                                [error_gradient.offset3(patch.h, patch.w, c)];
                        }
                    }
                }
            }
        }
        Ok(input_gradient)
    }
}
