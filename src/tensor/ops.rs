//! Tensor arithmetic
//!
//! Broadcasting elementwise operations, axis-aware reductions, dot products,
//! top-k index selection and the elementwise activation maps. All behavior is
//! resolved from the explicit shape: one generic broadcasting routine covers
//! every rank combination, and one generic reduction routine covers every
//! axis selector.

use super::{Tensor, MAX_RANK};
use crate::error::{shape_string, TensorError};

/// Axis selector for reductions.
///
/// `All` collapses every element into a scalar. `One(a)` collapses a single
/// axis; `Two(a, b)` collapses an ordered pair of axes (e.g. `Two(1, 2)` on a
/// rank-3 tensor yields a rank-1 result per leading index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axes {
    /// Reduce every element into a scalar.
    All,
    /// Reduce a single axis.
    One(usize),
    /// Reduce two distinct axes, given in ascending order.
    Two(usize, usize),
}

impl Tensor {
    fn map(&self, f: impl Fn(f64) -> f64) -> Tensor {
        Tensor {
            data: self.data.iter().map(|&v| f(v)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Elementwise negation.
    pub fn neg(&self) -> Tensor {
        self.map(|v| -v)
    }

    /// Multiply every element by a scalar factor.
    pub fn scale(&self, factor: f64) -> Tensor {
        self.map(|v| v * factor)
    }

    /// Elementwise sigmoid `1 / (1 + e^-x)`, mapped over any rank.
    pub fn sigmoid(&self) -> Tensor {
        self.map(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Elementwise exponential, mapped over any rank.
    pub fn exp(&self) -> Tensor {
        self.map(f64::exp)
    }

    /// One broadcasting routine behind all elementwise arithmetic.
    ///
    /// Supported operand combinations:
    /// - equal shapes (elementwise),
    /// - a rank-0 scalar against anything (applied to every element),
    /// - a rank-1 vector against the last axis of a rank-2/3 tensor
    ///   (the vector length must match that axis), in either operand order.
    ///
    /// Anything else fails with `ShapeMismatch`.
    fn broadcast_with(
        &self,
        other: &Tensor,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<Tensor, TensorError> {
        if self.shape == other.shape {
            return Ok(Tensor {
                data: self
                    .data
                    .iter()
                    .zip(other.data.iter())
                    .map(|(&a, &b)| op(a, b))
                    .collect(),
                shape: self.shape.clone(),
            });
        }
        if self.rank() == 0 {
            let a = self.data[0];
            return Ok(other.map(|b| op(a, b)));
        }
        if other.rank() == 0 {
            let b = other.data[0];
            return Ok(self.map(|a| op(a, b)));
        }
        if self.rank() == 1 && other.rank() >= 2 {
            let last = other.shape[other.rank() - 1];
            if self.len() == last {
                return Ok(Tensor {
                    data: other
                        .data
                        .iter()
                        .enumerate()
                        .map(|(i, &b)| op(self.data[i % last], b))
                        .collect(),
                    shape: other.shape.clone(),
                });
            }
        }
        if other.rank() == 1 && self.rank() >= 2 {
            let last = self.shape[self.rank() - 1];
            if other.len() == last {
                return Ok(Tensor {
                    data: self
                        .data
                        .iter()
                        .enumerate()
                        .map(|(i, &a)| op(a, other.data[i % last]))
                        .collect(),
                    shape: self.shape.clone(),
                });
            }
        }
        Err(TensorError::ShapeMismatch(format!(
            "{} vs {}",
            shape_string(&self.shape),
            shape_string(&other.shape)
        )))
    }

    /// Broadcasting addition.
    pub fn add(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        self.broadcast_with(other, |a, b| a + b)
    }

    /// Broadcasting subtraction.
    pub fn sub(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        self.broadcast_with(other, |a, b| a - b)
    }

    /// Broadcasting multiplication.
    pub fn mul(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        self.broadcast_with(other, |a, b| a * b)
    }

    /// Broadcasting division.
    pub fn div(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        self.broadcast_with(other, |a, b| a / b)
    }

    /// Resolve an axis selector into a per-axis reduction mask.
    fn reduction_mask(&self, axes: Axes) -> Result<[bool; MAX_RANK], TensorError> {
        let rank = self.rank();
        let mut mask = [false; MAX_RANK];
        match axes {
            Axes::All => {
                for flag in mask.iter_mut().take(rank) {
                    *flag = true;
                }
            }
            Axes::One(a) => {
                if a >= rank {
                    return Err(TensorError::InvalidAxis(format!(
                        "axis {} for rank {}",
                        a, rank
                    )));
                }
                mask[a] = true;
            }
            Axes::Two(a, b) => {
                if a >= b || b >= rank {
                    return Err(TensorError::InvalidAxis(format!(
                        "axes ({}, {}) for rank {}",
                        a, b, rank
                    )));
                }
                mask[a] = true;
                mask[b] = true;
            }
        }
        Ok(mask)
    }

    /// One generic reduction routine behind `sum` and `amax`.
    ///
    /// Collapses the selected axes; the output keeps the remaining axes in
    /// order. Each output cell is seeded with the first contributing element
    /// and folded with `combine` over the rest.
    fn reduce(&self, axes: Axes, combine: impl Fn(f64, f64) -> f64) -> Result<Tensor, TensorError> {
        let rank = self.rank();
        let mask = self.reduction_mask(axes)?;

        let out_shape: Vec<usize> = (0..rank).filter(|&d| !mask[d]).map(|d| self.shape[d]).collect();
        let out_len: usize = out_shape.iter().product();
        let mut out = vec![0.0; out_len];
        let mut seen = vec![false; out_len];

        let mut coords = [0usize; MAX_RANK];
        for (flat, &value) in self.data.iter().enumerate() {
            let mut rem = flat;
            for d in (0..rank).rev() {
                coords[d] = rem % self.shape[d];
                rem /= self.shape[d];
            }
            let mut out_index = 0;
            for d in 0..rank {
                if !mask[d] {
                    out_index = out_index * self.shape[d] + coords[d];
                }
            }
            if seen[out_index] {
                out[out_index] = combine(out[out_index], value);
            } else {
                out[out_index] = value;
                seen[out_index] = true;
            }
        }

        Ok(Tensor {
            data: out,
            shape: out_shape,
        })
    }

    /// Sum along the selected axes.
    ///
    /// `Axes::All` sums every element into a rank-0 tensor; `Axes::One`
    /// collapses that axis; `Axes::Two` collapses both (e.g. `Two(1, 2)` on a
    /// rank-3 tensor gives one total per leading index).
    pub fn sum(&self, axes: Axes) -> Result<Tensor, TensorError> {
        self.reduce(axes, |acc, v| acc + v)
    }

    /// Sum of every element, as a plain value.
    pub fn sum_all(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Maximum along the selected axes. Same axis semantics as [`Tensor::sum`];
    /// reports values only (index recovery is [`Tensor::top_k_indices`]'s job).
    pub fn amax(&self, axes: Axes) -> Result<Tensor, TensorError> {
        self.reduce(axes, f64::max)
    }

    /// Dot product.
    ///
    /// - 1-D · 1-D: inner product, rank-0 result (`DimensionMismatch` on
    ///   length disagreement);
    /// - 2-D · 1-D: matrix-vector product, rank-1 result;
    /// - 2-D · 2-D: matrix product, rank-2 result (inner dimensions must
    ///   agree).
    ///
    /// Any other rank combination fails with `ShapeMismatch`.
    pub fn dot(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        match (self.rank(), other.rank()) {
            (1, 1) => {
                if self.len() != other.len() {
                    return Err(TensorError::DimensionMismatch(format!(
                        "inner product of lengths {} and {}",
                        self.len(),
                        other.len()
                    )));
                }
                let value = self
                    .data
                    .iter()
                    .zip(other.data.iter())
                    .map(|(&a, &b)| a * b)
                    .sum();
                Ok(Tensor::scalar(value))
            }
            (2, 1) => {
                let (rows, cols) = (self.shape[0], self.shape[1]);
                if cols != other.len() {
                    return Err(TensorError::DimensionMismatch(format!(
                        "matrix columns {} vs vector length {}",
                        cols,
                        other.len()
                    )));
                }
                let mut out = vec![0.0; rows];
                for (i, row) in self.data.chunks(cols).enumerate() {
                    out[i] = row
                        .iter()
                        .zip(other.data.iter())
                        .map(|(&a, &b)| a * b)
                        .sum();
                }
                Ok(Tensor::vector(out))
            }
            (2, 2) => {
                let (rows, inner) = (self.shape[0], self.shape[1]);
                let (inner_b, cols) = (other.shape[0], other.shape[1]);
                if inner != inner_b {
                    return Err(TensorError::DimensionMismatch(format!(
                        "inner dimensions {} and {}",
                        inner, inner_b
                    )));
                }
                let mut out = vec![0.0; rows * cols];
                for i in 0..rows {
                    for j in 0..cols {
                        let mut acc = 0.0;
                        for k in 0..inner {
                            acc += self.data[i * inner + k] * other.data[k * cols + j];
                        }
                        out[i * cols + j] = acc;
                    }
                }
                Ok(Tensor {
                    data: out,
                    shape: vec![rows, cols],
                })
            }
            (a, b) => Err(TensorError::ShapeMismatch(format!(
                "dot is defined for 1-D.1-D, 2-D.1-D and 2-D.2-D operands, got ranks {} and {}",
                a, b
            ))),
        }
    }

    /// Indices of the `k` largest values of a rank-1 tensor, descending by
    /// value. Equal values keep their original relative order (stable sort).
    /// If `k` exceeds the length, every index is returned.
    pub fn top_k_indices(&self, k: usize) -> Result<Vec<usize>, TensorError> {
        if self.rank() != 1 {
            return Err(TensorError::ShapeMismatch(format!(
                "top-k selection needs a rank-1 tensor, got {}",
                shape_string(&self.shape)
            )));
        }
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.sort_by(|&a, &b| self.data[b].total_cmp(&self.data[a]));
        indices.truncate(k.min(self.len()));
        Ok(indices)
    }

    /// Index of the largest value of a non-empty rank-1 tensor; ties resolve
    /// to the first occurrence.
    pub fn argmax(&self) -> Result<usize, TensorError> {
        if self.rank() != 1 || self.len() == 0 {
            return Err(TensorError::ShapeMismatch(format!(
                "argmax needs a non-empty rank-1 tensor, got {}",
                shape_string(&self.shape)
            )));
        }
        let mut best = 0;
        for (i, &v) in self.data.iter().enumerate().skip(1) {
            if v > self.data[best] {
                best = i;
            }
        }
        Ok(best)
    }
}
