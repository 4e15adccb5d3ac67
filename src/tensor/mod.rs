//! Rank-0 to rank-3 tensor type
//!
//! A [`Tensor`] stores IEEE-754 doubles in a flat row-major buffer together
//! with an explicit shape, so every operation resolves behavior from the
//! shape instead of inspecting nesting depth. Rank 0 is a scalar (empty
//! shape, one element); ranks 1-3 cover vectors, matrices and feature
//! volumes. Higher ranks are not supported.

pub mod ops;

pub use ops::Axes;

use crate::error::{shape_string, TensorError};
use crate::utils::SimpleRng;

/// Highest supported rank.
pub const MAX_RANK: usize = 3;

/// Dense tensor of `f64` values with an explicit row-major shape.
///
/// # Example
///
/// ```
/// use cnn_engine::tensor::Tensor;
///
/// let t = Tensor::zeros(&[2, 3, 4]);
/// assert_eq!(t.shape(), &[2, 3, 4]);
/// assert_eq!(t.len(), 24);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f64>,
    shape: Vec<usize>,
}

fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

impl Tensor {
    /// Create a tensor of the given shape filled with zeros.
    ///
    /// # Panics
    ///
    /// Panics if the shape has more than [`MAX_RANK`] dimensions.
    pub fn zeros(shape: &[usize]) -> Self {
        assert!(
            shape.len() <= MAX_RANK,
            "rank {} exceeds supported rank {}",
            shape.len(),
            MAX_RANK
        );
        Self {
            data: vec![0.0; element_count(shape)],
            shape: shape.to_vec(),
        }
    }

    /// Create a rank-0 tensor holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self {
            data: vec![value],
            shape: Vec::new(),
        }
    }

    /// Create a rank-1 tensor from a vector of values.
    pub fn vector(values: Vec<f64>) -> Self {
        let shape = vec![values.len()];
        Self {
            data: values,
            shape,
        }
    }

    /// Create a tensor from a flat buffer and an explicit shape.
    ///
    /// Fails with `ShapeMismatch` if the buffer length does not equal the
    /// shape's element count.
    ///
    /// # Panics
    ///
    /// Panics if the shape has more than [`MAX_RANK`] dimensions.
    pub fn from_flat(data: Vec<f64>, shape: &[usize]) -> Result<Self, TensorError> {
        assert!(
            shape.len() <= MAX_RANK,
            "rank {} exceeds supported rank {}",
            shape.len(),
            MAX_RANK
        );
        if data.len() != element_count(shape) {
            return Err(TensorError::ShapeMismatch(format!(
                "{} elements cannot fill shape {}",
                data.len(),
                shape_string(shape)
            )));
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    /// Create a rank-2 tensor from nested rows.
    ///
    /// Fails with `ShapeMismatch` if the rows are ragged.
    pub fn from_vec2(rows: Vec<Vec<f64>>) -> Result<Self, TensorError> {
        let height = rows.len();
        let width = rows.first().map_or(0, |row| row.len());
        let mut data = Vec::with_capacity(height * width);
        for row in &rows {
            if row.len() != width {
                return Err(TensorError::ShapeMismatch(format!(
                    "ragged rows: expected width {}, found {}",
                    width,
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            shape: vec![height, width],
        })
    }

    /// Create a rank-3 tensor from nested planes.
    ///
    /// Fails with `ShapeMismatch` if any plane or row is ragged.
    pub fn from_vec3(planes: Vec<Vec<Vec<f64>>>) -> Result<Self, TensorError> {
        let depth = planes.len();
        let height = planes.first().map_or(0, |plane| plane.len());
        let width = planes
            .first()
            .and_then(|plane| plane.first())
            .map_or(0, |row| row.len());
        let mut data = Vec::with_capacity(depth * height * width);
        for plane in &planes {
            if plane.len() != height {
                return Err(TensorError::ShapeMismatch(format!(
                    "ragged planes: expected height {}, found {}",
                    height,
                    plane.len()
                )));
            }
            for row in plane {
                if row.len() != width {
                    return Err(TensorError::ShapeMismatch(format!(
                        "ragged rows: expected width {}, found {}",
                        width,
                        row.len()
                    )));
                }
                data.extend_from_slice(row);
            }
        }
        Ok(Self {
            data,
            shape: vec![depth, height, width],
        })
    }

    /// Create a tensor of the given shape with each element drawn
    /// independently from a Box-Muller normal sample scaled by `std_dev`.
    ///
    /// Used for parameter initialization when no trained parameters are
    /// supplied.
    ///
    /// # Panics
    ///
    /// Panics if the shape has more than [`MAX_RANK`] dimensions.
    pub fn randn(shape: &[usize], std_dev: f64, rng: &mut SimpleRng) -> Self {
        assert!(
            shape.len() <= MAX_RANK,
            "rank {} exceeds supported rank {}",
            shape.len(),
            MAX_RANK
        );
        let data = (0..element_count(shape))
            .map(|_| rng.normal_f64(std_dev))
            .collect();
        Self {
            data,
            shape: shape.to_vec(),
        }
    }

    /// The ordered dimension sizes.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions (0 for a scalar).
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Flat row-major view of the elements.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Flat offset of a rank-2 index pair.
    #[inline]
    pub(crate) fn offset2(&self, i: usize, j: usize) -> usize {
        i * self.shape[1] + j
    }

    /// Flat offset of a rank-3 index triple.
    #[inline]
    pub(crate) fn offset3(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.shape[1] + j) * self.shape[2] + k
    }

    /// Look up an element by full multi-index.
    ///
    /// Returns `None` if the index rank does not match or any coordinate is
    /// out of bounds.
    pub fn get(&self, indices: &[usize]) -> Option<f64> {
        if indices.len() != self.rank() {
            return None;
        }
        let mut offset = 0;
        for (&index, &dim) in indices.iter().zip(self.shape.iter()) {
            if index >= dim {
                return None;
            }
            offset = offset * dim + index;
        }
        self.data.get(offset).copied()
    }

    /// The value of a rank-0 tensor, or `None` for higher ranks.
    pub fn as_scalar(&self) -> Option<f64> {
        if self.rank() == 0 {
            self.data.first().copied()
        } else {
            None
        }
    }

    /// Export a rank-1 tensor as a vector of values.
    pub fn to_vec1(&self) -> Option<Vec<f64>> {
        if self.rank() == 1 {
            Some(self.data.clone())
        } else {
            None
        }
    }

    /// Export a rank-2 tensor as nested rows.
    pub fn to_vec2(&self) -> Option<Vec<Vec<f64>>> {
        if self.rank() != 2 {
            return None;
        }
        let width = self.shape[1];
        Some(self.data.chunks(width).map(|row| row.to_vec()).collect())
    }

    /// Export a rank-3 tensor as nested planes.
    pub fn to_vec3(&self) -> Option<Vec<Vec<Vec<f64>>>> {
        if self.rank() != 3 {
            return None;
        }
        let height = self.shape[1];
        let width = self.shape[2];
        Some(
            self.data
                .chunks(height * width)
                .map(|plane| plane.chunks(width).map(|row| row.to_vec()).collect())
                .collect(),
        )
    }

    /// Fully flatten to a rank-1 tensor (depth-first element order).
    pub fn flatten(&self) -> Tensor {
        Tensor::vector(self.data.clone())
    }

    /// Repartition the elements into a new shape.
    ///
    /// The tensor is fully flattened and then chunked into the target shape.
    /// Fails with `ShapeMismatch` if the element counts differ or the target
    /// rank exceeds [`MAX_RANK`].
    ///
    /// # Example
    ///
    /// ```
    /// use cnn_engine::tensor::Tensor;
    ///
    /// let t = Tensor::vector(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    /// let m = t.reshape(&[2, 3]).unwrap();
    /// assert_eq!(m.get(&[1, 0]), Some(4.0));
    /// ```
    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor, TensorError> {
        if shape.len() > MAX_RANK {
            return Err(TensorError::ShapeMismatch(format!(
                "target shape {} exceeds supported rank {}",
                shape_string(shape),
                MAX_RANK
            )));
        }
        if element_count(shape) != self.len() {
            return Err(TensorError::ShapeMismatch(format!(
                "cannot reshape {} into {}: element counts differ",
                shape_string(&self.shape),
                shape_string(shape)
            )));
        }
        Ok(Tensor {
            data: self.data.clone(),
            shape: shape.to_vec(),
        })
    }

    /// Matrix transpose.
    ///
    /// Rank-0 and rank-1 tensors pass through unchanged; rank-3 is not
    /// supported and fails with `InvalidAxis`.
    pub fn transpose(&self) -> Result<Tensor, TensorError> {
        match self.rank() {
            0 | 1 => Ok(self.clone()),
            2 => {
                let height = self.shape[0];
                let width = self.shape[1];
                let mut data = vec![0.0; self.len()];
                for i in 0..height {
                    for j in 0..width {
                        data[j * height + i] = self.data[i * width + j];
                    }
                }
                Ok(Tensor {
                    data,
                    shape: vec![width, height],
                })
            }
            rank => Err(TensorError::InvalidAxis(format!(
                "transpose is undefined for rank {}",
                rank
            ))),
        }
    }
}
