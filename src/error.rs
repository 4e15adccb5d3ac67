//! Error types for tensor and layer operations
//!
//! All numeric failures fall into one of three kinds, and all of them are
//! unrecoverable at the call site: the current forward/backward step is
//! aborted and the caller must discard the sample. No rollback of layer
//! caches or already-updated parameters is performed.

use thiserror::Error;

/// Failure modes of the tensor engine.
///
/// Every fallible tensor and layer operation returns this type. The variants
/// carry a human-readable description of the operands involved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    /// Operand shapes are incompatible for an elementwise operation, a
    /// reshape, or a structural contract (e.g. a gradient that does not
    /// match the forward output it corresponds to).
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Inner dimensions disagree in a dot product.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// An axis or index selector is unsupported for the operand's rank.
    #[error("invalid axis: {0}")]
    InvalidAxis(String),
}

/// Formats a shape as `[d0, d1, ...]` for error messages.
pub(crate) fn shape_string(shape: &[usize]) -> String {
    format!("{:?}", shape)
}
