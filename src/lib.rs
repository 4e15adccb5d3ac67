//! CNN Inference Engine
//!
//! This library provides a minimal rank-0..3 tensor arithmetic core and a
//! three-layer convolutional network (convolution, max pooling, softmax
//! classifier head) with hand-written forward and backward passes, built to
//! drive a live inference visualization. The engine processes exactly one
//! sample per forward/backward cycle.
//!
//! # Modules
//!
//! - `tensor`: Tensor type with explicit shape, broadcasting arithmetic and
//!   axis-aware reductions
//! - `layers`: The three layer types and the tagged Layer variant
//! - `network`: Forward/backward orchestration and the SGD training step
//! - `model`: Trained-parameter descriptor loading and saving
//! - `error`: The three failure kinds of the numeric core
//! - `utils`: Shared utilities (seedable RNG)

pub mod error;
pub mod layers;
pub mod model;
pub mod network;
pub mod tensor;
pub mod utils;
