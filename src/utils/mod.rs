//! Shared utilities.
//!
//! Currently just the seedable random number generator used for parameter
//! initialization and the demo driver.

pub mod rng;

pub use rng::SimpleRng;
