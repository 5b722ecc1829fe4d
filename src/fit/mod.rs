//! Model calibration.
//!
//! Responsibilities:
//!
//! - build the design of the additive model over a training frame
//! - accumulate and solve the normal equations
//! - estimate the residual spread used by prediction intervals

pub mod fitter;

pub use fitter::*;
