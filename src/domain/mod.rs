//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the closed set of columns (`Field`) and input tags (`Origin`, `Growth`, `SaveMode`)
//! - declarative registry entries (`ModelSpec`)
//! - time-indexed tables (`Table` while cleaning, `Frame` once dense)

pub mod frame;
pub mod types;

pub use frame::*;
pub use types::*;
