//! Forecasting models and their registry.
//!
//! - `design`: design rows and component decomposition of the additive model
//! - `forecaster`: one trainable, persistable model
//! - `registry`: the named collection the pipeline owns

pub mod design;
pub mod forecaster;
pub mod registry;

pub use design::*;
pub use forecaster::*;
pub use registry::*;
