//! Input/output.
//!
//! - fetching and reading raw sources (`collector`)
//! - per-source cleaning recipes (`clean`)
//! - canonical table and forecaster persistence (`store`)
//! - forecast exports (`export`)

pub mod clean;
pub mod collector;
pub mod export;
pub mod store;

pub use collector::{Collector, RawTable, read_csv};
pub use export::write_forecast_csv;
pub use store::LoadOutcome;
