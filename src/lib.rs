//! `conso-forecast` library crate.
//!
//! The binaries (`pipeline`, `dashboard`) are thin wrappers around this
//! library so that:
//!
//! - the pipeline and the registry are testable without spawning processes
//! - the batch driver and the data service share one implementation

pub mod app;
pub mod cli;
pub mod config;
pub mod dates;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod pipeline;
pub mod plot;
pub mod report;
pub mod select;
