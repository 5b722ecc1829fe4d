//! Terminal reports: table summary, registry listing, forecast header.

pub mod format;

pub use format::*;
