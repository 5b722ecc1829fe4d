//! Error types.
//!
//! Library code returns [`PipelineError`]; the binaries convert it into an
//! [`AppError`] that carries the process exit code.

use std::path::PathBuf;

use thiserror::Error;

use crate::dates::ParseError;

/// Errors raised by the data pipeline and the model registry.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport failure while downloading a source.
    #[error("network error on {url}: {message}")]
    Network { url: String, message: String },

    /// Local filesystem failure.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A table does not have the columns or shape an operation requires.
    #[error("schema error: {0}")]
    Schema(String),

    /// A forecaster was asked to predict before being fitted.
    #[error("model '{0}' is not trained")]
    NotTrained(String),

    /// A named resource (blob, model entry) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Saving or loading a persisted artefact failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The canonical table has not been built or loaded yet.
    #[error("the canonical table is not ready; run process first")]
    NotReady,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit code used when the error reaches a binary's `main`.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::InvalidArgument(_) | PipelineError::Schema(_) => 2,
            PipelineError::NotReady | PipelineError::NotFound(_) => 3,
            PipelineError::Network { .. }
            | PipelineError::Io { .. }
            | PipelineError::Persistence(_)
            | PipelineError::NotTrained(_) => 4,
        }
    }
}

impl From<ParseError> for PipelineError {
    fn from(err: ParseError) -> Self {
        PipelineError::InvalidArgument(err.to_string())
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
