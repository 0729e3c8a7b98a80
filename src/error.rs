//! Error types.
//!
//! The library reports failures through [`IesError`]. The `ies` binary wraps
//! them in [`AppError`], which carries the process exit code:
//!
//! - `2`: invalid input or configuration
//! - `3`: file I/O or JSON decoding
//! - `4`: numerical failure

use thiserror::Error;

/// Failures raised by the update core and its helpers.
#[derive(Debug, Error)]
pub enum IesError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape mismatch for {name}: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        name: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("At least 2 realizations are required, got {0}")]
    TooFewRealizations(usize),

    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IesResult<T> = Result<T, IesError>;

impl IesError {
    /// Exit code used by the `ies` binary for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            IesError::InvalidConfig(_)
            | IesError::ShapeMismatch { .. }
            | IesError::InvalidArgument(_)
            | IesError::TooFewRealizations(_) => 2,
            IesError::Io(_) | IesError::Json(_) => 3,
            IesError::Numerical(_) => 4,
        }
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

impl From<IesError> for AppError {
    fn from(err: IesError) -> Self {
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
