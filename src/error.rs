//! Error Handling Module
//!
//! Structured error types for the ingestion pipeline, defined with
//! `thiserror`. Only conditions that stop a run are errors: a missing
//! month, an unresolved column or a failed audit write are logged and
//! absorbed by the component that meets them.

use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_DATA_LOAD_FAILED: i32 = 2;
pub const EXIT_INVALID_DATA: i32 = 3;
pub const EXIT_INVALID_CONFIG: i32 = 4;
pub const EXIT_IO_FAILED: i32 = 5;

// ============================================================================
// Error Types
// ============================================================================

/// Main error type for the ingestion pipeline.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    #[error("Invalid data type in column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Data validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Polars error: {0}")]
    PolarsError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    /// Process exit code reported by the CLI for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::FileNotFound { .. } => EXIT_DATA_LOAD_FAILED,
            PipelineError::MissingColumn { .. } => EXIT_DATA_LOAD_FAILED,
            PipelineError::TypeMismatch { .. } => EXIT_DATA_LOAD_FAILED,
            PipelineError::PolarsError(_) => EXIT_DATA_LOAD_FAILED,
            PipelineError::ValidationError(_) => EXIT_INVALID_DATA,
            PipelineError::InvalidParameter { .. } => EXIT_INVALID_CONFIG,
            PipelineError::ConfigError(_) => EXIT_INVALID_CONFIG,
            PipelineError::IoError(_) => EXIT_IO_FAILED,
            PipelineError::SerializationError(_) => EXIT_IO_FAILED,
        }
    }
}

/// Result alias used throughout the crate.
pub type PipelineResult<T> = Result<T, PipelineError>;

// ============================================================================
// Error Conversion Implementations
// ============================================================================

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            PipelineError::FileNotFound {
                path: "unknown".to_string(),
            }
        } else {
            PipelineError::IoError(err.to_string())
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::PolarsError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}

// ============================================================================
// Error Construction Helpers
// ============================================================================

impl PipelineError {
    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        PipelineError::FileNotFound { path: path.into() }
    }

    /// Create a missing column error.
    pub fn missing_column(column: impl Into<String>) -> Self {
        PipelineError::MissingColumn {
            column: column.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        PipelineError::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::ValidationError(message.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>) -> Self {
        PipelineError::IoError(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        PipelineError::ConfigError(message.into())
    }
}

// ============================================================================
// Tests
// ============================================================================
