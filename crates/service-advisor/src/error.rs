//! Custom error types for the service advisor.
//!
//! This module provides the error hierarchy using `thiserror`. Only
//! [`AdvisorError::DataLoad`] and [`AdvisorError::InvalidConfig`] normally
//! reach a caller: degenerate subsets and discriminant fit failures are
//! absorbed by the analysis stages, which log them and fall back.
//!
//! Errors are serializable so a front end can display them as
//! `{ "code": ..., "message": ... }`.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for catalog loading and analysis.
#[derive(Error, Debug)]
pub enum AdvisorError {
    /// The catalog source is absent or malformed.
    #[error("Failed to load catalog: {0}")]
    DataLoad(String),

    /// A subset is too small for the requested computation.
    #[error("Degenerate input for {operation}: {rows} row(s), need at least {required}")]
    DegenerateInput {
        operation: &'static str,
        rows: usize,
        required: usize,
    },

    /// Fitting or applying the discriminant model failed.
    #[error("Model fit failed: {0}")]
    ModelFit(String),

    /// A model cache artifact could not be written or read.
    #[error("Model cache error: {0}")]
    Cache(String),

    /// Invalid request or cache configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AdvisorError>,
    },
}

impl AdvisorError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AdvisorError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for front-end handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DataLoad(_) => "DATA_LOAD_ERROR",
            Self::DegenerateInput { .. } => "DEGENERATE_INPUT",
            Self::ModelFit(_) => "MODEL_FIT_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether this error should abort startup rather than a single request.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DataLoad(_) | Self::Polars(_) => true,
            Self::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

impl Serialize for AdvisorError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("AdvisorError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for advisor operations.
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| AdvisorError::Polars(e).with_context(context))
    }
}
