//! Error types for the lease normalization pipeline.
//!
//! Errors are serializable so they can be emitted as part of the JSON
//! output of the CLI.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the normalization pipeline.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A record had a zero weekly payment and the policy is to fail.
    #[error("Weekly payment is zero at row {row}; payback period is undefined")]
    DivisionByZero { row: usize },

    /// Sanitizing raw values failed.
    #[error("Failed to clean data: {0}")]
    CleaningFailed(String),

    /// The zip reference table could not be loaded.
    #[error("Failed to load zip reference '{path}': {reason}")]
    ZipReferenceLoad { path: String, reason: String },

    /// Report generation failed.
    #[error("Failed to generate report: {0}")]
    ReportGenerationFailed(String),

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
        source: Box<NormalizeError>,
    },
}

impl NormalizeError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        NormalizeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for machine consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::DivisionByZero { .. } => "DIVISION_BY_ZERO",
            Self::CleaningFailed(_) => "CLEANING_FAILED",
            Self::ZipReferenceLoad { .. } => "ZIP_REFERENCE_LOAD_FAILED",
            Self::ReportGenerationFailed(_) => "REPORT_GENERATION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether the error came from the data itself rather than the environment.
    pub fn is_data_error(&self) -> bool {
        match self {
            Self::ColumnNotFound(_) | Self::DivisionByZero { .. } => true,
            Self::WithContext { source, .. } => source.is_data_error(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for NormalizeError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("NormalizeError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for normalization operations.
pub type Result<T> = std::result::Result<T, NormalizeError>;

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
        self.map_err(|e| NormalizeError::Polars(e).with_context(context))
    }
}
