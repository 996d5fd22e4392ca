//! Error types shared by the Lexigraph crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that are not specific to the job queue.
///
/// Queue failures live in `lexigraph_jobs::JobError`, which converts from
/// this type.
#[derive(Error, Debug)]
pub enum LexigraphError {
    /// A request or value failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LexigraphError {
    /// Stable code for machine-readable output.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Splits a `field: problem; field: problem` validation message into
    /// per-field entries. Other variants have none.
    #[must_use]
    pub fn field_errors(&self) -> Vec<FieldError> {
        let Self::Validation(message) = self else {
            return Vec::new();
        };
        message
            .split("; ")
            .filter_map(|part| part.split_once(": "))
            .map(|(field, problem)| FieldError {
                field: field.trim().to_string(),
                message: problem.trim().to_string(),
            })
            .collect()
    }
}

/// One field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Serializable form of a [`LexigraphError`], printed by command-line tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl From<&LexigraphError> for ErrorReport {
    fn from(error: &LexigraphError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            fields: error.field_errors(),
        }
    }
}
