use std::path::PathBuf;
use thiserror::Error;

use crate::ai::SuggesterError;
use crate::diff::DiffError;
use crate::encoder::EncodeError;
use crate::interview::InterviewError;
use crate::lifecycle::LifecycleError;
use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum TripwireError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Interview error: {0}")]
    Interview(#[from] InterviewError),

    #[error("Suggestion error: {0}")]
    Suggester(#[from] SuggesterError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Inconsistent state: {0}")]
    Inconsistency(String),
}

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input; reject, never retry.
    Validation,
    /// A collaborator failed; record and retry later.
    Transient,
    /// Integration or programming error; fatal to the request.
    Inconsistency,
    /// The interview was driven out of order.
    Protocol,
}

impl TripwireError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TripwireError::Diff(_) | TripwireError::Validation(_) => ErrorClass::Validation,
            TripwireError::Encode(e) if e.is_validation() => ErrorClass::Validation,
            TripwireError::Encode(_) => ErrorClass::Transient,
            TripwireError::Config(_) | TripwireError::Secret(_) => ErrorClass::Inconsistency,
            TripwireError::Lifecycle(LifecycleError::EmptyInstructions) => ErrorClass::Validation,
            TripwireError::Lifecycle(_) => ErrorClass::Inconsistency,
            TripwireError::Interview(
                InterviewError::IllegalTransition { .. } | InterviewError::NotInProgress(_),
            ) => ErrorClass::Protocol,
            TripwireError::Interview(InterviewError::InvalidMarker(_)) => ErrorClass::Inconsistency,
            TripwireError::Interview(_) => ErrorClass::Transient,
            TripwireError::Suggester(e) if e.is_transient() => ErrorClass::Transient,
            TripwireError::Suggester(_) => ErrorClass::Inconsistency,
            TripwireError::Process(ProcessError::UnsupportedFormat(_)) => ErrorClass::Validation,
            TripwireError::Process(_) => ErrorClass::Transient,
            TripwireError::Storage(StorageError::InvalidHandle(_)) => ErrorClass::Inconsistency,
            TripwireError::Storage(_) | TripwireError::Database(_) => ErrorClass::Transient,
            TripwireError::NotFound { .. } => ErrorClass::Validation,
            TripwireError::Inconsistency(_) => ErrorClass::Inconsistency,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Text extraction failed: {0}")]
    TextExtraction(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No stored document for handle '{0}'")]
    NotFound(String),

    #[error("Invalid storage handle '{0}'")]
    InvalidHandle(String),

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, TripwireError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::InterviewState;

    #[test]
    fn test_error_classes() {
        let e: TripwireError = EncodeError::SubstringMismatch {
            index: 0,
            expected: "6".to_string(),
            found: "7".to_string(),
        }
        .into();
        assert_eq!(e.class(), ErrorClass::Validation);

        let e: TripwireError = SuggesterError::Unavailable("connection refused".to_string()).into();
        assert_eq!(e.class(), ErrorClass::Transient);
        assert!(e.is_retryable());

        let e: TripwireError = LifecycleError::DocumentNotCompleted(
            crate::lifecycle::DocumentStatus::Failed,
        )
        .into();
        assert_eq!(e.class(), ErrorClass::Inconsistency);

        let e: TripwireError = InterviewError::IllegalTransition {
            from: InterviewState::Completed,
            to: InterviewState::Skipped,
        }
        .into();
        assert_eq!(e.class(), ErrorClass::Protocol);
    }

    #[test]
    fn test_not_found_message() {
        let e = TripwireError::NotFound {
            entity: "assignment",
            id: "a1".to_string(),
        };
        assert_eq!(e.to_string(), "assignment 'a1' not found");
    }
}
