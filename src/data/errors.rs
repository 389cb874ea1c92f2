use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error types for the prediction pipeline, uploads, dataset and history files
#[derive(Error, Debug)]
pub enum ChurnError {
    #[error("Missing resource: {what} not found at {}", path.display())]
    MissingResource { what: String, path: PathBuf },

    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: String, value: String },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Label encoder is not fitted: {0}")]
    UnfittedEncoder(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid model artifact {}: {message}", path.display())]
    Artifact { path: PathBuf, message: String },

    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations
pub type ChurnResult<T> = Result<T, ChurnError>;

/// Coarse error classes surfaced to the interaction that caused them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    MissingResource,
    MalformedInput,
    UnfittedDependency,
    SchemaMismatch,
    ContractViolation,
    UnknownModel,
    Unauthenticated,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::MissingResource => "missing_resource",
            ErrorCategory::MalformedInput => "malformed_input",
            ErrorCategory::UnfittedDependency => "unfitted_dependency",
            ErrorCategory::SchemaMismatch => "schema_mismatch",
            ErrorCategory::ContractViolation => "contract_violation",
            ErrorCategory::UnknownModel => "unknown_model",
            ErrorCategory::Unauthenticated => "unauthenticated",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl ChurnError {
    /// Classify the error for rendering and status mapping
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChurnError::MissingResource { .. } => ErrorCategory::MissingResource,
            ChurnError::MalformedInput { .. }
            | ChurnError::InvalidValue { .. }
            | ChurnError::Csv(_)
            | ChurnError::Spreadsheet(_) => ErrorCategory::MalformedInput,
            ChurnError::MissingField(_) => ErrorCategory::ContractViolation,
            ChurnError::SchemaMismatch(_) => ErrorCategory::SchemaMismatch,
            ChurnError::UnfittedEncoder(_) => ErrorCategory::UnfittedDependency,
            ChurnError::UnknownModel(_) => ErrorCategory::UnknownModel,
            ChurnError::Unauthenticated(_) => ErrorCategory::Unauthenticated,
            ChurnError::Artifact { .. } | ChurnError::Serialization(_) | ChurnError::Io(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Create a missing-resource error for a named file
    pub fn missing_resource<S: Into<String>>(what: S, path: &Path) -> Self {
        ChurnError::MissingResource {
            what: what.into(),
            path: path.to_path_buf(),
        }
    }

    /// Create a malformed-input error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        ChurnError::MalformedInput {
            message: message.into(),
        }
    }

    /// Create an invalid-value error with field context
    pub fn invalid_value<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        ChurnError::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an artifact error for the file at `path`
    pub fn artifact<S: Into<String>>(path: &Path, message: S) -> Self {
        ChurnError::Artifact {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Open a file for reading, reporting a missing file as a missing resource
pub fn open_existing(path: &Path, what: &str) -> ChurnResult<std::fs::File> {
    std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ChurnError::missing_resource(what, path)
        } else {
            ChurnError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_missing_resource() {
        let err = open_existing(Path::new("/definitely/not/here.csv"), "dataset").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MissingResource);
        assert!(err.to_string().contains("dataset"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            ChurnError::MissingField("tenure".into()).category(),
            ErrorCategory::ContractViolation
        );
        assert_eq!(
            ChurnError::invalid_value("Contract", "Weekly").category(),
            ErrorCategory::MalformedInput
        );
        assert_eq!(
            ChurnError::UnfittedEncoder("no classes".into()).category(),
            ErrorCategory::UnfittedDependency
        );
        assert_eq!(ErrorCategory::SchemaMismatch.as_str(), "schema_mismatch");
    }
}
