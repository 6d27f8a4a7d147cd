//! Failure taxonomy for a single upload.
//!
//! Every failure is caught at the upload boundary and reported as an [`ImportError`]. Callers that render
//! a response only need [`ImportError::kind`] (a stable category) and the `Display` message, which is
//! written to be shown to the uploader as-is.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    /// Missing or misnamed file, or content that cannot be read as CSV.
    #[error("{0}")]
    InputRejected(String),
    /// The CSV parsed but carries no data rows.
    #[error("CSV is empty")]
    EmptyInput,
    #[error("Error saving audit log: {0}")]
    AuditWrite(String),
    #[error("Error creating dynamic table: {0}")]
    SchemaCreation(String),
    #[error("Error loading rows into {table}: {message}")]
    DataLoad { table: String, message: String },
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImportError::InputRejected(_) | ImportError::EmptyInput => ErrorKind::InputRejected,
            ImportError::AuditWrite(_) => ErrorKind::AuditWrite,
            ImportError::SchemaCreation(_) => ErrorKind::SchemaCreation,
            ImportError::DataLoad { .. } => ErrorKind::DataLoad,
        }
    }

    pub fn response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            kind: self.kind(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputRejected,
    AuditWrite,
    SchemaCreation,
    DataLoad,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InputRejected => "input_rejected",
            ErrorKind::AuditWrite => "audit_write",
            ErrorKind::SchemaCreation => "schema_creation",
            ErrorKind::DataLoad => "data_load",
        }
    }

    /// Input problems are the uploader's to fix; everything else happened on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::InputRejected)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_classified_as_rejected_input() {
        let err = ImportError::EmptyInput;
        assert_eq!(err.kind(), ErrorKind::InputRejected);
        assert!(err.kind().is_client_error());
        assert_eq!(err.to_string(), "CSV is empty");
    }

    #[test]
    fn response_serializes_kind_as_snake_case() {
        let err = ImportError::DataLoad {
            table: "data_people_20240101_000000".to_string(),
            message: "type mismatch".to_string(),
        };
        let json = serde_json::to_value(err.response()).unwrap();
        assert_eq!(json["kind"], "data_load");
        assert_eq!(
            json["error"],
            "Error loading rows into data_people_20240101_000000: type mismatch"
        );
        assert!(!err.kind().is_client_error());
    }
}
