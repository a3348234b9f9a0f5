//! Structured error type shared by the store, node map and config service.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Rejected before touching the store
    Validation,

    // Store-level outcomes
    NotFound,
    VersionConflict,
    AlreadyExists,
    NotEmpty,

    // Stored payload could not be decoded
    MalformedData,

    // Backend or internal failures
    Store,
    Internal,
}

/// Error returned by every fallible operation in this crate.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct JonesError {
    pub code: ErrorCode,
    pub message: String,
    /// Store path (or environment) the error refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl JonesError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            details: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// True if this error carries the given code.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    // Convenience constructors

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, reason)
    }

    pub fn invalid_path(path: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::Validation,
            format!("Invalid path '{}': {}", path, reason),
        )
        .with_path(path)
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("Node not found: {}", path)).with_path(path)
    }

    pub fn no_association(hostname: &str) -> Self {
        Self::new(
            ErrorCode::NotFound,
            format!("No association for host: {}", hostname),
        )
    }

    pub fn version_conflict(path: &str, expected: i64, actual: i64) -> Self {
        Self::new(
            ErrorCode::VersionConflict,
            format!(
                "Version conflict on {}: expected {}, found {}",
                path, expected, actual
            ),
        )
        .with_path(path)
    }

    pub fn already_exists(path: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyExists,
            format!("Node already exists: {}", path),
        )
        .with_path(path)
    }

    pub fn not_empty(path: &str) -> Self {
        Self::new(
            ErrorCode::NotEmpty,
            format!("Node has children: {}", path),
        )
        .with_path(path)
    }

    pub fn malformed(path: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::MalformedData,
            format!("Malformed data at {}", path),
        )
        .with_path(path)
        .with_details(reason.to_string())
    }

    pub fn store(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Store, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Internal, err.to_string())
    }
}

impl From<rusqlite::Error> for JonesError {
    fn from(err: rusqlite::Error) -> Self {
        JonesError::store(err)
    }
}

impl From<refinery::Error> for JonesError {
    fn from(err: refinery::Error) -> Self {
        JonesError::store(err).with_details("schema migration failed")
    }
}

impl From<serde_json::Error> for JonesError {
    fn from(err: serde_json::Error) -> Self {
        JonesError::new(ErrorCode::MalformedData, err.to_string())
    }
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, JonesError>;
