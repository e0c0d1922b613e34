use std::fmt;

use hv_core::CoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorDbError {
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),
    #[error("No current table selected")]
    NoCurrentTable,
    #[error("Schema mismatch for field '{field}': expected {expected}, got {got}")]
    SchemaMismatch { field: String, expected: String, got: String },
    #[error("Dimension mismatch for field '{field}': expected {expected}, got {got}")]
    DimensionMismatch { field: String, expected: usize, got: usize },
    #[error("At most one of include_fields / exclude_fields may be set")]
    ConflictingProjection,
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Invalid metric type: {0}")]
    InvalidMetric(String),
    #[error("Type mismatch for field '{field}': {reason}")]
    TypeMismatch { field: String, reason: String },
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Duplicate document id: {0}")]
    DuplicateId(String),
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    #[error("Concurrent modification of document: {0}")]
    ConcurrentModification(String),
    #[error("Generated id collided twice: {0}")]
    IdCollision(String),
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("Search deadline exceeded")]
    DeadlineExceeded,
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VectorDbError>;

impl From<serde_json::Error> for VectorDbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Coarse error classes callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before anything was mutated.
    Validation,
    NotFound,
    Concurrency,
    Capacity,
    Internal,
}

impl VectorDbError {
    pub fn kind(&self) -> ErrorKind {
        use VectorDbError::*;
        match self {
            TableNotFound(_) | DocumentNotFound(_) => ErrorKind::NotFound,
            TableAlreadyExists(_)
            | NoCurrentTable
            | SchemaMismatch { .. }
            | DimensionMismatch { .. }
            | ConflictingProjection
            | UnknownField(_)
            | InvalidMetric(_)
            | TypeMismatch { .. }
            | InvalidValue { .. }
            | InvalidFilter(_)
            | InvalidRequest(_)
            | DuplicateId(_) => ErrorKind::Validation,
            ConcurrentModification(_) | IdCollision(_) => ErrorKind::Concurrency,
            CapacityExceeded(_) | DeadlineExceeded => ErrorKind::Capacity,
            Core(e) => match e {
                CoreError::InvalidConfig(_)
                | CoreError::InvalidValue { .. }
                | CoreError::InvalidMetric(_)
                | CoreError::InvalidDataType(_) => ErrorKind::Validation,
                _ => ErrorKind::Internal,
            },
            Storage(_) | Serialization(_) | Io(_) | Other(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> ResultCode {
        match self.kind() {
            ErrorKind::Validation => ResultCode::ValidationError,
            ErrorKind::NotFound => ResultCode::NotFound,
            ErrorKind::Concurrency => ResultCode::ConcurrencyError,
            ErrorKind::Capacity => ResultCode::CapacityError,
            ErrorKind::Internal => ResultCode::InternalError,
        }
    }

    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue { field: field.into(), reason: reason.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Success,
    ValidationError,
    NotFound,
    ConcurrencyError,
    CapacityError,
    InternalError,
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::ValidationError => "validation_error",
            Self::NotFound => "not_found",
            Self::ConcurrencyError => "concurrency_error",
            Self::CapacityError => "capacity_error",
            Self::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

/// Structured outcome surfaced to callers in place of a raw error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: ResultCode,
    pub message: String,
}

impl Status {
    pub fn ok() -> Self {
        Self { code: ResultCode::Success, message: String::new() }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ResultCode::Success
    }

    pub fn from_result<T>(res: &Result<T>) -> Self {
        match res {
            Ok(_) => Self::ok(),
            Err(e) => Self::from(e),
        }
    }
}

impl From<&VectorDbError> for Status {
    fn from(e: &VectorDbError) -> Self {
        Self { code: e.code(), message: e.to_string() }
    }
}
