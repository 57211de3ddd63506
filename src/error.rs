//! Error types for the record repository

use thiserror::Error;

use crate::tid::KeySpaceExhausted;

/// Result type for schema loading and resolution
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Result type for repository operations
pub type RepoResult<T> = std::result::Result<T, RepoError>;

/// Schema registry errors
///
/// All of these are raised while building a registry and are fatal to startup.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema conflict: {id} is declared more than once")]
    SchemaConflict { id: String },

    #[error("Unknown schema: {id}")]
    UnknownSchema { id: String },

    #[error("Unknown reference in {schema} at {path}: {reference}")]
    UnknownReference {
        schema: String,
        path: String,
        reference: String,
    },

    #[error("Invalid reference in {schema} at {path}: {reference} is a {found}, expected {expected}")]
    InvalidReference {
        schema: String,
        path: String,
        reference: String,
        expected: String,
        found: String,
    },

    #[error("Invalid schema identifier: {id}")]
    InvalidIdentifier { id: String },

    #[error("Invalid schema format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single rule violation found while validating a value
///
/// Every variant carries the dotted path of the offending field; `$` is the root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{path}: missing required field")]
    MissingField { path: String },

    #[error("{path}: field is not declared by the schema")]
    UnknownField { path: String },

    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("{path}: {value:?} is not one of {allowed:?}")]
    ValueNotAllowed {
        path: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("{path}: record is typed {found:?}, expected {expected:?}")]
    DiscriminatorMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("{path}: {reason}")]
    OutOfRange { path: String, reason: String },

    #[error("{path}: schema {id} is not registered")]
    UnknownSchema { path: String, id: String },
}

impl ValidationError {
    /// Path of the field that violated a rule
    pub fn path(&self) -> &str {
        match self {
            ValidationError::MissingField { path }
            | ValidationError::UnknownField { path }
            | ValidationError::TypeMismatch { path, .. }
            | ValidationError::ValueNotAllowed { path, .. }
            | ValidationError::DiscriminatorMismatch { path, .. }
            | ValidationError::OutOfRange { path, .. }
            | ValidationError::UnknownSchema { path, .. } => path,
        }
    }

    /// Short name of the violated rule
    pub fn rule(&self) -> &'static str {
        match self {
            ValidationError::MissingField { .. } => "MissingField",
            ValidationError::UnknownField { .. } => "UnknownField",
            ValidationError::TypeMismatch { .. } => "TypeMismatch",
            ValidationError::ValueNotAllowed { .. } => "ValueNotAllowed",
            ValidationError::DiscriminatorMismatch { .. } => "DiscriminatorMismatch",
            ValidationError::OutOfRange { .. } => "OutOfRange",
            ValidationError::UnknownSchema { .. } => "UnknownSchema",
        }
    }
}

/// Record repository errors
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] ValidationError),

    #[error("Unknown collection: {collection}")]
    UnknownCollection { collection: String },

    #[error("Record not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    #[error("Invalid record key: {key:?}")]
    InvalidKey { key: String },

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error(transparent)]
    KeySpaceExhausted(#[from] KeySpaceExhausted),
}
