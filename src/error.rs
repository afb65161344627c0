//! Error types for signify-keystrokes

use serde::Serialize;
use thiserror::Error;

/// One offending field of a rejected keystroke batch.
///
/// `index` points at the event inside the batch; it is `None` for problems
/// with the batch as a whole (missing owner, empty batch, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn batch(field: &str, message: impl Into<String>) -> Self {
        Self {
            index: None,
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn event(index: usize, field: &str, message: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Every field error found while validating a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| match e.index {
                Some(i) => format!("events[{}].{}: {}", i, e.field, e.message),
                None => format!("{}: {}", e.field, e.message),
            })
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Owner not found")]
    OwnerNotFound,

    #[error("Owner is not publicly visible")]
    OwnerNotPublic,

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Duplicate sequence numbers for owner: {sequence_numbers:?}")]
    DuplicateSequence { sequence_numbers: Vec<i64> },

    #[error("Aggregation inconsistency: {0}")]
    AggregationInconsistency(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// True for the two owner failures a public caller must not tell apart
    pub fn is_owner_hidden(&self) -> bool {
        matches!(self, StorageError::OwnerNotFound | StorageError::OwnerNotPublic)
    }
}

impl From<ValidationErrors> for StorageError {
    fn from(errors: ValidationErrors) -> Self {
        StorageError::Validation(errors)
    }
}
