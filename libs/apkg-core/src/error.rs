//! Error types for apkg-core.

use serde::Serialize;
use thiserror::Error;

use crate::sqlite::SqliteError;

/// Result type alias using ImportError.
pub type Result<T> = std::result::Result<T, ImportError>;

/// Fatal conditions that abort an import.
///
/// Non-fatal conditions are never surfaced here; they are collected as
/// [`ImportWarning`](crate::types::ImportWarning)s on the result.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt database: {0}")]
    CorruptDatabase(String),

    #[error("schema parse error: {0}")]
    SchemaParseError(String),

    #[error("resource limit exceeded: {limit} (limit {max}, found {found})")]
    ResourceLimitExceeded {
        limit: &'static str,
        max: u64,
        found: u64,
    },

    #[error("note {note_id} has {found} fields but its model declares {expected}")]
    FieldCountMismatch {
        note_id: i64,
        expected: usize,
        found: usize,
    },
}

/// Stable classification of an [`ImportError`] for host-side messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedContainer,
    UnsupportedFormat,
    CorruptDatabase,
    SchemaParseError,
    ResourceLimitExceeded,
    FieldCountMismatch,
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedContainer(_) => ErrorKind::MalformedContainer,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::CorruptDatabase(_) => ErrorKind::CorruptDatabase,
            Self::SchemaParseError(_) => ErrorKind::SchemaParseError,
            Self::ResourceLimitExceeded { .. } => ErrorKind::ResourceLimitExceeded,
            Self::FieldCountMismatch { .. } => ErrorKind::FieldCountMismatch,
        }
    }

    /// True when the input was rejected for size rather than validity.
    pub fn is_resource_limit(&self) -> bool {
        self.kind() == ErrorKind::ResourceLimitExceeded
    }

    pub(crate) fn limit(limit: &'static str, max: u64, found: u64) -> Self {
        Self::ResourceLimitExceeded { limit, max, found }
    }
}

impl From<SqliteError> for ImportError {
    fn from(err: SqliteError) -> Self {
        Self::CorruptDatabase(err.to_string())
    }
}

impl From<zip::result::ZipError> for ImportError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::MalformedContainer(err.to_string())
    }
}
