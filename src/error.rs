use thiserror::Error;

use crate::types::FieldKind;

/// Crate-wide error type.
///
/// Connection-liveness failures are repaired internally by the pool and never
/// surface through this enum; everything else reaches the caller unchanged.
#[derive(Debug, Error)]
pub enum QuerysetError {
    #[cfg(feature = "mysql")]
    #[error(transparent)]
    Driver(#[from] mysql_async::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("unsupported field type {kind} for field `{field}`")]
    UnsupportedFieldType { field: String, kind: FieldKind },

    #[error("SQL formatting error: {0}")]
    SqlFormatting(String),

    #[error("no row found for id {0}")]
    NotFound(i64),

    #[error("SQL execution error: {0}")]
    Execution(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}
