//! Error and result types for the schema mapping layer.
//!
//! All fallible operations in this crate return [`DocmapResult<T>`]. The error
//! taxonomy separates definition-time failures (raised while building a
//! schema, never recoverable), validation failures (raised on attribute
//! assignment or explicit validation), connection failures, and operation
//! failures (always delivered as the error half of an executor result, never
//! thrown past the operation boundary).

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors produced by the schema and execution layers.
#[derive(Error, Debug)]
pub enum DocmapError {
    /// Schema declaration is invalid: field-name collision, missing manager,
    /// bad field configuration. Raised while the schema type is being built.
    #[error("Definition error: {0}")]
    Definition(String),
    /// A value failed type coercion, a choices check, a bound, or a custom
    /// validator.
    #[error("Validation error: {0}")]
    Validation(String),
    /// One or more required fields were left empty.
    /// Collected in a single pass, not fail-fast per field.
    #[error("Required fields {0:?} must have non-empty values")]
    MissingFields(Vec<String>),
    /// The named schema has no field under the given name.
    /// The first argument is the schema name, the second the field name.
    #[error("Schema \"{0}\" has no field \"{1}\"")]
    UnknownField(String, String),
    /// The process-wide connection was never initialized, or establishing it
    /// failed. Wraps the underlying cause as text.
    #[error("Connection error: {0}")]
    Connection(String),
    /// A failure inside the asynchronous executor (dispatch, cursor reshape,
    /// materialization, or model mapping).
    #[error("Operation error: {0}")]
    Operation(String),
    /// A single-result lookup matched more than one record.
    #[error("Multiple results found in \"{0}\"")]
    MultipleResults(String),
    /// Serialization to or from the wire format failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The driver or backend does not support the requested verb.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// Cooperative retry signal for optimistic-concurrency protocols.
    ///
    /// The [`optimistic`](crate::retry::optimistic) helper retries on this
    /// error regardless of its `retry_on_error` flag.
    #[error("Retry requested")]
    Retry,
}

impl DocmapError {
    /// Returns `true` if this is the distinguished retry signal.
    pub fn is_retry(&self) -> bool {
        matches!(self, DocmapError::Retry)
    }
}

/// A specialized `Result` type for schema mapping operations.
pub type DocmapResult<T> = Result<T, DocmapError>;

impl From<SerdeJsonError> for DocmapError {
    fn from(err: SerdeJsonError) -> Self {
        DocmapError::Serialization(err.to_string())
    }
}
