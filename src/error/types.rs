//! Database error types

use std::error::Error as StdError;
use std::fmt::Debug;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::operation::BuildError;
use thiserror::Error;

/// Error code DynamoDB reports for a missing table or index.
pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";

/// Error code DynamoDB reports when a condition expression fails.
pub const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailedException";

/// Error code DynamoDB reports when creating a table that already exists.
pub const RESOURCE_IN_USE: &str = "ResourceInUseException";

/// Error code DynamoDB reports for malformed requests.
pub const VALIDATION: &str = "ValidationException";

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// Failure reported by the service (or by the transport before a
    /// response arrived, in which case the code is `Unknown`).
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No table is bound")]
    NoTable,

    #[error("Timeout waiting for table '{table}' to become active")]
    TableActivationTimeout { table: String },

    #[error("Malformed item: {0}")]
    MalformedItem(String),
}

impl DbError {
    /// Build a service error from a code and message.
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Short error code, suitable for a structured log field.
    pub fn code(&self) -> &str {
        match self {
            DbError::Service { code, .. } => code,
            DbError::InvalidRequest(_) => "InvalidRequest",
            DbError::NoTable => "NoTable",
            DbError::TableActivationTimeout { .. } => "TableActivationTimeout",
            DbError::MalformedItem(_) => "MalformedItem",
        }
    }

    /// Human readable message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            DbError::Service { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == RESOURCE_NOT_FOUND
    }

    pub fn is_conditional_check_failed(&self) -> bool {
        self.code() == CONDITIONAL_CHECK_FAILED
    }
}

impl<E, R> From<SdkError<E, R>> for DbError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    fn from(err: SdkError<E, R>) -> Self {
        let code = err.code().unwrap_or("Unknown").to_string();
        let message = match err.message() {
            Some(message) => message.to_string(),
            None => DisplayErrorContext(&err).to_string(),
        };
        DbError::Service { code, message }
    }
}

impl From<BuildError> for DbError {
    fn from(err: BuildError) -> Self {
        DbError::InvalidRequest(err.to_string())
    }
}
