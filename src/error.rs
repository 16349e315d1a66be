// ABOUTME: Error types for the table copier
// ABOUTME: Separates configuration, precondition, service, timeout and cancellation failures

use std::fmt;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = CopyError> = std::result::Result<T, E>;

/// Which side of the copy a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Destination => "destination",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CopyError {
    /// Invalid configuration, detected before any network call.
    #[error("Configuration error: {field} {message}")]
    Configuration { field: String, message: String },

    #[error("Precondition failed: {side} table {table} is not active (status: {status})")]
    Precondition {
        side: Side,
        table: String,
        status: String,
    },

    #[error("Service error: {operation} on table {table} failed: {source}")]
    Service {
        operation: &'static str,
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("Timed out: {operation} on table {table} gave up after {attempts} attempts")]
    Timeout {
        operation: &'static str,
        table: String,
        attempts: u32,
    },

    #[error("Cancelled: {operation} on table {table} was interrupted")]
    Cancelled {
        operation: &'static str,
        table: String,
    },
}

impl CopyError {
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        CopyError::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn service(
        operation: &'static str,
        table: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        CopyError::Service {
            operation,
            table: table.into(),
            source: source.into(),
        }
    }

    /// Configuration and precondition failures are raised before any data moves.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            CopyError::Configuration { .. } | CopyError::Precondition { .. }
        )
    }
}
