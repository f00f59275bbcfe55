//! Error types for the aviary library.

use std::time::Duration;
use thiserror::Error;

/// Exit code for configuration and strategy resolution errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for cluster connection errors.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for schema discovery and statement preparation errors.
pub const EXIT_SCHEMA_ERROR: u8 = 3;
/// Exit code for query execution errors and timeouts.
pub const EXIT_QUERY_ERROR: u8 = 4;
/// Exit code for a panicked task surfacing as a phase error.
pub const EXIT_TASK_ERROR: u8 = 5;
/// Exit code for I/O errors (missing aviary file, unwritable output).
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code for JSON serialization errors.
pub const EXIT_SERIALIZATION_ERROR: u8 = 8;
/// Exit code for a run interrupted by a signal.
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for sampling and verification.
#[derive(Error, Debug)]
pub enum AviaryError {
    /// Configuration error (invalid YAML, bad filter, out-of-range value)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown or unusable sampler/verifier strategy
    #[error("Build configuration error: {0}")]
    BuildConfiguration(String),

    /// Cluster could not be reached or rejected the session
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema metadata missing, unreadable or unsupported
    #[error("Schema error: {0}")]
    Schema(String),

    /// A statement could not be compiled by the cluster
    #[error("Failed to prepare statement for {origin}: {message}")]
    Preparation { origin: String, message: String },

    /// A query failed at execution time
    #[error("Query failed for {context}: {message}")]
    QueryExecution { context: String, message: String },

    /// A value could not be converted between a canary and a column type
    #[error("Cannot convert value for {context}: {message}")]
    Conversion { context: String, message: String },

    /// A row did not carry every declared primary-key field
    #[error("Incomplete primary key for {origin}: missing {}", .missing.join(", "))]
    IncompletePrimaryKey { origin: String, missing: Vec<String> },

    /// A task exceeded its time allowance
    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    /// A task panicked instead of returning
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Run cancelled")]
    Cancelled,
}

impl AviaryError {
    /// Create a Preparation error for an origin.
    pub fn preparation(origin: impl ToString, message: impl ToString) -> Self {
        AviaryError::Preparation {
            origin: origin.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a QueryExecution error with the statement or unit it belongs to.
    pub fn query(context: impl ToString, message: impl ToString) -> Self {
        AviaryError::QueryExecution {
            context: context.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a Conversion error.
    pub fn conversion(context: impl ToString, message: impl ToString) -> Self {
        AviaryError::Conversion {
            context: context.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an IncompletePrimaryKey error.
    pub fn incomplete(origin: impl ToString, missing: Vec<String>) -> Self {
        AviaryError::IncompletePrimaryKey {
            origin: origin.to_string(),
            missing,
        }
    }

    /// Whether retrying the same unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AviaryError::QueryExecution { .. } | AviaryError::Timeout(_)
        )
    }

    /// Whether the error disqualifies the whole origin rather than one unit.
    pub fn rejects_origin(&self) -> bool {
        matches!(self, AviaryError::Schema(_) | AviaryError::Preparation { .. })
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AviaryError::Config(_) | AviaryError::BuildConfiguration(_) | AviaryError::Yaml(_) => {
                EXIT_CONFIG_ERROR
            }
            AviaryError::Connection(_) => EXIT_CONNECTION_ERROR,
            AviaryError::Schema(_) | AviaryError::Preparation { .. } => EXIT_SCHEMA_ERROR,
            AviaryError::QueryExecution { .. }
            | AviaryError::Conversion { .. }
            | AviaryError::IncompletePrimaryKey { .. }
            | AviaryError::Timeout(_) => EXIT_QUERY_ERROR,
            AviaryError::TaskPanicked(_) => EXIT_TASK_ERROR,
            AviaryError::Io(_) => EXIT_IO_ERROR,
            AviaryError::Json(_) => EXIT_SERIALIZATION_ERROR,
            AviaryError::Cancelled => EXIT_CANCELLED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for aviary operations.
pub type Result<T> = std::result::Result<T, AviaryError>;
