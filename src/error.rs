//! Unified error handling for the sameas crate
//!
//! Every fallible operation in the library returns [`Result`], whose error
//! type wraps the storage driver, I/O and configuration failures together with
//! the precondition violations the matching algorithms can detect.
//!
//! # Architecture
//!
//! - [`SameAsErrorTrait`] - Common interface used by the driver and the CLI
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum
//!
//! # Usage
//!
//! ```rust,ignore
//! use sameas::error::{Error, SameAsErrorTrait};
//!
//! fn report(err: &Error) {
//!     if err.is_recoverable() {
//!         eprintln!("retry the stage: {err}");
//!     } else {
//!         eprintln!("fatal: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

use crate::models::Side;
use crate::storage::FailedRow;

/// Common trait for sameas error types
pub trait SameAsErrorTrait: std::error::Error {
    /// Check if this error is recoverable (re-running the stage may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration and validation errors, raised before any stage runs
    Config,
    /// Storage backend read/write errors
    Storage,
    /// Caller bugs: missing referential data, unknown columns, bad records
    Precondition,
    /// File system and source dump errors
    Io,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Storage => "storage",
            Self::Precondition => "precondition",
            Self::Io => "io",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the sameas crate
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization errors (run report)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// A sort or lookup referenced a column the table does not have
    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// A stored row could not be decoded into its record type
    #[error("Invalid record in table '{table}': {reason}")]
    InvalidRecord { table: String, reason: String },

    /// A pair references an entity that has no coverage row
    #[error("No coverage row for {side} entity '{entity_id}'")]
    MissingCoverage { side: Side, entity_id: String },

    /// A batch write partially failed and the failure policy is `abort`
    #[error("Batch insert into '{table}' rejected {} row(s)", failed.len())]
    BatchRejected { table: String, failed: Vec<FailedRow> },

    /// Matcher name not present in the registry
    #[error("Unknown matcher '{name}'. Valid options: {}", valid.join(", "))]
    UnknownMatcher { name: String, valid: Vec<String> },

    /// Error raised while running a named pipeline stage
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    /// A blocking stage task panicked or was cancelled
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SameAsErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Database(_) => true, // locked / busy databases clear up on re-run
            Self::Io(_) => true,
            Self::BatchRejected { .. } => true,
            Self::Join(_) => true,
            Self::Stage { source, .. } => source.is_recoverable(),
            Self::Json(_)
            | Self::Config(_)
            | Self::UnknownColumn { .. }
            | Self::InvalidRecord { .. }
            | Self::MissingCoverage { .. }
            | Self::UnknownMatcher { .. }
            | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Database(_) | Self::BatchRejected { .. } => ErrorCategory::Storage,
            Self::Io(_) | Self::Json(_) => ErrorCategory::Io,
            Self::Config(_) | Self::UnknownMatcher { .. } => ErrorCategory::Config,
            Self::UnknownColumn { .. }
            | Self::InvalidRecord { .. }
            | Self::MissingCoverage { .. } => ErrorCategory::Precondition,
            Self::Stage { source, .. } => source.category(),
            Self::Join(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Attach the name of the pipeline stage that produced this error
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    /// Name of the failing stage, if the error carries one
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
