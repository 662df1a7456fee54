//! Unified error types for the nspawn driver workspace.
//!
//! Every library crate returns [`NspawnError`]; the CLI wraps it in
//! `anyhow` at the edge.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum NspawnError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A container configuration violates one of its invariants.
    #[error("invalid {field} {value:?}: {reason}")]
    Validation {
        /// Configuration key that failed validation.
        field: &'static str,
        /// Offending value as configured.
        value: String,
        /// Which rule was violated.
        reason: &'static str,
    },

    /// The argument list could not be rendered.
    #[error("cannot render nspawn arguments: {message}")]
    Render {
        /// Description of the missing input.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The process executor failed to start, wait on, or signal a process.
    #[error("executor error: {message}")]
    Executor {
        /// Description of the executor failure.
        message: String,
    },

    /// A polling operation exceeded its deadline.
    #[error("timed out while {what}: {}", describe_last(.last))]
    Timeout {
        /// Operation that timed out.
        what: String,
        /// Error reported by the last completed attempt, if it failed.
        #[source]
        last: Option<Box<NspawnError>>,
    },

    /// The system management bus reported a failure.
    #[error("bus error: {message}")]
    Bus {
        /// Message returned by the bus or the bus client.
        message: String,
    },

    /// A bus property was missing or had an unexpected type.
    #[error("cannot decode property {field}: expected {expected}")]
    Decode {
        /// Property key.
        field: &'static str,
        /// Expected value shape.
        expected: &'static str,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML deserialization failed.
    #[error("yaml error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

#[allow(clippy::ref_option)]
fn describe_last(last: &Option<Box<NspawnError>>) -> String {
    last.as_ref()
        .map_or_else(|| "no failed attempt recorded".to_string(), ToString::to_string)
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, NspawnError>;
