//! Domain primitive types used across the nspawn driver workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NspawnError;

/// Unique identifier for a driver task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new task ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random task ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a container-backed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// The container process has been started and not yet reaped.
    Running,
    /// The container process exited and its exit status was collected.
    Exited,
    /// Waiting on the container process failed.
    Unknown,
}

impl TaskState {
    /// Returns true for `Exited` and `Unknown`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Outcome of a terminated task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitResult {
    /// Exit code reported by the process.
    pub exit_code: i32,
    /// Signal that terminated the process, `0` if none.
    pub signal: i32,
    /// Why the process could not be waited on.
    pub error: Option<String>,
}

impl ExitResult {
    /// Returns true if the process exited cleanly with status zero.
    #[must_use]
    pub const fn successful(&self) -> bool {
        self.exit_code == 0 && self.signal == 0 && self.error.is_none()
    }
}

/// Format of an image fetched by the import service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// A tarball holding a directory tree.
    Tar,
    /// A raw disk image.
    Raw,
}

impl ImageKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Raw => "raw",
        }
    }
}

impl FromStr for ImageKind {
    type Err = NspawnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tar" => Ok(Self::Tar),
            "raw" => Ok(Self::Raw),
            other => Err(NspawnError::Validation {
                field: "image_download.type",
                value: other.to_string(),
                reason: "unsupported image type, must be one of raw, tar",
            }),
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the import service verifies a downloaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// No verification.
    No,
    /// Verify against a published checksum.
    Checksum,
    /// Verify a detached signature.
    Signature,
}

impl VerifyMode {
    /// Returns the wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Checksum => "checksum",
            Self::Signature => "signature",
        }
    }
}

impl FromStr for VerifyMode {
    type Err = NspawnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no" => Ok(Self::No),
            "checksum" => Ok(Self::Checksum),
            "signature" => Ok(Self::Signature),
            other => Err(NspawnError::Validation {
                field: "image_download.verify",
                value: other.to_string(),
                reason: "must be one of no, checksum, signature",
            }),
        }
    }
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
