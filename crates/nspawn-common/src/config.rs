//! Driver-level configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DESCRIBE_TIMEOUT_SECS, NSPAWN_BINARY};
use crate::error::{NspawnError, Result};

/// Root configuration for the driver runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Deadline for machine descriptor lookups, in seconds.
    pub describe_timeout_secs: u64,
    /// Whether `image_download` blocks in task configs are honoured.
    pub allow_image_download: bool,
    /// Container-spawning tool to execute.
    pub nspawn_binary: String,
}

impl DriverConfig {
    /// Returns the descriptor lookup deadline.
    #[must_use]
    pub const fn describe_timeout(&self) -> Duration {
        Duration::from_secs(self.describe_timeout_secs)
    }

    /// Loads a driver configuration from a YAML or JSON file.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| NspawnError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(config)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            describe_timeout_secs: DEFAULT_DESCRIBE_TIMEOUT_SECS,
            allow_image_download: true,
            nspawn_binary: NSPAWN_BINARY.to_string(),
        }
    }
}
