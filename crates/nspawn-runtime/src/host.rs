//! Host capability detection.

use std::path::Path;

use nspawn_common::constants::{MACHINECTL_BINARY, NSPAWN_BINARY, SYSTEMD_RUNTIME_DIR};
use nspawn_common::error::{NspawnError, Result};
use serde::Serialize;
use tokio::process::Command;

/// Information about the host's nspawn support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    /// Host CPU architecture.
    pub arch: String,
    /// Whether `systemd-nspawn` is on `PATH`.
    pub nspawn_available: bool,
    /// Whether `machinectl` is on `PATH`.
    pub machinectl_available: bool,
    /// Whether systemd is the running init system.
    pub systemd_running: bool,
    /// Major systemd version, if it could be determined.
    pub systemd_version: Option<String>,
}

/// Checks that the container tool and the machine manager CLI are installed.
///
/// # Errors
///
/// Returns [`NspawnError::NotFound`] naming the first missing binary.
pub fn is_installed() -> Result<()> {
    for binary in [NSPAWN_BINARY, MACHINECTL_BINARY] {
        let _ = which::which(binary).map_err(|_| NspawnError::NotFound {
            kind: "binary",
            id: binary.to_string(),
        })?;
    }
    Ok(())
}

/// Returns whether systemd is the running init system.
#[must_use]
pub fn is_running_systemd() -> bool {
    Path::new(SYSTEMD_RUNTIME_DIR).is_dir()
}

/// Extracts the major version from `systemctl --version` output or from a
/// manager `Version` property such as `"242.19-1"`.
#[must_use]
pub fn parse_systemd_version(output: &str) -> Option<String> {
    let first = output.lines().next()?.trim();
    let token = first
        .strip_prefix("systemd ")
        .map_or(first, |rest| rest.split_whitespace().next().unwrap_or_default())
        .trim_matches('"');
    let major: String = token.chars().take_while(char::is_ascii_digit).collect();
    (!major.is_empty()).then_some(major)
}

/// Returns the major version of the running systemd.
///
/// # Errors
///
/// Returns an error if systemd is not running, `systemctl` cannot be run,
/// or its output has no version.
pub async fn systemd_version() -> Result<String> {
    if !is_running_systemd() {
        return Err(NspawnError::NotFound {
            kind: "running systemd",
            id: SYSTEMD_RUNTIME_DIR.to_string(),
        });
    }
    let output = Command::new("systemctl")
        .arg("--version")
        .output()
        .await
        .map_err(|e| NspawnError::Io {
            path: "systemctl".into(),
            source: e,
        })?;
    let text = String::from_utf8_lossy(&output.stdout);
    parse_systemd_version(&text).ok_or_else(|| NspawnError::NotFound {
        kind: "systemd version",
        id: text.lines().next().unwrap_or_default().to_string(),
    })
}

/// Collects host capability information.
pub async fn host_info() -> HostInfo {
    let systemd_version = match systemd_version().await {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(error = %e, "systemd version unavailable");
            None
        }
    };
    HostInfo {
        arch: std::env::consts::ARCH.to_string(),
        nspawn_available: which::which(NSPAWN_BINARY).is_ok(),
        machinectl_available: which::which(MACHINECTL_BINARY).is_ok(),
        systemd_running: is_running_systemd(),
        systemd_version,
    }
}
