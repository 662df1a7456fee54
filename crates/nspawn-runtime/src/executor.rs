//! Process executor capability.
//!
//! A [`TaskHandle`](crate::handle::TaskHandle) owns exactly one
//! [`Executor`]; the monitor waits on it once and callers may signal it.

use std::collections::BTreeMap;
use std::os::unix::process::ExitStatusExt;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use nspawn_common::error::{NspawnError, Result};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessState {
    /// Exit code, `-1` if the process was killed by a signal.
    pub exit_code: i32,
    /// Terminating signal, `0` if the process exited on its own.
    pub signal: i32,
    /// When the exit was observed.
    pub time: DateTime<Utc>,
}

/// A started process.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Blocks until the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be waited on.
    async fn wait(&self) -> Result<ProcessState>;

    /// Sends a signal to the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    fn signal(&self, signal: Signal) -> Result<()>;

    /// Returns the PID of the process, if known.
    fn pid(&self) -> Option<u32>;
}

/// Starts processes.
pub trait ExecutorFactory: Send + Sync {
    /// Starts the container tool with `argv` and extra environment `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn start(&self, argv: &[String], env: &BTreeMap<String, String>) -> Result<Box<dyn Executor>>;
}

/// Spawns the container tool as a child process.
#[derive(Debug, Clone)]
pub struct NspawnLauncher {
    binary: String,
}

impl NspawnLauncher {
    /// Creates a launcher for the given binary name or path.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for NspawnLauncher {
    fn default() -> Self {
        Self::new(nspawn_common::constants::NSPAWN_BINARY)
    }
}

impl ExecutorFactory for NspawnLauncher {
    fn start(&self, argv: &[String], env: &BTreeMap<String, String>) -> Result<Box<dyn Executor>> {
        let child = Command::new(&self.binary)
            .args(argv)
            .envs(env)
            .spawn()
            .map_err(|e| NspawnError::Executor {
                message: format!("failed to spawn {}: {e}", self.binary),
            })?;
        let pid = child.id();
        tracing::info!(binary = %self.binary, pid, args = ?argv, "spawned container process");
        Ok(Box::new(ProcessExecutor {
            pid: AtomicU32::new(pid.unwrap_or(REAPED)),
            child: Mutex::new(child),
        }))
    }
}

/// Stored in place of a PID once the child has been reaped.
const REAPED: u32 = 0;

/// Executor backed by a child process.
///
/// The PID is cleared as soon as the child is reaped, so a recycled PID is
/// never signalled.
#[derive(Debug)]
pub struct ProcessExecutor {
    pid: AtomicU32,
    child: Mutex<Child>,
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn wait(&self) -> Result<ProcessState> {
        let mut child = self.child.lock().await;
        let waited = child.wait().await;
        let pid = self.pid.swap(REAPED, Ordering::SeqCst);
        drop(child);
        let status = waited.map_err(|e| NspawnError::Executor {
            message: format!("failed to wait on pid {pid}: {e}"),
        })?;
        Ok(ProcessState {
            exit_code: status.code().unwrap_or(-1),
            signal: status.signal().unwrap_or(0),
            time: Utc::now(),
        })
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        let pid = self.pid().ok_or_else(|| NspawnError::Executor {
            message: "process has already been reaped".into(),
        })?;
        let raw = i32::try_from(pid).map_err(|_| NspawnError::Executor {
            message: format!("pid {pid} out of range"),
        })?;
        nix::sys::signal::kill(Pid::from_raw(raw), signal).map_err(|e| NspawnError::Executor {
            message: format!("failed to send {signal} to pid {pid}: {e}"),
        })?;
        tracing::info!(pid, %signal, "signalled container process");
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid.load(Ordering::SeqCst)).filter(|&pid| pid != REAPED)
    }
}
