//! Task handle and its exit monitor.
//!
//! A handle starts in `Running`. Its monitor waits on the executor once and
//! moves the handle to `Exited` or `Unknown`; terminal states are final.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use nspawn_common::error::Result;
use nspawn_common::types::{ExitResult, TaskId, TaskState};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::executor::Executor;

/// Point-in-time view of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    /// Task identifier.
    pub id: TaskId,
    /// Task name.
    pub name: String,
    /// Machine name registered for the container.
    pub machine_name: String,
    /// Lifecycle phase.
    pub state: TaskState,
    /// When the container process was started.
    pub started_at: DateTime<Utc>,
    /// When the task reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Exit outcome, present once terminal.
    pub exit_result: Option<ExitResult>,
}

#[derive(Debug)]
struct Lifecycle {
    state: TaskState,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    exit_result: Option<ExitResult>,
}

/// Tracks one container-backed task.
pub struct TaskHandle {
    id: TaskId,
    name: String,
    machine_name: String,
    executor: Box<dyn Executor>,
    monitor_started: AtomicBool,
    wait_claimed: AtomicBool,
    lifecycle: RwLock<Lifecycle>,
}

impl TaskHandle {
    /// Creates a handle in the `Running` state for an already started
    /// executor. The monitor is not started.
    #[must_use]
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
        machine_name: impl Into<String>,
        executor: Box<dyn Executor>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            machine_name: machine_name.into(),
            executor,
            monitor_started: AtomicBool::new(false),
            wait_claimed: AtomicBool::new(false),
            lifecycle: RwLock::new(Lifecycle {
                state: TaskState::Running,
                started_at,
                completed_at: None,
                exit_result: None,
            }),
        }
    }

    /// Task identifier.
    #[must_use]
    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    /// Machine name registered for the container.
    #[must_use]
    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    /// PID of the container tool process, if known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.executor.pid()
    }

    /// Returns a snapshot of the task's state.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        let lc = self.read();
        TaskStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            machine_name: self.machine_name.clone(),
            state: lc.state,
            started_at: lc.started_at,
            completed_at: lc.completed_at,
            exit_result: lc.exit_result.clone(),
        }
    }

    /// Returns true while the container process has not been reaped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.read().state == TaskState::Running
    }

    /// Sends `signal` to the container process if the task is running.
    ///
    /// Returns whether a signal was sent.
    ///
    /// # Errors
    ///
    /// Returns the executor's error if delivery fails.
    pub fn signal(&self, signal: Signal) -> Result<bool> {
        if !self.is_running() {
            tracing::debug!(id = %self.id, %signal, "task not running, signal skipped");
            return Ok(false);
        }
        self.executor.signal(signal)?;
        Ok(true)
    }

    /// Spawns the exit monitor on the current tokio runtime.
    ///
    /// Returns `None` if the monitor was already started.
    pub fn start_monitoring(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.monitor_started.swap(true, Ordering::SeqCst) {
            tracing::warn!(id = %self.id, "monitor already started");
            return None;
        }
        let handle = Arc::clone(self);
        Some(tokio::spawn(async move { handle.run().await }))
    }

    /// Waits for the container process and records how it ended.
    ///
    /// Only the first call waits on the executor; later calls, or calls on
    /// a terminal handle, return immediately.
    pub async fn run(&self) {
        let terminal = self.read().state.is_terminal();
        if terminal || self.wait_claimed.swap(true, Ordering::SeqCst) {
            tracing::debug!(id = %self.id, "monitor already ran");
            return;
        }

        let outcome = self.executor.wait().await;

        let mut lc = self.write();
        if lc.state.is_terminal() {
            return;
        }
        match outcome {
            Ok(ps) => {
                lc.state = TaskState::Exited;
                lc.completed_at = Some(ps.time);
                lc.exit_result = Some(ExitResult {
                    exit_code: ps.exit_code,
                    signal: ps.signal,
                    error: None,
                });
                tracing::info!(
                    id = %self.id,
                    machine = %self.machine_name,
                    exit_code = ps.exit_code,
                    signal = ps.signal,
                    "task exited"
                );
            }
            Err(e) => {
                lc.state = TaskState::Unknown;
                lc.completed_at = Some(Utc::now());
                lc.exit_result = Some(ExitResult {
                    error: Some(e.to_string()),
                    ..ExitResult::default()
                });
                tracing::error!(
                    id = %self.id,
                    machine = %self.machine_name,
                    error = %e,
                    "waiting on task failed"
                );
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("machine_name", &self.machine_name)
            .field("lifecycle", &*self.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use nspawn_common::error::NspawnError;
    use tokio::sync::{Mutex, oneshot};

    use super::*;
    use crate::executor::ProcessState;

    struct ScriptedExecutor {
        outcome: Mutex<Option<oneshot::Receiver<Result<ProcessState>>>>,
        waits: Arc<AtomicUsize>,
        signals: std::sync::Mutex<Vec<Signal>>,
    }

    impl ScriptedExecutor {
        fn new() -> (Self, oneshot::Sender<Result<ProcessState>>, Arc<AtomicUsize>) {
            let (tx, rx) = oneshot::channel();
            let waits = Arc::new(AtomicUsize::new(0));
            let exec = Self {
                outcome: Mutex::new(Some(rx)),
                waits: Arc::clone(&waits),
                signals: std::sync::Mutex::new(Vec::new()),
            };
            (exec, tx, waits)
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn wait(&self) -> Result<ProcessState> {
            let _ = self.waits.fetch_add(1, Ordering::SeqCst);
            let rx = self.outcome.lock().await.take();
            match rx {
                Some(rx) => rx.await.unwrap_or_else(|_| {
                    Err(NspawnError::Executor {
                        message: "script dropped".into(),
                    })
                }),
                None => Err(NspawnError::Executor {
                    message: "already waited".into(),
                }),
            }
        }

        fn signal(&self, signal: Signal) -> Result<()> {
            self.signals.lock().unwrap().push(signal);
            Ok(())
        }

        fn pid(&self) -> Option<u32> {
            Some(4242)
        }
    }

    fn exit_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
    }

    fn handle(exec: ScriptedExecutor) -> Arc<TaskHandle> {
        Arc::new(TaskHandle::new(
            TaskId::new("task-1"),
            "web",
            "web-task-1",
            Box::new(exec),
            Utc::now(),
        ))
    }

    #[tokio::test]
    async fn new_handle_is_running_without_result() {
        let (exec, _tx, waits) = ScriptedExecutor::new();
        let h = handle(exec);

        let status = h.status();
        assert_eq!(status.state, TaskState::Running);
        assert!(h.is_running());
        assert!(status.completed_at.is_none());
        assert!(status.exit_result.is_none());
        assert_eq!(status.machine_name, "web-task-1");
        assert_eq!(h.pid(), Some(4242));
        assert_eq!(waits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_wait_transitions_to_exited() {
        let (exec, tx, _) = ScriptedExecutor::new();
        let h = handle(exec);
        let monitor = h.start_monitoring().expect("first start");

        tx.send(Ok(ProcessState {
            exit_code: 2,
            signal: 15,
            time: exit_time(),
        }))
        .expect("monitor is waiting");
        monitor.await.expect("monitor finished");

        let status = h.status();
        assert_eq!(status.state, TaskState::Exited);
        assert_eq!(status.completed_at, Some(exit_time()));
        let result = status.exit_result.expect("exit result");
        assert_eq!(result.exit_code, 2);
        assert_eq!(result.signal, 15);
        assert!(result.error.is_none());
        assert!(!h.is_running());
    }

    #[tokio::test]
    async fn failed_wait_transitions_to_unknown() {
        let (exec, tx, _) = ScriptedExecutor::new();
        let h = handle(exec);
        let before = Utc::now();
        let monitor = h.start_monitoring().expect("first start");

        tx.send(Err(NspawnError::Executor {
            message: "executor plugin crashed".into(),
        }))
        .expect("monitor is waiting");
        monitor.await.expect("monitor finished");

        let status = h.status();
        assert_eq!(status.state, TaskState::Unknown);
        assert!(status.completed_at.expect("completed") >= before);
        let error = status.exit_result.and_then(|r| r.error).expect("error recorded");
        assert!(error.contains("executor plugin crashed"));
    }

    #[tokio::test]
    async fn terminal_state_is_final() {
        let (exec, tx, waits) = ScriptedExecutor::new();
        let h = handle(exec);
        tx.send(Ok(ProcessState {
            exit_code: 0,
            signal: 0,
            time: exit_time(),
        }))
        .expect("send");

        h.run().await;
        let first = h.status();
        h.run().await;

        assert_eq!(h.status(), first);
        assert_eq!(first.state, TaskState::Exited);
        assert_eq!(waits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn monitor_starts_only_once() {
        let (exec, tx, waits) = ScriptedExecutor::new();
        let h = handle(exec);

        let monitor = h.start_monitoring().expect("first start");
        assert!(h.start_monitoring().is_none());

        tx.send(Ok(ProcessState {
            exit_code: 0,
            signal: 0,
            time: exit_time(),
        }))
        .expect("send");
        monitor.await.expect("monitor finished");
        assert_eq!(waits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_reads_do_not_wait_for_exit() {
        let (exec, tx, _) = ScriptedExecutor::new();
        let h = handle(exec);
        let monitor = h.start_monitoring().expect("first start");
        tokio::task::yield_now().await;

        for _ in 0..100 {
            assert!(h.is_running());
        }

        drop(tx);
        monitor.await.expect("monitor finished");
        assert_eq!(h.status().state, TaskState::Unknown);
    }

    #[tokio::test]
    async fn signal_is_forwarded_only_while_running() {
        let (exec, tx, _) = ScriptedExecutor::new();
        let h = handle(exec);
        assert!(h.signal(Signal::SIGTERM).expect("signal"));

        tx.send(Ok(ProcessState {
            exit_code: 0,
            signal: 15,
            time: exit_time(),
        }))
        .expect("send");
        h.run().await;

        assert!(!h.signal(Signal::SIGKILL).expect("signal"));
    }
}
