//! Launch driver that ties configuration, images, and task handles together.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use nix::sys::signal::Signal;
use nspawn_common::config::DriverConfig;
use nspawn_common::error::{NspawnError, Result};
use nspawn_common::types::TaskId;
use nspawn_machine::bus::MachineBus;
use nspawn_machine::config::ContainerConfig;
use nspawn_machine::descriptor::MachineDescriptor;
use nspawn_machine::poll::{self, ProgressReporter, TracingReporter};

use crate::executor::ExecutorFactory;
use crate::handle::{TaskHandle, TaskStatus};

/// Coordinates container launches and tracks their handles.
pub struct Driver {
    config: DriverConfig,
    bus: Arc<dyn MachineBus>,
    launcher: Arc<dyn ExecutorFactory>,
    reporter: Arc<dyn ProgressReporter>,
    tasks: RwLock<HashMap<TaskId, Arc<TaskHandle>>>,
    launching: Mutex<HashSet<TaskId>>,
}

/// Claim on a task id for the duration of one launch.
struct Reservation<'a> {
    launching: &'a Mutex<HashSet<TaskId>>,
    id: TaskId,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let _ = self
            .launching
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl Driver {
    /// Creates a driver that reports pull progress through `tracing`.
    #[must_use]
    pub fn new(
        config: DriverConfig,
        bus: Arc<dyn MachineBus>,
        launcher: Arc<dyn ExecutorFactory>,
    ) -> Self {
        Self {
            config,
            bus,
            launcher,
            reporter: Arc::new(TracingReporter),
            tasks: RwLock::new(HashMap::new()),
            launching: Mutex::new(HashSet::new()),
        }
    }

    /// Replaces the pull progress reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Validates, downloads, and resolves a configuration, then renders its
    /// argument list.
    ///
    /// An empty machine name is replaced with `<task name>-<id prefix>` so
    /// the container can be found on the bus later.
    ///
    /// # Errors
    ///
    /// Returns the first validation, download, resolution, or render error.
    pub async fn prepare(
        &self,
        id: &TaskId,
        name: &str,
        mut config: ContainerConfig,
    ) -> Result<(ContainerConfig, Vec<String>)> {
        config.validate()?;
        if config.machine_name.is_empty() {
            config.machine_name = default_machine_name(id, name);
        }

        if let Some(download) = &config.image_download {
            if self.config.allow_image_download {
                let request = download.pull_request(&config.image)?;
                poll::download_image(self.bus.as_ref(), &request, self.reporter.as_ref()).await?;
            } else {
                tracing::warn!(image = %config.image, "image downloads disabled, skipping");
            }
        }

        let _ = config.resolve(self.bus.as_ref()).await?;
        let args = config.args()?;
        tracing::debug!(id = %id, ?args, "rendered nspawn arguments");
        Ok((config, args))
    }

    /// Launches a container and starts monitoring it.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already in use, if preparation fails,
    /// or if the container tool cannot be started.
    pub async fn launch(
        &self,
        id: TaskId,
        name: &str,
        config: ContainerConfig,
    ) -> Result<Arc<TaskHandle>> {
        let _reservation = self.reserve(&id)?;
        let (config, args) = self.prepare(&id, name, config).await?;

        let executor = self.launcher.start(&args, &BTreeMap::new())?;
        let handle = Arc::new(TaskHandle::new(
            id.clone(),
            name,
            config.machine_name.clone(),
            executor,
            Utc::now(),
        ));
        let _ = handle.start_monitoring();
        let _ = self.write().insert(id.clone(), Arc::clone(&handle));
        tracing::info!(id = %id, name, machine = %config.machine_name, "task launched");
        Ok(handle)
    }

    /// Waits for a machine to register and returns its descriptor.
    ///
    /// # Errors
    ///
    /// Returns a timeout error if the machine does not register within the
    /// configured deadline.
    pub async fn describe(&self, machine_name: &str) -> Result<MachineDescriptor> {
        poll::describe_machine(self.bus.as_ref(), machine_name, self.config.describe_timeout())
            .await
    }

    /// Returns the handle of a tracked task.
    #[must_use]
    pub fn handle(&self, id: &TaskId) -> Option<Arc<TaskHandle>> {
        self.read().get(id).cloned()
    }

    /// Returns status snapshots of all tracked tasks, ordered by id.
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskStatus> {
        let mut all: Vec<_> = self.read().values().map(|h| h.status()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Sends a signal to a running task.
    ///
    /// # Errors
    ///
    /// Returns [`NspawnError::NotFound`] for an unknown task, or the
    /// executor's error if delivery fails.
    pub fn signal(&self, id: &TaskId, signal: Signal) -> Result<bool> {
        self.handle(id).ok_or_else(|| task_not_found(id))?.signal(signal)
    }

    /// Stops tracking a finished task.
    ///
    /// # Errors
    ///
    /// Returns [`NspawnError::NotFound`] for an unknown task and an executor
    /// error if the task is still running.
    pub fn remove(&self, id: &TaskId) -> Result<TaskStatus> {
        let mut tasks = self.write();
        let handle = tasks.get(id).ok_or_else(|| task_not_found(id))?;
        if handle.is_running() {
            return Err(NspawnError::Executor {
                message: format!("task {id} is still running"),
            });
        }
        let status = handle.status();
        let _ = tasks.remove(id);
        Ok(status)
    }

    /// Claims `id` until the returned reservation is dropped.
    ///
    /// The launching set is locked before the task map so an id is never
    /// free in both at once while a launch is in flight.
    fn reserve(&self, id: &TaskId) -> Result<Reservation<'_>> {
        let mut launching = self.launching.lock().unwrap_or_else(PoisonError::into_inner);
        if launching.contains(id) || self.read().contains_key(id) {
            return Err(NspawnError::Executor {
                message: format!("task {id} already exists"),
            });
        }
        let _ = launching.insert(id.clone());
        Ok(Reservation {
            launching: &self.launching,
            id: id.clone(),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TaskId, Arc<TaskHandle>>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TaskId, Arc<TaskHandle>>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn default_machine_name(id: &TaskId, name: &str) -> String {
    let prefix: String = id.as_str().chars().filter(char::is_ascii_alphanumeric).take(8).collect();
    format!("{name}-{prefix}")
}

fn task_not_found(id: &TaskId) -> NspawnError {
    NspawnError::NotFound {
        kind: "task",
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_machine_name_uses_id_prefix() {
        let id = TaskId::new("0f3c9a1e-77aa-4bcd-9e21-0a1b2c3d4e5f");
        assert_eq!(default_machine_name(&id, "web"), "web-0f3c9a1e");
    }

    #[test]
    fn default_machine_name_skips_separators() {
        let id = TaskId::new("ab-cd-ef-gh-ij");
        assert_eq!(default_machine_name(&id, "db"), "db-abcdefgh");
    }
}
