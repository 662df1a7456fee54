//! `nspawnctl run` — Launch a container and wait for it to exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use nix::sys::signal::Signal;
use nspawn_common::config::DriverConfig;
use nspawn_common::types::TaskId;
use nspawn_machine::config::ContainerConfig;
use nspawn_runtime::busctl::BusctlBus;
use nspawn_runtime::driver::Driver;
use nspawn_runtime::executor::NspawnLauncher;

use crate::output::format_exit;

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Container configuration file (YAML or JSON).
    pub config: PathBuf,

    /// Task name, used to derive the machine name when none is configured.
    #[arg(long, default_value = "nspawn")]
    pub name: String,

    /// Task id; generated when omitted.
    #[arg(long)]
    pub id: Option<String>,

    /// Wait for the machine to register and print its leader PID.
    #[arg(long)]
    pub describe: bool,
}

/// Executes the `run` command.
///
/// Ctrl+C forwards `SIGTERM` to the container process; a second Ctrl+C
/// sends `SIGKILL`.
///
/// # Errors
///
/// Returns an error if the launch fails or the container exits unsuccessfully.
pub async fn execute(args: RunArgs, config: DriverConfig) -> anyhow::Result<()> {
    let container = ContainerConfig::load(&args.config)?;
    let id = args.id.map_or_else(TaskId::generate, TaskId::new);

    let launcher = NspawnLauncher::new(config.nspawn_binary.clone());
    let driver = Driver::new(config, Arc::new(BusctlBus::new()), Arc::new(launcher));
    let handle = driver.launch(id, &args.name, container).await?;
    println!("Started {} as machine {}", handle.id(), handle.machine_name());

    if args.describe {
        match driver.describe(handle.machine_name()).await {
            Ok(machine) => {
                println!("Machine {} registered, leader PID {}", machine.name, machine.leader);
            }
            Err(e) => {
                tracing::warn!(
                    machine = %handle.machine_name(),
                    error = %e,
                    "machine did not register"
                );
            }
        }
    }

    let mut ticker = tokio::time::interval(STATUS_POLL_INTERVAL);
    let mut interrupts = 0_u32;
    while handle.is_running() {
        tokio::select! {
            _ = ticker.tick() => {}
            res = tokio::signal::ctrl_c() => {
                res?;
                interrupts += 1;
                let signal = if interrupts > 1 { Signal::SIGKILL } else { Signal::SIGTERM };
                tracing::info!(id = %handle.id(), signal = signal.as_str(), "forwarding interrupt");
                let _ = handle.signal(signal)?;
            }
        }
    }

    let status = driver.remove(handle.id())?;
    let result = status.exit_result.unwrap_or_default();
    println!("Task {} {}", status.id, format_exit(&result));
    if !result.successful() {
        anyhow::bail!("task {} did not exit cleanly", status.id);
    }
    Ok(())
}
