//! `nspawnctl describe` — Show a registered machine.

use std::time::Duration;

use clap::Args;
use nspawn_common::config::DriverConfig;
use nspawn_machine::poll;
use nspawn_runtime::busctl::BusctlBus;

use crate::output::format_usec;

/// Arguments for the `describe` command.
#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Machine name.
    pub machine: String,

    /// Seconds to wait for the machine to register.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the descriptor as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `describe` command.
///
/// # Errors
///
/// Returns an error if the machine does not register in time.
pub async fn execute(args: DescribeArgs, config: &DriverConfig) -> anyhow::Result<()> {
    let timeout = args
        .timeout
        .map_or_else(|| config.describe_timeout(), Duration::from_secs);
    let bus = BusctlBus::new();
    let machine = poll::describe_machine(&bus, &args.machine, timeout).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&machine)?);
        return Ok(());
    }
    println!("{:<12} {}", "NAME", machine.name);
    println!("{:<12} {}", "CLASS", machine.class);
    println!("{:<12} {}", "STATE", machine.state);
    println!("{:<12} {}", "LEADER", machine.leader);
    println!("{:<12} {}", "SERVICE", machine.service);
    println!("{:<12} {}", "UNIT", machine.unit);
    println!("{:<12} {}", "ROOT", machine.root_directory);
    println!("{:<12} {}", "SINCE", format_usec(machine.timestamp));
    Ok(())
}
