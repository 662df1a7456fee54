//! `nspawnctl check` — Report host support for nspawn containers.

use clap::Args;
use nspawn_runtime::host;

use crate::output::yes_no;

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `check` command.
///
/// # Errors
///
/// Returns an error if a required binary is missing from `PATH`.
pub async fn execute(args: CheckArgs) -> anyhow::Result<()> {
    let info = host::host_info().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{:<22} {}", "ARCH", info.arch);
        println!("{:<22} {}", "SYSTEMD RUNNING", yes_no(info.systemd_running));
        println!(
            "{:<22} {}",
            "SYSTEMD VERSION",
            info.systemd_version.as_deref().unwrap_or("-")
        );
        println!("{:<22} {}", "SYSTEMD-NSPAWN", yes_no(info.nspawn_available));
        println!("{:<22} {}", "MACHINECTL", yes_no(info.machinectl_available));
    }

    host::is_installed()?;
    Ok(())
}
