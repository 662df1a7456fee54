//! `nspawnctl pull` — Download an image through the import service.

use clap::Args;
use nspawn_common::types::{ImageKind, VerifyMode};
use nspawn_machine::bus::PullRequest;
use nspawn_machine::poll::{self, TracingReporter};
use nspawn_runtime::busctl::BusctlBus;

/// Arguments for the `pull` command.
#[derive(Args, Debug)]
pub struct PullArgs {
    /// URL of the image archive.
    pub url: String,

    /// Local name to register the image under.
    pub name: String,

    /// Image format: `tar` or `raw`.
    #[arg(long = "type", default_value = "tar")]
    pub kind: ImageKind,

    /// Verification mode: `no`, `checksum`, or `signature`.
    #[arg(long, default_value = "no")]
    pub verify: VerifyMode,

    /// Replace an existing image with the same name.
    #[arg(long)]
    pub force: bool,
}

/// Executes the `pull` command.
///
/// Blocks until the transfer leaves the import service's active list.
///
/// # Errors
///
/// Returns an error if the import service refuses the pull.
pub async fn execute(args: PullArgs) -> anyhow::Result<()> {
    let request = PullRequest {
        url: args.url,
        name: args.name,
        verify: args.verify,
        kind: args.kind,
        force: args.force,
    };
    let bus = BusctlBus::new();
    poll::download_image(&bus, &request, &TracingReporter).await?;
    println!("Pulled image {}", request.name);
    Ok(())
}
