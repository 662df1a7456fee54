//! CLI command definitions and dispatch.

pub mod check;
pub mod describe;
pub mod image;
pub mod pull;
pub mod render;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nspawn_common::config::DriverConfig;
use nspawn_common::constants::BIN_NAME;

/// nspawnctl — launch and inspect systemd-nspawn containers.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Driver configuration file (YAML, or JSON by extension).
    #[arg(long, global = true, env = "NSPAWN_DRIVER_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report whether this host can run nspawn containers.
    Check(check::CheckArgs),
    /// Validate a container config and print the nspawn invocation.
    Render(render::RenderArgs),
    /// Launch a container and wait for it to exit.
    Run(run::RunArgs),
    /// Show the runtime properties of a registered machine.
    Describe(describe::DescribeArgs),
    /// Show the properties of a registered image.
    Image(image::ImageArgs),
    /// Download an image through the import service.
    Pull(pull::PullArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command
/// fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading driver config");
            DriverConfig::load(path)?
        }
        None => DriverConfig::default(),
    };
    match cli.command {
        Command::Check(args) => check::execute(args).await,
        Command::Render(args) => render::execute(args).await,
        Command::Run(args) => run::execute(args, config).await,
        Command::Describe(args) => describe::execute(args, &config).await,
        Command::Image(args) => image::execute(args).await,
        Command::Pull(args) => pull::execute(args).await,
    }
}
