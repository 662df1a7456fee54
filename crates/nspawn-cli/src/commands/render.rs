//! `nspawnctl render` — Validate a container config and print its command line.

use std::path::PathBuf;

use clap::Args;
use nspawn_common::constants::NSPAWN_BINARY;
use nspawn_machine::config::ContainerConfig;
use nspawn_runtime::busctl::BusctlBus;

/// Arguments for the `render` command.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Container configuration file (YAML or JSON).
    pub config: PathBuf,

    /// Use this directory or file as the image instead of resolving it.
    #[arg(long)]
    pub image_path: Option<PathBuf>,

    /// Print one argument per line.
    #[arg(long)]
    pub lines: bool,
}

/// Executes the `render` command.
///
/// Images are resolved against the filesystem and then the machine
/// registry, unless `--image-path` is given. Downloads are never started.
///
/// # Errors
///
/// Returns an error if the config is invalid or the image cannot be found.
pub async fn execute(args: RenderArgs) -> anyhow::Result<()> {
    let mut config = ContainerConfig::load(&args.config)?;
    config.validate()?;

    let argv = match &args.image_path {
        Some(path) => config.render_with(path)?,
        None => {
            let bus = BusctlBus::new();
            let _ = config.resolve(&bus).await?;
            config.args()?
        }
    };

    if args.lines {
        for arg in &argv {
            println!("{arg}");
        }
    } else {
        println!("{NSPAWN_BINARY} {}", argv.join(" "));
    }
    Ok(())
}
