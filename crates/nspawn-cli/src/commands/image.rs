//! `nspawnctl image` — Show an image known to the machine registry.

use clap::Args;
use nspawn_machine::bus::MachineBus;
use nspawn_machine::descriptor::ImageDescriptor;
use nspawn_runtime::busctl::BusctlBus;

use crate::output::{format_bytes, format_usec, yes_no};

/// Arguments for the `image` command.
#[derive(Args, Debug)]
pub struct ImageArgs {
    /// Image name.
    pub name: String,

    /// Print the descriptor as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `image` command.
///
/// # Errors
///
/// Returns an error if the registry does not know the image.
pub async fn execute(args: ImageArgs) -> anyhow::Result<()> {
    let bus = BusctlBus::new();
    let bag = bus.describe_image(&args.name).await?;
    let image = ImageDescriptor::decode(&bag)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&image)?);
        return Ok(());
    }
    println!("{:<12} {}", "NAME", image.name);
    println!("{:<12} {}", "TYPE", image.kind);
    println!("{:<12} {}", "PATH", image.path);
    println!("{:<12} {}", "READ-ONLY", yes_no(image.read_only));
    println!("{:<12} {}", "USAGE", format_bytes(image.usage));
    println!("{:<12} {}", "LIMIT", format_bytes(image.limit));
    println!("{:<12} {}", "CREATED", format_usec(image.creation_timestamp));
    println!("{:<12} {}", "MODIFIED", format_usec(image.modification_timestamp));
    Ok(())
}
