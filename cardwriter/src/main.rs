use anyhow::{Context, Result};
use cardwriter_core::{DevicePath, DiskBackend, get_drive_size, platform, resolve_physical_path};
use clap::{Args, Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

mod logging;

// 1 MiB, a whole number of sectors for every sector size in use.
const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Parser)]
#[command(name = "cardwriter")]
#[command(about = "A safe, interactive raw image writer for SD cards", version)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TransferArgs {
    /// Volume on the target card (e.g. E: or \\.\E:)
    #[arg(short = 'd', long = "volume", required = true)]
    volume: String,

    /// Bytes moved per raw read or write
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long = "yes")]
    yes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an image to the card behind a volume
    Write {
        /// Image file to write
        #[arg(required = true)]
        image: PathBuf,

        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// Read the card behind a volume to an image file
    Read {
        /// Output image file
        #[arg(required = true)]
        image: PathBuf,

        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// Show the physical disk a volume lives on
    Resolve {
        /// Volume to resolve (e.g. E:)
        volume: String,
    },
    /// Show the capacity of the disk a volume lives on
    Size {
        /// Volume on the card (e.g. E:)
        volume: String,
    },
}

fn size_gb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

/// Presents a final "Yes/No" confirmation to the user.
fn confirm_operation(prompt: &str) -> Result<bool> {
    let confirmation = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(confirmation)
}

fn transfer_bar(prefix: &'static str, color: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_prefix(prefix);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{prefix:12}} [{{elapsed_precise}}] [{{bar:40.{color}/black}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}})"
            ))
            .unwrap()
            .progress_chars("■ "),
    );
    pb
}

/// Resolves the volume and reports which disk it is on and how big that disk is.
fn describe_target(backend: &dyn DiskBackend, volume: &DevicePath) -> Result<(DevicePath, u64)> {
    let physical = resolve_physical_path(backend, volume)
        .with_context(|| format!("could not find the disk behind {volume}"))?;
    let size = get_drive_size(backend, &physical)
        .with_context(|| format!("could not read the size of {physical}"))?;
    Ok((physical, size))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // This flag allows for graceful cancellation of operations.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    // Set up the Ctrl+C handler to toggle the `running` flag.
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let backend = platform::native_backend()?;
    let backend = backend.as_ref();

    match cli.command {
        Commands::Write { image, transfer } => {
            let volume = DevicePath::volume(&transfer.volume);
            let (physical, size) = describe_target(backend, &volume)?;

            println!(
                "{} This will erase all data on '{}' ({:.1} GB).",
                style("WARNING:").red().bold(),
                physical,
                size_gb(size),
            );
            println!("  Volume: {}", style(&volume).cyan());
            println!("  Disk:   {}", style(&physical).cyan());
            println!("  Image:  {}", style(image.display()).cyan());
            println!();

            if !transfer.yes && !confirm_operation("Are you sure you want to proceed?")? {
                println!("Write operation cancelled.");
                return Ok(());
            }

            println!();

            let write_pb = transfer_bar("Writing", "green");
            let on_write_start = |len| write_pb.set_length(len);
            let on_write_progress = |bytes| write_pb.set_position(bytes);
            let on_log = |msg: &str| debug!("{msg}");

            let result = cardwriter_core::write::run(
                backend,
                &image,
                &volume,
                transfer.chunk_size,
                running,
                on_write_start,
                on_write_progress,
                on_log,
            );

            match result {
                Ok(_) => {
                    write_pb.finish_with_message("Write complete.");
                    println!(
                        "\n✨ Successfully wrote {} to {}.",
                        style(image.display()).cyan(),
                        style(&physical).cyan()
                    );
                }
                Err(e) => {
                    write_pb.finish_with_message("❌ Operation failed.");
                    return Err(e);
                }
            }
        }
        Commands::Read { image, transfer } => {
            let volume = DevicePath::volume(&transfer.volume);
            let (physical, size) = describe_target(backend, &volume)?;

            println!(
                "This will read {:.1} GB from '{}'.",
                size_gb(size),
                physical
            );
            println!("  Volume: {}", style(&volume).cyan());
            println!("  Output: {}", style(image.display()).cyan());
            println!();

            if !transfer.yes && !confirm_operation("Are you sure you want to proceed?")? {
                println!("Read operation cancelled.");
                return Ok(());
            }

            println!();

            let read_pb = transfer_bar("Reading", "green");
            let on_read_start = |len| read_pb.set_length(len);
            let on_progress = |bytes| read_pb.set_position(bytes);
            let on_log = |msg: &str| debug!("{msg}");

            let result = cardwriter_core::read::run(
                backend,
                &volume,
                &image,
                transfer.chunk_size,
                running,
                on_read_start,
                on_progress,
                on_log,
            );

            match result {
                Ok(_) => {
                    read_pb.finish_with_message("Read complete.");
                    println!(
                        "\n✨ Successfully read {} to {}.",
                        style(&physical).cyan(),
                        style(image.display()).cyan()
                    );
                }
                Err(e) => {
                    read_pb.finish_with_message("❌ Operation failed.");
                    return Err(e);
                }
            }
        }
        Commands::Resolve { volume } => {
            let volume = DevicePath::volume(&volume);
            let physical = resolve_physical_path(backend, &volume)?;
            println!("{volume} -> {physical}");
        }
        Commands::Size { volume } => {
            let volume = DevicePath::volume(&volume);
            let (physical, size) = describe_target(backend, &volume)?;
            println!(
                "  {:<24} {:>16} bytes  {:>8.1} GB",
                physical.as_str(),
                size,
                size_gb(size)
            );
        }
    }

    Ok(())
}
