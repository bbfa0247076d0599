// SPDX-License-Identifier: GPL-3.0-only

use barcode_scanner::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "barcode-scanner")]
#[command(about = "Scan barcodes from images and simulated camera feeds")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan still image files (directories are expanded)
    Scan {
        /// Image files or directories
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Stream a directory of images through the live analyzer
    Watch {
        /// Directory of images to replay as camera frames
        dir: PathBuf,

        /// Frames per second delivered by the virtual camera
        #[arg(short, long)]
        fps: Option<u32>,

        /// Save an evidence JPEG for every detection into this directory
        #[arg(short, long)]
        evidence_dir: Option<PathBuf>,

        /// Pixel format the virtual camera produces (NV21, NV12, I420, RGBA, GRAY8, ...)
        #[arg(short, long, default_value = "NV21")]
        pixel_format: String,
    },

    /// List barcode formats and their detector codes
    Formats,

    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=barcode_scanner=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Scan { files } => cli::scan_files(&files, &config),
        Commands::Watch {
            dir,
            fps,
            evidence_dir,
            pixel_format,
        } => cli::watch_directory(&dir, fps, evidence_dir, &pixel_format, &config),
        Commands::Formats => cli::list_formats(&config),
        Commands::Config { save } => cli::show_config(&config, cli.config, save),
    }
}
