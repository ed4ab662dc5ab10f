// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use edge_viewer::backends::camera::CaptureBackendType;
use edge_viewer::config::{Config, PermissionPolicy};

mod cli;
mod terminal;

#[derive(Parser)]
#[command(name = "edge-viewer")]
#[command(about = "Live camera edge detection in the terminal")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the terminal viewer (default)
    Run(RunArgs),

    /// List available V4L2 cameras
    List,

    /// Open the camera, report the negotiated resolution, and close it
    Probe(SourceArgs),
}

/// Capture source selection, overriding the config file
#[derive(Args, Clone, Default)]
struct SourceArgs {
    /// Capture backend (v4l2 or synthetic)
    #[arg(short, long)]
    backend: Option<CaptureBackendType>,

    /// V4L2 device node
    #[arg(short, long)]
    device: Option<String>,

    /// Requested capture width
    #[arg(long)]
    width: Option<u32>,

    /// Requested capture height
    #[arg(long)]
    height: Option<u32>,

    /// Frame rate of the synthetic source
    #[arg(long)]
    source_fps: Option<u32>,
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Render cadence in frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Camera permission at launch (ask, granted or denied)
    #[arg(long)]
    permission: Option<PermissionPolicy>,

    /// Write the effective settings back to the config file
    #[arg(long)]
    save_config: bool,
}

impl SourceArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(device) = &self.device {
            config.device_path = device.clone();
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fps) = self.source_fps {
            config.synthetic_fps = fps;
        }
    }
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        self.source.apply(config);
        if let Some(fps) = self.fps {
            config.render_fps = fps;
        }
        if let Some(permission) = self.permission {
            config.permission = permission;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=edge_viewer=debug, RUST_LOG=info
    // Logs go to stderr so they stay out of the terminal viewer
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load();

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            args.apply(&mut config);
            if args.save_config {
                config.save()?;
            }
            terminal::run(config)
        }
        Commands::List => Ok(cli::list_cameras()?),
        Commands::Probe(args) => {
            args.apply(&mut config);
            Ok(cli::probe(&config)?)
        }
    }
}
