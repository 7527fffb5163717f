//! Command-line argument parsing for strata.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::Config;

/// What the binary should do once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Run the tile generation HTTP server.
    Serve,
    /// Stream tiles around a moving viewpoint without a renderer.
    Stream,
}

/// strata command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "strata", about = "Procedural voxel terrain generation and streaming")]
pub struct CliArgs {
    /// Run mode.
    #[arg(value_enum, default_value_t = Mode::Serve)]
    pub mode: Mode,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Root endpoint of the generation service. `local` generates in-process.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Load radius in tiles.
    #[arg(long)]
    pub radius: Option<i32>,

    /// Number of pool workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Number of streaming ticks to run in `stream` mode.
    #[arg(long, default_value_t = 200)]
    pub ticks: u32,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(ref endpoint) = args.endpoint {
            self.world.root_endpoint = endpoint.clone();
        }
        if let Some(radius) = args.radius {
            self.world.radius = radius;
        }
        if let Some(workers) = args.workers {
            self.pool.num_workers = workers.max(1);
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
