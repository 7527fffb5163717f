//! strata: procedural voxel terrain generation server and streaming client.

mod platform;
mod stream;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use strata_config::{CliArgs, Config, Mode};
use strata_server::{GenerationServer, GenerationService};
use tracing::{error, info};

use platform::AppDirs;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let dirs = match AppDirs::resolve_or(args.config.as_deref()) {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Failed to resolve config directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut config = Config::load_or_create(&dirs.config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let file_logging = config.debug.log_to_file && dirs.create_dirs().is_ok();
    strata_log::init_logging(Some(&dirs.log_dir), file_logging, Some(&config));

    match args.mode {
        Mode::Serve => serve(&config),
        Mode::Stream => match stream::run_configured(&config, args.ticks) {
            Ok(report) => {
                info!(
                    "Stream finished: avg {:.3} ms per tile, {:.5} ms per block",
                    report.avg_gen_time_ms, report.avg_per_block_time_ms
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to start tile streaming: {e}");
                ExitCode::FAILURE
            }
        },
    }
}

fn serve(config: &Config) -> ExitCode {
    let service = Arc::new(GenerationService::new(config.server.seed));
    let mut server = GenerationServer::new(config.server.bind_address.clone(), config.server.port);
    if let Err(e) = server.start(service, config.server.handler_threads) {
        error!("Failed to start generation server: {e}");
        return ExitCode::FAILURE;
    }
    info!(
        "Serving tiles with seed {} on port {}",
        config.server.seed,
        server.actual_port()
    );
    server.wait();
    ExitCode::SUCCESS
}
