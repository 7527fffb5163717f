//! Headless streaming run: walks a viewpoint across the terrain and reports
//! generation timings.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strata_config::Config;
use strata_server::GenerationService;
use strata_stream::{
    HttpTransport, LocalTransport, LoggingSink, PoolError, TileTransport, TileWorld, WorldSettings,
};
use tracing::info;

/// Endpoint name that selects in-process generation.
pub const LOCAL_ENDPOINT: &str = "local";

const TICK: Duration = Duration::from_millis(50);
/// Fraction of a tile the viewpoint advances per tick.
const STEP_TILES: f64 = 0.25;
const MATERIAL_PERIOD: u32 = 100;

/// Aggregates reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamReport {
    pub meshes: usize,
    pub tiles: usize,
    pub avg_gen_time_ms: f64,
    pub avg_per_block_time_ms: f64,
}

pub fn transport_for(config: &Config) -> Arc<dyn TileTransport> {
    if config.world.root_endpoint == LOCAL_ENDPOINT {
        Arc::new(LocalTransport::new(Arc::new(GenerationService::new(
            config.server.seed,
        ))))
    } else {
        Arc::new(HttpTransport::default())
    }
}

/// Run `ticks` scheduler ticks, moving the viewpoint along +x.
pub fn run(
    config: &Config,
    ticks: u32,
    transport: Arc<dyn TileTransport>,
    tick: Duration,
) -> Result<StreamReport, PoolError> {
    let sink = Arc::new(LoggingSink::new());
    let world = TileWorld::new(
        WorldSettings::from(&config.world),
        config.pool.num_workers,
        config.pool.max_tasks_per_worker,
        transport,
        Arc::<LoggingSink>::clone(&sink),
    )?;

    let step = f64::from(config.world.tile_size) * f64::from(config.world.size_scalar) * STEP_TILES;
    let mut view_x = config.world.start_x;
    let view_z = config.world.start_z;
    info!(
        "Streaming from {} with radius {} for {ticks} ticks",
        config.world.root_endpoint, config.world.radius
    );

    for n in 1..=ticks {
        world.update_tiles(view_x, view_z);
        if n % MATERIAL_PERIOD == 0 {
            let material = world.update_materials();
            info!(
                "tick {n}: {} meshes, {} in flight, material {material}",
                sink.mesh_count(),
                world.in_flight()
            );
        }
        view_x += step;
        thread::sleep(tick);
    }

    let report = StreamReport {
        meshes: sink.mesh_count(),
        tiles: world.tile_count(),
        avg_gen_time_ms: world.avg_gen_time(),
        avg_per_block_time_ms: world.avg_per_block_time(),
    };
    world.drain();
    info!("Unloaded all tiles, {} meshes left", sink.mesh_count());
    Ok(report)
}

/// [`run`] with the configured transport and the default tick length.
pub fn run_configured(config: &Config, ticks: u32) -> Result<StreamReport, PoolError> {
    run(config, ticks, transport_for(config), TICK)
}
