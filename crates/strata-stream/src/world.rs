//! Viewpoint-driven tile scheduling.
//!
//! [`TileWorld::update_tiles`] is called once per tick from a single driving
//! thread. It unloads tiles that left the radius, creates tiles that entered
//! it and hands the new ones to a dispatcher thread, which feeds them through
//! the [`WorkerPool`]. Completions arrive on pool threads in any order and are
//! applied under the same lock.

use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use strata_config::WorldConfig;
use strata_net::codec;

use crate::endpoint::EndpointRing;
use crate::job::{GenerationJob, JobCompletion, JobOutcome};
use crate::pool::{PoolError, WorkerHandle, WorkerPool};
use crate::sink::MeshSink;
use crate::tile::{Tile, TileKey};
use crate::transport::{TileTransport, fetch_with_retry};

type TilePool = WorkerPool<GenerationJob, JobCompletion>;

/// Scheduler parameters, usually taken from [`WorldConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSettings {
    pub radius: i32,
    pub max_height: i32,
    pub tile_size: u32,
    pub downscale: f64,
    pub size_scalar: f32,
    pub max_geom_gen: usize,
    pub retry_bound: u32,
    pub retry_delay: Duration,
    pub material_count: u8,
    pub material_variants: usize,
    pub root_endpoint: String,
    pub max_endpoints: u32,
}

impl From<&WorldConfig> for WorldSettings {
    fn from(config: &WorldConfig) -> Self {
        Self {
            radius: config.radius,
            max_height: config.max_height,
            tile_size: config.tile_size,
            downscale: config.downscale,
            size_scalar: config.size_scalar,
            max_geom_gen: config.max_geom_gen,
            retry_bound: config.retry_bound,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            material_count: config.material_count,
            material_variants: config.material_variants,
            root_endpoint: config.root_endpoint.clone(),
            max_endpoints: config.max_endpoints,
        }
    }
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self::from(&WorldConfig::default())
    }
}

/// Generation statistics.
///
/// `completed` and `total_gen_time` cover every successful generation since
/// the world was created. The `running_*` totals only cover tiles still in
/// the map and shrink when tiles unload.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorldStats {
    pub completed: u64,
    pub total_gen_time: Duration,
    pub running_blocks: u64,
    pub running_time: Duration,
}

struct WorldState {
    tiles: FxHashMap<TileKey, Tile>,
    radius: i32,
    /// Tile coordinate of the last dispatched viewpoint.
    curr: Option<(i32, i32)>,
    in_gen: usize,
    in_geom_gen: usize,
    paused: bool,
    draining: bool,
    /// A dispatcher thread is running.
    updating: bool,
    forced_update: bool,
    current_material: usize,
    stats: WorldStats,
}

struct WorldShared {
    state: Mutex<WorldState>,
    changed: Condvar,
    sink: Arc<dyn MeshSink>,
    settings: WorldSettings,
}

/// Keeps the tiles around a moving viewpoint generated and attached to a
/// [`MeshSink`].
pub struct TileWorld {
    shared: Arc<WorldShared>,
    pool: Arc<TilePool>,
    endpoints: Arc<EndpointRing>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TileWorld {
    /// Create a world whose pool runs `num_workers x max_tasks_per_worker`
    /// concurrent fetches through `transport`.
    pub fn new(
        settings: WorldSettings,
        num_workers: usize,
        max_tasks_per_worker: usize,
        transport: Arc<dyn TileTransport>,
        sink: Arc<dyn MeshSink>,
    ) -> Result<Self, PoolError> {
        let endpoints = Arc::new(EndpointRing::new(
            settings.root_endpoint.clone(),
            settings.max_endpoints,
        ));
        let shared = Arc::new(WorldShared {
            state: Mutex::new(WorldState {
                tiles: FxHashMap::default(),
                radius: settings.radius,
                curr: None,
                in_gen: 0,
                in_geom_gen: 0,
                paused: false,
                draining: false,
                updating: false,
                forced_update: false,
                current_material: 0,
                stats: WorldStats::default(),
            }),
            changed: Condvar::new(),
            sink,
            settings,
        });

        let delay = shared.settings.retry_delay;
        let completion_shared = Arc::clone(&shared);
        let pool = WorkerPool::new(
            num_workers,
            max_tasks_per_worker,
            move |job: GenerationJob| fetch_with_retry(transport.as_ref(), &job, delay),
            move |handle, completion| completion_shared.on_complete(handle, completion),
        )?;

        Ok(Self {
            shared,
            pool: Arc::new(pool),
            endpoints,
            dispatcher: Mutex::new(None),
        })
    }

    /// Tile-grid coordinate containing a world-space viewpoint.
    pub fn view_tile(&self, view_x: f64, view_z: f64) -> (i32, i32) {
        let span = f64::from(self.shared.settings.tile_size) * f64::from(self.shared.settings.size_scalar);
        ((view_x / span).floor() as i32, (view_z / span).floor() as i32)
    }

    /// Advance the scheduler for a viewpoint. Never blocks on generation.
    pub fn update_tiles(&self, view_x: f64, view_z: f64) {
        let center = self.view_tile(view_x, view_z);
        let mut state = self.shared.state.lock();
        if state.paused {
            return;
        }

        let mut candidates = self.shared.calc_tiles_to_load(&mut state, center);
        if state.updating || state.draining {
            return;
        }
        if state.curr == Some(center) && !state.forced_update {
            return;
        }
        state.curr = Some(center);
        state.forced_update = false;

        let radius = state.radius;
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                for y in 0..self.shared.settings.max_height {
                    let key = TileKey::new(center.0 + dx, y, center.1 + dz);
                    if let Entry::Vacant(entry) = state.tiles.entry(key) {
                        entry.insert(Tile::new(key));
                        candidates.push(key);
                    }
                }
            }
        }

        let tiles = &mut state.tiles;
        candidates.retain(|key| match tiles.get_mut(key) {
            Some(tile) if tile.needs_generation() => {
                tile.generating = true;
                true
            }
            _ => false,
        });
        if candidates.is_empty() {
            return;
        }
        candidates.sort_by_key(|key| {
            let distance = (key.x - center.0).abs().max((key.z - center.1).abs());
            (distance, key.y, key.x, key.z)
        });
        state.in_gen += candidates.len();
        state.updating = true;
        drop(state);

        tracing::debug!(
            "Dispatching {} tiles around {},{}",
            candidates.len(),
            center.0,
            center.1
        );
        self.join_dispatcher();
        self.spawn_dispatcher(candidates);
    }

    fn spawn_dispatcher(&self, candidates: Vec<TileKey>) {
        let shared = Arc::clone(&self.shared);
        let pool = Arc::clone(&self.pool);
        let endpoints = Arc::clone(&self.endpoints);
        let pending = candidates.clone();
        let spawned = thread::Builder::new()
            .name("tile-dispatcher".to_string())
            .spawn(move || shared.dispatch_all(&pool, &endpoints, candidates));

        match spawned {
            Ok(handle) => *self.dispatcher.lock() = Some(handle),
            Err(e) => {
                tracing::error!("failed to spawn tile dispatcher: {e}");
                let mut state = self.shared.state.lock();
                for key in pending {
                    abort_tile(&mut state, key);
                }
                state.updating = false;
                drop(state);
                self.shared.changed.notify_all();
            }
        }
    }

    fn join_dispatcher(&self) {
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::error!("tile dispatcher panicked");
        }
    }

    /// Stop scheduling and attaching until [`Self::resume`].
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
    }

    /// Returns `false` while a drain is in progress.
    pub fn resume(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.draining {
            return false;
        }
        state.paused = false;
        drop(state);
        self.shared.changed.notify_all();
        true
    }

    /// Wait for in-flight work, unload every tile and force a fresh load on
    /// the next tick. Returns `false` if a drain is already running.
    pub fn drain(&self) -> bool {
        {
            let mut state = self.shared.state.lock();
            if state.draining {
                return false;
            }
            state.draining = true;
        }
        self.shared.changed.notify_all();

        self.pool.drain();
        {
            let mut state = self.shared.state.lock();
            while state.updating || state.in_gen > 0 {
                self.shared.changed.wait(&mut state);
            }
        }
        self.join_dispatcher();

        let mut state = self.shared.state.lock();
        let radius = state.radius;
        let center = state.curr.unwrap_or((0, 0));
        state.radius = -1;
        self.shared.calc_tiles_to_load(&mut state, center);
        state.radius = radius;
        state.forced_update = true;
        state.draining = false;
        let remaining = state.tiles.len();
        drop(state);
        self.shared.changed.notify_all();

        tracing::info!("Tile world drained, {remaining} in-flight tiles left to discard");
        true
    }

    /// Cycle to the next material variant and apply it to every rendered
    /// tile. Returns the new variant index.
    pub fn update_materials(&self) -> usize {
        let mut state = self.shared.state.lock();
        let variants = self.shared.settings.material_variants.max(1);
        state.current_material = (state.current_material + 1) % variants;
        let material = state.current_material;
        for (key, tile) in &state.tiles {
            if tile.has_mesh {
                self.shared.sink.apply_material(*key, material);
            }
        }
        material
    }

    /// Mean generation time per solid voxel over the loaded tiles, in
    /// milliseconds.
    pub fn avg_per_block_time(&self) -> f64 {
        let stats = self.stats();
        if stats.running_blocks == 0 {
            return 0.0;
        }
        stats.running_time.as_secs_f64() * 1000.0 / stats.running_blocks as f64
    }

    /// Mean generation time per tile since the world was created, in
    /// milliseconds.
    pub fn avg_gen_time(&self) -> f64 {
        let stats = self.stats();
        if stats.completed == 0 {
            return 0.0;
        }
        stats.total_gen_time.as_secs_f64() * 1000.0 / stats.completed as f64
    }

    pub fn stats(&self) -> WorldStats {
        self.shared.state.lock().stats
    }

    pub fn tile_count(&self) -> usize {
        self.shared.state.lock().tiles.len()
    }

    /// Tiles dispatched but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_gen
    }

    pub fn tile(&self, key: TileKey) -> Option<Tile> {
        self.shared.state.lock().tiles.get(&key).cloned()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    pub fn is_draining(&self) -> bool {
        self.shared.state.lock().draining
    }

    /// Change the number of pool workers. See [`WorkerPool::resize`].
    pub fn resize_pool(&self, num_workers: usize) -> bool {
        self.pool.resize(num_workers)
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.shared.settings
    }
}

impl Drop for TileWorld {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.draining = true;
            state.paused = false;
        }
        self.shared.changed.notify_all();
        self.pool.drain();
        self.join_dispatcher();
    }
}

impl WorldShared {
    /// Unload tiles outside `radius` of `center` and collect the in-range
    /// tiles that still need generating.
    fn calc_tiles_to_load(&self, state: &mut WorldState, center: (i32, i32)) -> Vec<TileKey> {
        let radius = state.radius;
        let mut candidates = Vec::new();
        let mut removed = Vec::new();

        for (key, tile) in state.tiles.iter_mut() {
            if key.in_bounds(radius, center.0, center.1) && !tile.stale {
                if tile.needs_generation() {
                    candidates.push(*key);
                }
                continue;
            }
            if tile.has_mesh && !tile.stale {
                self.sink.remove_mesh(*key);
                tile.has_mesh = false;
            }
            if tile.generating {
                tile.stale = true;
            } else {
                removed.push(*key);
            }
        }

        for key in removed {
            let Some(tile) = state.tiles.remove(&key) else {
                continue;
            };
            let stats = &mut state.stats;
            stats.running_blocks = stats.running_blocks.saturating_sub(tile.num_blocks);
            if let Some(gen_time) = tile.gen_time {
                stats.running_time = stats.running_time.saturating_sub(gen_time);
            }
            // A discarded result landed for a tile that is back in range.
            if key.in_bounds(radius, center.0, center.1) {
                state.forced_update = true;
            }
        }
        candidates
    }

    /// Body of the dispatcher thread.
    fn dispatch_all(&self, pool: &TilePool, endpoints: &EndpointRing, candidates: Vec<TileKey>) {
        for key in candidates {
            if self.state.lock().draining {
                self.abort(key);
                continue;
            }
            let Some(handle) = pool.acquire() else {
                self.abort(key);
                continue;
            };

            let job = {
                let mut state = self.state.lock();
                let ready = !state.draining
                    && match state.tiles.get_mut(&key) {
                        Some(tile) if tile.generating && !tile.stale => {
                            tile.gen_started = Some(Instant::now());
                            true
                        }
                        _ => false,
                    };
                if !ready {
                    abort_tile(&mut state, key);
                    drop(state);
                    self.changed.notify_all();
                    continue;
                }
                self.job_for(key, endpoints.next_endpoint())
            };

            tracing::debug!(tile = %key, endpoint = %job.endpoint, "dispatching tile");
            if let Err(e) = pool.dispatch(handle, job) {
                tracing::error!(tile = %key, "failed to dispatch tile: {e}");
                self.abort(key);
            }
        }

        self.state.lock().updating = false;
        self.changed.notify_all();
    }

    fn job_for(&self, key: TileKey, endpoint: String) -> GenerationJob {
        let settings = &self.settings;
        let layers = u32::try_from(settings.max_height).unwrap_or(0);
        GenerationJob {
            tile: key,
            size: settings.tile_size,
            downscale: settings.downscale,
            height_factor: layers.saturating_mul(settings.tile_size),
            retry_bound: settings.retry_bound,
            material_count: settings.material_count,
            position: key.world_origin(settings.tile_size).to_vec(),
            endpoint,
        }
    }

    fn abort(&self, key: TileKey) {
        abort_tile(&mut self.state.lock(), key);
        self.changed.notify_all();
    }

    /// Completion handler, run on pool worker threads.
    fn on_complete(&self, handle: WorkerHandle, completion: JobCompletion) {
        handle.release();
        let key = completion.tile;
        let mut state = self.state.lock();

        match completion.outcome {
            JobOutcome::Success { meta, payload } => {
                let Some(tile) = state.tiles.get_mut(&key) else {
                    tracing::warn!(tile = %key, "completion for unknown tile");
                    state.in_gen = state.in_gen.saturating_sub(1);
                    drop(state);
                    self.changed.notify_all();
                    return;
                };
                let elapsed = tile.gen_started.map(|t| t.elapsed()).unwrap_or_default();
                tile.gen_time = Some(elapsed);
                tile.num_blocks = meta.block_count;
                let stats = &mut state.stats;
                stats.completed += 1;
                stats.total_gen_time += elapsed;
                stats.running_blocks += meta.block_count;
                stats.running_time += elapsed;
                self.attach(state, key, meta.block_count, payload);
            }
            JobOutcome::Failure { error } => {
                tracing::warn!(tile = %key, "tile generation failed: {error}");
                state.in_gen = state.in_gen.saturating_sub(1);
                if let Some(tile) = state.tiles.get_mut(&key) {
                    tile.generating = false;
                    tile.gen_started = None;
                }
                state.forced_update = true;
                drop(state);
                self.changed.notify_all();
            }
        }
    }

    /// Decode a finished tile and hand it to the sink unless it went stale.
    fn attach(
        &self,
        mut state: MutexGuard<'_, WorldState>,
        key: TileKey,
        block_count: u64,
        payload: Vec<u8>,
    ) {
        let decoded = if block_count == 0 {
            None
        } else {
            let max_geom_gen = self.settings.max_geom_gen.max(1);
            // Pool threads must not stay parked once a drain is waiting on them.
            while state.in_geom_gen >= max_geom_gen || (state.paused && !state.draining) {
                self.changed.wait(&mut state);
            }
            state.in_geom_gen += 1;
            let scalar = self.settings.size_scalar;
            let decoded = MutexGuard::unlocked(&mut state, || {
                codec::decode(&payload).map(|mut geometry| {
                    geometry.scale(scalar);
                    geometry
                })
            });
            state.in_geom_gen -= 1;
            Some(decoded)
        };

        state.in_gen = state.in_gen.saturating_sub(1);
        let material = state.current_material;
        if let Some(tile) = state.tiles.get_mut(&key) {
            tile.generating = false;
            tile.generated = true;
            match decoded {
                Some(Ok(geometry)) if !tile.stale && !geometry.is_empty() => {
                    self.sink.add_mesh(key, geometry, material);
                    tile.has_mesh = true;
                }
                Some(Ok(_)) if tile.stale => {
                    tracing::debug!(tile = %key, "discarding stale tile");
                }
                Some(Err(e)) => {
                    tracing::error!(tile = %key, "failed to decode tile: {e}");
                }
                _ => {}
            }
        }
        drop(state);
        self.changed.notify_all();
    }
}

fn abort_tile(state: &mut WorldState, key: TileKey) {
    state.in_gen = state.in_gen.saturating_sub(1);
    if let Some(tile) = state.tiles.get_mut(&key) {
        tile.generating = false;
        tile.gen_started = None;
    }
    state.forced_update = true;
}
