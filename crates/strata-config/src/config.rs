//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level strata configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Generation server settings.
    pub server: ServerConfig,
    /// Tile streaming settings.
    pub world: WorldConfig,
    /// Client worker pool settings.
    pub pool: PoolConfig,
    /// Logging settings.
    pub debug: DebugConfig,
}

/// Generation server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_address: String,
    /// Listener port (0 lets the OS pick one).
    pub port: u16,
    /// Seed of the terrain noise generator.
    pub seed: u32,
    /// Number of threads answering requests.
    pub handler_threads: usize,
}

/// Tile streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Load radius in tiles around the viewpoint.
    pub radius: i32,
    /// Number of vertical tile layers.
    pub max_height: i32,
    /// Tile edge length in voxels.
    pub tile_size: u32,
    /// Horizontal noise downscale factor.
    pub downscale: f64,
    /// Factor applied to decoded geometry.
    pub size_scalar: f32,
    /// Initial viewpoint x.
    pub start_x: f64,
    /// Initial viewpoint z.
    pub start_z: f64,
    /// Base URL of the generation service.
    pub root_endpoint: String,
    /// Number of load-balanced endpoints sharing the root name.
    pub max_endpoints: u32,
    /// Maximum number of tiles decoded concurrently.
    pub max_geom_gen: usize,
    /// Attempts per generation request before giving up.
    pub retry_bound: u32,
    /// Fixed delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Number of height bands mapped to materials.
    pub material_count: u8,
    /// Number of material variants cycled by `update_materials`.
    pub material_variants: usize,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of workers.
    pub num_workers: usize,
    /// Concurrent jobs per worker.
    pub max_tasks_per_worker: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_level: String,
    /// Also write JSON logs to `logs/strata.log` under the config directory.
    pub log_to_file: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            seed: 0,
            handler_threads: 4,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            radius: 8,
            max_height: 3,
            tile_size: 16,
            downscale: 80.0,
            size_scalar: 1.0,
            start_x: 0.0,
            start_z: 0.0,
            root_endpoint: "http://127.0.0.1:8080".to_string(),
            max_endpoints: 1,
            max_geom_gen: 1000,
            retry_bound: 5,
            retry_delay_ms: 20,
            material_count: 7,
            material_variants: 2,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get().max(1),
            max_tasks_per_worker: 2,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

/// Name of the config file inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Path of the config file for `config_dir`.
pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE)
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Read `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_path(config_dir);
        if !path.exists() {
            let config = Self::default();
            config.save(config_dir)?;
            log::info!("Wrote default strata config to {}", path.display());
            return Ok(config);
        }
        let config = read_config(&path)?;
        log::info!("Using strata config {}", path.display());
        Ok(config)
    }

    /// Write this config to `config_dir`, creating the directory if needed.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ConfigError::Write { path, source }
        };
        std::fs::create_dir_all(config_dir).map_err(write_err(config_dir))?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .enumerate_arrays(false);
        let text = ron::ser::to_string_pretty(self, pretty)?;

        let path = config_path(config_dir);
        std::fs::write(&path, text).map_err(write_err(&path))
    }

    /// Re-read the file on disk. `None` when nothing changed.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_config(&config_path(config_dir))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("Config file changed on disk");
        Ok(Some(fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new()).unwrap();
        assert!(text.contains("tile_size: 16"));
        assert!(text.contains("port: 8080"));
        assert!(text.contains("material_variants: 2"));
    }

    #[test]
    fn test_default_pool_has_at_least_one_worker() {
        let pool = PoolConfig::default();
        assert!(pool.num_workers >= 1, "got {}", pool.num_workers);
        assert_eq!(pool.max_tasks_per_worker, 2);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.pool.num_workers = 3;
        config.debug.log_to_file = true;
        let back: Config = ron::from_str(&ron::to_string(&config).unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(server: (port: 9000), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.world, WorldConfig::default());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let config: Config = ron::from_str("(world: (radius: 2, fog: true))").unwrap();
        assert_eq!(config.world.radius, 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.world.radius = 3;
        config.world.max_endpoints = 4;
        config.world.root_endpoint = "http://10.0.0.1:9000".to_string();

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(config_path(dir.path()).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.world.downscale = 160.0;
        modified.save(dir.path()).unwrap();

        let reloaded = config.reload(dir.path()).unwrap();
        assert_eq!(reloaded.map(|c| c.world.downscale), Some(160.0));
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_reload_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::default().reload(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(config_path(dir.path()), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        match result {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, config_path(dir.path())),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }
}
