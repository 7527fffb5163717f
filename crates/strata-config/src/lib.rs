//! Configuration system for strata.
//!
//! Settings for the generation server, the streaming world and its worker pool
//! persist to disk as RON files. CLI flags override individual values.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, Mode};
pub use config::{CONFIG_FILE, Config, DebugConfig, PoolConfig, ServerConfig, WorldConfig, config_path};
pub use error::ConfigError;
