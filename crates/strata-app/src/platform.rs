//! OS-specific directory resolution.

use std::io;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "strata";

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("could not determine OS configuration directory")]
    NoConfigDir,
    #[error("platform I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where strata keeps its configuration and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppDirs {
    /// Resolve the platform config directory (XDG on Linux, Known Folders on
    /// Windows, Library on macOS) without touching the disk.
    pub fn resolve() -> Result<Self, PlatformError> {
        let base = dirs::config_dir().ok_or(PlatformError::NoConfigDir)?;
        Ok(Self::from_config_dir(base.join(APP_NAME)))
    }

    /// Use an explicit config directory; logs go to its `logs` child.
    pub fn from_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let log_dir = config_dir.join("logs");
        Self {
            config_dir,
            log_dir,
        }
    }

    /// Resolve `override_dir` if given, the platform default otherwise.
    pub fn resolve_or(override_dir: Option<&Path>) -> Result<Self, PlatformError> {
        match override_dir {
            Some(dir) => Ok(Self::from_config_dir(dir)),
            None => Self::resolve(),
        }
    }

    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}
