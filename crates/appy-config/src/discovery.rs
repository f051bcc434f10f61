//! File-based config discovery.
//!
//! Layers, lowest to highest priority: built-in defaults, `appy.toml` in the
//! project root, then `APPY_`-prefixed environment variables with `__` as the
//! nesting separator (`APPY_HTTP__PORT=4000`).

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format as _, Serialized, Toml},
    Figment,
};

use crate::dev::DevConfig;
use crate::error::Result;

pub const CONFIG_FILE: &str = "appy.toml";
pub const ENV_PREFIX: &str = "APPY_";

/// Locates and loads the orchestrator configuration for a project root.
///
/// # Example
///
/// ```no_run
/// use appy_config::ConfigDiscovery;
///
/// let config = ConfigDiscovery::new(".").load().unwrap();
/// assert!(!config.watch.paths.is_empty());
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `appy.toml` if the project has one.
    pub fn find(&self) -> Option<PathBuf> {
        let path = self.root.join(CONFIG_FILE);
        path.is_file().then_some(path)
    }

    /// Load the merged configuration. A missing `appy.toml` is not an error.
    pub fn load(&self) -> Result<DevConfig> {
        let mut figment = Figment::new().merge(Serialized::defaults(DevConfig::default()));

        if let Some(path) = self.find() {
            tracing::debug!("loading {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        Ok(figment.extract()?)
    }
}
