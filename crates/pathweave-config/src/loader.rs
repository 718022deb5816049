//! Layered configuration loading.
//!
//! Layers apply in order, later ones winning per key:
//! 1. built-in defaults
//! 2. `~/.pathweave/config.toml`
//! 3. `.pathweave/config.toml` under the working directory, or an explicit
//!    file given on the command line
//! 4. command line overrides

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigSource};
use crate::layer::ConfigLayer;
use crate::{ConfigOverrides, PathweaveConfig};

const CONFIG_DIR: &str = ".pathweave";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    global_dir: Option<PathBuf>,
    /// Files that contributed to the last load, in application order
    applied: Vec<(ConfigSource, PathBuf)>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader rooted at `~/.pathweave`, if there is a home directory.
    pub fn new() -> Self {
        Self {
            global_dir: dirs::home_dir().map(|home| home.join(CONFIG_DIR)),
            applied: Vec::new(),
        }
    }

    /// Loader with a custom global directory.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_dir: Some(global_dir.into()),
            applied: Vec::new(),
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_dir.as_ref().map(|dir| dir.join(CONFIG_FILE))
    }

    pub fn local_config_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Files applied by the last `load`/`load_explicit`.
    pub fn applied(&self) -> &[(ConfigSource, PathBuf)] {
        &self.applied
    }

    /// Global, then the working directory's local file, then overrides.
    pub fn load(
        &mut self,
        working_dir: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<PathweaveConfig, ConfigError> {
        let local = self.local_config_path(working_dir);
        self.resolve(Some((ConfigSource::Local, local)), overrides)
    }

    /// Global, then `config_file` in place of the local file, then overrides.
    /// Unlike the implicit files, `config_file` must exist.
    pub fn load_explicit(
        &mut self,
        config_file: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<PathweaveConfig, ConfigError> {
        self.resolve(
            Some((ConfigSource::Explicit, config_file.to_path_buf())),
            overrides,
        )
    }

    fn resolve(
        &mut self,
        second: Option<(ConfigSource, PathBuf)>,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<PathweaveConfig, ConfigError> {
        self.applied.clear();
        let mut config = PathweaveConfig::default();

        let global = self.global_config_path().map(|p| (ConfigSource::Global, p));
        for (source, path) in global.into_iter().chain(second) {
            if let Some(layer) = read_layer(source, &path)? {
                config.apply_layer(layer);
                self.applied.push((source, path));
            }
        }

        if let Some(overrides) = overrides {
            config.apply_layer(ConfigLayer::from(overrides));
        }

        config.validate()?;
        debug!("Resolved configuration from {} files", self.applied.len());
        Ok(config)
    }
}

/// Read one layer. Missing implicit files are skipped.
fn read_layer(source: ConfigSource, path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && source != ConfigSource::Explicit => {
            trace!("No {} config at {}", source, path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(ConfigError::Unreadable {
                source_kind: source,
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    debug!("Loading {} config from {}", source, path.display());
    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::Malformed {
            source_kind: source,
            path: path.to_path_buf(),
            source: e,
        })
}
