//! CLI command implementations

pub mod analyze;
pub mod config;

use anyhow::{Context, Result};
use pathweave_config::{ConfigLoader, PathweaveConfig};

use crate::GlobalOptions;

/// Load configuration: an explicit file if given, otherwise global → local
/// for the current directory.
pub fn load_config(global: &GlobalOptions) -> Result<PathweaveConfig> {
    let mut loader = ConfigLoader::new();

    if let Some(ref config_path) = global.config {
        return loader
            .load_explicit(config_path, None)
            .with_context(|| format!("Failed to load config file {}", config_path.display()));
    }

    let working_dir = std::env::current_dir().context("Failed to get current directory")?;
    loader
        .load(&working_dir, None)
        .context("Failed to load configuration")
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
