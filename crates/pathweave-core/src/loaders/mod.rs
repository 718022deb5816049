//! Reference loaders.
//!
//! - [`DirectoryDumpLoader`]: newline-delimited JSON directory dumps
//!   (`*.objects.jsonl`)
//! - [`HostInventoryLoader`]: per-host inventory documents
//!   (`*.localmachine.json`)

mod directory;
mod host;

pub use directory::{parent_dn, DirectoryDumpLoader, DIRECTORY_SUFFIX};
pub use host::{HostInventoryLoader, FOREIGN_MEMBER_SID, HOST_SUFFIX};

use std::path::Path;

use pathweave_config::PathweaveConfig;

use crate::loader::Loader;

/// The reference loaders in precedence order.
pub fn default_loaders(config: &PathweaveConfig) -> Vec<Box<dyn Loader>> {
    vec![
        Box::new(DirectoryDumpLoader::new(config.clone())),
        Box::new(HostInventoryLoader::new(config.clone())),
    ]
}

/// Case-insensitive file name suffix check.
pub(crate) fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_lowercase().ends_with(suffix))
        .unwrap_or(false)
}
