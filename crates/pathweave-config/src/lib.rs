//! Pathweave Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.pathweave/config.toml`
//! - Local config: `.pathweave/config.toml` (next to the collected data)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod layer;
mod loader;

pub use error::{ConfigError, ConfigSource};
pub use layer::{ConfigLayer, DirectoryLayer, IngestLayer, LoggingLayer};
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};

/// Default bounded queue capacity for streamed records.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8192;

/// Default bounded queue capacity for whole-document loaders.
pub const DEFAULT_DOCUMENT_QUEUE_CAPACITY: usize = 128;

/// Default number of converted objects appended per lock acquisition.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Default byte size assumed per directory record for progress estimation.
pub const DEFAULT_BYTES_PER_OBJECT: u64 = 1024;

/// Root configuration for Pathweave.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PathweaveConfig {
    /// Ingestion (worker pool and queue) configuration
    pub ingest: IngestConfig,

    /// Directory dump loader configuration
    pub directory: DirectoryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Ingestion configuration shared by every loader's worker pool.
///
/// # Example TOML
///
/// ```toml
/// [ingest]
/// workers = 8
/// queue_capacity = 8192
/// batch_size = 64
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// Worker threads per loader (None = available parallelism)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Capacity of the record queue between decoder and workers
    pub queue_capacity: usize,

    /// Capacity of the queue for whole-document loaders
    pub document_queue_capacity: usize,

    /// Converted objects accumulated before appending to a partition
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            document_queue_capacity: DEFAULT_DOCUMENT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl IngestConfig {
    /// Effective worker count: the configured value or the number of CPUs.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Validate queue and batch sizing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("ingest.workers", self.workers.unwrap_or(1)),
            ("ingest.queue_capacity", self.queue_capacity),
            ("ingest.document_queue_capacity", self.document_queue_capacity),
            ("ingest.batch_size", self.batch_size),
        ];
        match sizes.into_iter().find(|(_, n)| *n == 0) {
            Some((key, _)) => Err(ConfigError::positive(key)),
            None => Ok(()),
        }
    }
}

/// Directory dump loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Keep every attribute from the dump instead of the well-known subset.
    /// Expands lookup options at the cost of memory.
    pub import_all: bool,

    /// Approximate encoded size of one record, used for progress estimation
    pub bytes_per_object: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            import_all: false,
            bytes_per_object: DEFAULT_BYTES_PER_OBJECT,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override worker count
    pub workers: Option<usize>,

    /// Override the import-all switch
    pub import_all: Option<bool>,

    /// Override log level
    pub log_level: Option<String>,
}

impl PathweaveConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        self.apply_layer(ConfigLayer::from(overrides));
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ingest.validate()?;
        if self.directory.bytes_per_object == 0 {
            return Err(ConfigError::positive("directory.bytes_per_object"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = PathweaveConfig::default();
        assert_eq!(config.ingest.queue_capacity, 8192);
        assert_eq!(config.ingest.document_queue_capacity, 128);
        assert_eq!(config.ingest.batch_size, 64);
        assert_eq!(config.ingest.workers, None);
        assert!(!config.directory.import_all);
        assert_eq!(config.directory.bytes_per_object, 1024);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_count_defaults_to_cpus() {
        let config = IngestConfig::default();
        assert_eq!(config.worker_count(), num_cpus::get().max(1));

        let config = IngestConfig {
            workers: Some(3),
            ..Default::default()
        };
        assert_eq!(config.worker_count(), 3);
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = PathweaveConfig::default();
        let overrides = ConfigOverrides {
            workers: Some(2),
            import_all: Some(true),
            log_level: Some("debug".to_string()),
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.ingest.workers, Some(2));
        assert!(config.directory.import_all);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = PathweaveConfig::default();
        config.ingest.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "ingest.batch_size", .. })
        ));

        let mut config = PathweaveConfig::default();
        config.ingest.workers = Some(0);
        assert!(config.validate().is_err());

        let mut config = PathweaveConfig::default();
        config.directory.bytes_per_object = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PathweaveConfig = toml::from_str(
            r#"
            [ingest]
            batch_size = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.ingest.batch_size, 16);
        assert_eq!(config.ingest.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.logging, LoggingConfig::default());
    }
}
