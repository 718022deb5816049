//! Partial configuration as written in one file.
//!
//! Every key is optional so that a file only overrides what it names, even
//! when the value it sets equals the built-in default.

use serde::Deserialize;

use crate::{ConfigOverrides, PathweaveConfig};

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigLayer {
    pub ingest: IngestLayer,
    pub directory: DirectoryLayer,
    pub logging: LoggingLayer,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestLayer {
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub document_queue_capacity: Option<usize>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DirectoryLayer {
    pub import_all: Option<bool>,
    pub bytes_per_object: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingLayer {
    pub level: Option<String>,
}

impl ConfigLayer {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&ConfigOverrides> for ConfigLayer {
    fn from(overrides: &ConfigOverrides) -> Self {
        Self {
            ingest: IngestLayer {
                workers: overrides.workers,
                ..Default::default()
            },
            directory: DirectoryLayer {
                import_all: overrides.import_all,
                ..Default::default()
            },
            logging: LoggingLayer {
                level: overrides.log_level.clone(),
            },
        }
    }
}

impl PathweaveConfig {
    /// Overwrite every value the layer sets.
    pub fn apply_layer(&mut self, layer: ConfigLayer) {
        let ConfigLayer {
            ingest,
            directory,
            logging,
        } = layer;

        if ingest.workers.is_some() {
            self.ingest.workers = ingest.workers;
        }
        set(&mut self.ingest.queue_capacity, ingest.queue_capacity);
        set(
            &mut self.ingest.document_queue_capacity,
            ingest.document_queue_capacity,
        );
        set(&mut self.ingest.batch_size, ingest.batch_size);
        set(&mut self.directory.import_all, directory.import_all);
        set(&mut self.directory.bytes_per_object, directory.bytes_per_object);
        set(&mut self.logging.level, logging.level);
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_layer_sets_only_named_keys() {
        let layer: ConfigLayer = toml::from_str(
            r#"
            [directory]
            bytes_per_object = 512
            "#,
        )
        .unwrap();

        let mut config = PathweaveConfig::default();
        config.ingest.batch_size = 7;
        config.apply_layer(layer);

        assert_eq!(config.directory.bytes_per_object, 512);
        assert_eq!(config.ingest.batch_size, 7);
    }

    #[test]
    fn test_default_valued_key_still_overrides() {
        let mut config = PathweaveConfig::default();
        config.logging.level = "debug".to_string();

        let layer: ConfigLayer = toml::from_str("[logging]\nlevel = \"info\"\n").unwrap();
        config.apply_layer(layer);

        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_overrides_convert_to_layer() {
        let overrides = ConfigOverrides {
            workers: Some(3),
            import_all: None,
            log_level: None,
        };
        let layer = ConfigLayer::from(&overrides);

        assert_eq!(layer.ingest.workers, Some(3));
        assert_eq!(layer.directory.import_all, None);
        assert!(!layer.is_empty());
        assert!(ConfigLayer::default().is_empty());
    }
}
