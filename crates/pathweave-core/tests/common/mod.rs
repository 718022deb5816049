//! Common test utilities for integration tests.
//!
//! Fixture writers for both reference input formats, a configurable stub
//! loader and a few graph assertions shared across test files.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use pathweave_config::PathweaveConfig;
use pathweave_core::{
    Direction, EdgeType, LoadOutcome, Loader, LoaderError, Object, Objects, ProgressFn,
};
use tempfile::TempDir;

/// Small, deterministic configuration for tests.
pub fn test_config() -> PathweaveConfig {
    let mut config = PathweaveConfig::default();
    config.ingest.workers = Some(2);
    config.ingest.queue_capacity = 16;
    config.ingest.batch_size = 4;
    config
}

/// A temporary directory holding input files.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a directory dump from JSON records, one per line.
    pub fn directory_dump(&self, name: &str, records: &[serde_json::Value]) -> PathBuf {
        let body: String = records.iter().map(|r| format!("{}\n", r)).collect();
        self.write(&format!("{}.objects.jsonl", name), &body)
    }

    /// Write a host inventory document.
    pub fn host_document(&self, name: &str, document: &serde_json::Value) -> PathBuf {
        self.write(&format!("{}.localmachine.json", name), &document.to_string())
    }

    pub fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).expect("Failed to write fixture");
        path
    }
}

/// Loader that claims paths ending in `suffix` and, at close, returns a
/// partition holding a copy of `objects`.
pub struct StubLoader {
    pub name: String,
    pub suffix: String,
    pub objects: Vec<Object>,
    partition: Option<Objects>,
}

impl StubLoader {
    pub fn new(name: &str, suffix: &str, objects: Vec<Object>) -> Self {
        Self {
            name: name.to_string(),
            suffix: suffix.to_string(),
            objects,
            partition: None,
        }
    }

    pub fn boxed(name: &str, suffix: &str, objects: Vec<Object>) -> Box<dyn Loader> {
        Box::new(Self::new(name, suffix, objects))
    }
}

impl Loader for StubLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, partition: Objects) -> Result<(), LoaderError> {
        self.partition = Some(partition);
        Ok(())
    }

    fn load(&mut self, path: &Path, _progress: &ProgressFn) -> Result<LoadOutcome, LoaderError> {
        if !path.to_string_lossy().ends_with(&self.suffix) {
            return Ok(LoadOutcome::Uninterested);
        }
        let partition = self.partition.as_mut().ok_or(LoaderError::NotInitialized)?;
        partition.extend(self.objects.iter().cloned());
        Ok(LoadOutcome::Claimed)
    }

    fn close(&mut self) -> Result<Vec<Objects>, LoaderError> {
        Ok(self.partition.take().into_iter().collect())
    }
}

/// Assert an edge of `edge_type` from `from` to `to`, by identity.
pub fn assert_edge(objects: &Objects, from: &str, to: &str, edge_type: EdgeType) {
    let from_id = objects
        .find_by_identity(from)
        .unwrap_or_else(|| panic!("missing object {}", from));
    let to_id = objects
        .find_by_identity(to)
        .unwrap_or_else(|| panic!("missing object {}", to));
    assert!(
        objects[from_id].edge(Direction::Out, to_id).contains(edge_type),
        "expected {} edge {} -> {}",
        edge_type,
        from,
        to
    );
    assert!(
        objects[to_id].edge(Direction::In, from_id).contains(edge_type),
        "inbound side of {} edge {} -> {} is missing",
        edge_type,
        from,
        to
    );
}

/// Assert `child` sits directly under `parent`, by identity.
pub fn assert_parent(objects: &Objects, child: &str, parent: &str) {
    let child_id = objects
        .find_by_identity(child)
        .unwrap_or_else(|| panic!("missing object {}", child));
    let parent_id = objects
        .find_by_identity(parent)
        .unwrap_or_else(|| panic!("missing object {}", parent));
    assert_eq!(objects[child_id].parent(), Some(parent_id), "parent of {}", child);
    assert!(objects[parent_id].children().contains(&child_id));
}
