//! Pathweave Core - Multi-source security inventory ingestion
//!
//! This crate turns collector output into one unified in-memory graph of
//! principals, resources and their typed relationships:
//! - Process-wide value interning
//! - The object/edge graph model and its partitions
//! - The loader contract and the bounded ingest pool loaders build on
//! - The prioritized before/after-merge processing pipeline
//! - Partition merge and edge-storage finalization
//! - Reference loaders for directory dumps and host inventories

pub mod engine;
pub mod finalize;
pub mod graph;
pub mod ingest;
pub mod interner;
pub mod loader;
pub mod loaders;
pub mod merge;
pub mod pipeline;
pub mod processors;

// Re-exports for convenience
pub use graph::{
    AllocationMode, Attribute, Direction, EdgeBitmap, EdgeType, Object, ObjectId, ObjectType,
    Objects, ROOT_IDENTITY,
};
pub use interner::{AttributeValue, Interner};

// Loading re-exports
pub use ingest::{IngestPool, PoolOptions};
pub use loader::{
    no_progress, LoadOutcome, Loader, LoaderError, LoaderId, ProgressFn, ProgressTracker,
};
pub use loaders::{default_loaders, DirectoryDumpLoader, HostInventoryLoader};

// Processing re-exports
pub use engine::{Engine, EngineError};
pub use finalize::{finalize, GraphStatistics, TypeCount};
pub use merge::{merge, MergeError};
pub use pipeline::{Phase, Pipeline, Priority, Processor, StageContext};
pub use processors::default_pipeline;
