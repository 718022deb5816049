//! Load orchestration.
//!
//! The [`Engine`] drives one ingestion run:
//!
//! 1. every loader gets a fresh partition (`init`)
//! 2. each input path is offered to the loaders in registration order; the
//!    first loader that claims it wins
//! 3. every loader is closed and hands back its partition(s)
//! 4. the before-merge pipeline runs on every non-empty partition in
//!    parallel, and all of them are joined
//! 5. the partitions are merged
//!
//! [`Engine::post_process`] then runs the after-merge pipeline and
//! finalizes the graph.
//!
//! ## Usage
//!
//! ```ignore
//! use pathweave_core::Engine;
//! use pathweave_config::PathweaveConfig;
//!
//! let mut engine = Engine::with_defaults(PathweaveConfig::default());
//! let mut graph = engine.run(&["corp.objects.jsonl", "ws01.localmachine.json"])?;
//! let stats = engine.post_process(&mut graph);
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use pathweave_config::PathweaveConfig;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::finalize::{finalize, GraphStatistics};
use crate::graph::{AllocationMode, Objects};
use crate::loader::{no_progress, LoadOutcome, Loader, LoaderError, LoaderId, ProgressFn};
use crate::merge::{merge, MergeError};
use crate::pipeline::{Phase, Pipeline};

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort an ingestion run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A loader could not be initialized
    #[error("loader '{loader}' failed to initialize: {source}")]
    LoaderInit {
        loader: String,
        #[source]
        source: LoaderError,
    },

    /// A claimed path could not be loaded
    #[error("loader '{loader}' failed on '{path}': {source}")]
    Load {
        loader: String,
        path: PathBuf,
        #[source]
        source: LoaderError,
    },

    /// A loader failed while draining its workers
    #[error("loader '{loader}' failed to close: {source}")]
    Close {
        loader: String,
        #[source]
        source: LoaderError,
    },

    /// Partitions could not be merged
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    /// The before-merge thread pool could not be built
    #[error("failed to build processing thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// Engine
// ============================================================================

/// Orchestrates loaders, the processing pipeline and the merge.
pub struct Engine {
    loaders: Vec<Box<dyn Loader>>,
    pipeline: Pipeline,
    config: PathweaveConfig,
}

impl Engine {
    /// Create an engine from an explicit loader list, in precedence order.
    pub fn new(loaders: Vec<Box<dyn Loader>>, pipeline: Pipeline, config: PathweaveConfig) -> Self {
        Self {
            loaders,
            pipeline,
            config,
        }
    }

    /// Create an engine with the reference loaders and default processors.
    pub fn with_defaults(config: PathweaveConfig) -> Self {
        let loaders = crate::loaders::default_loaders(&config);
        Self::new(loaders, crate::processors::default_pipeline(), config)
    }

    pub fn loader_names(&self) -> Vec<&str> {
        self.loaders.iter().map(|l| l.name()).collect()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &PathweaveConfig {
        &self.config
    }

    /// Load every path and merge the result, without progress reporting.
    pub fn run<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<Objects> {
        self.run_with_progress(paths, no_progress())
    }

    /// Load every path and merge the result.
    pub fn run_with_progress<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        progress: ProgressFn,
    ) -> Result<Objects> {
        let start = Instant::now();

        info!("Initializing {} loaders", self.loaders.len());
        for loader in &mut self.loaders {
            loader
                .init(Objects::with_mode(AllocationMode::BulkAppend))
                .map_err(|source| EngineError::LoaderInit {
                    loader: loader.name().to_string(),
                    source,
                })?;
        }

        let (claimed, skipped) = self.dispatch(paths, &progress)?;
        info!(
            "Loaded {} paths ({} unclaimed) in {:?}",
            claimed,
            skipped,
            start.elapsed()
        );

        let partitions = self.close_loaders()?;
        self.run_before_merge(partitions)
    }

    /// Offer each path to the loaders until one claims it.
    fn dispatch<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        progress: &ProgressFn,
    ) -> Result<(usize, usize)> {
        let mut claimed = 0;
        let mut skipped = 0;

        'paths: for path in paths {
            let path = path.as_ref();
            for loader in &mut self.loaders {
                let outcome = loader.load(path, progress).map_err(|source| EngineError::Load {
                    loader: loader.name().to_string(),
                    path: path.to_path_buf(),
                    source,
                })?;
                if outcome == LoadOutcome::Claimed {
                    debug!("{} claimed {}", loader.name(), path.display());
                    claimed += 1;
                    continue 'paths;
                }
            }
            debug!("No loader claimed {}, skipping", path.display());
            skipped += 1;
        }

        Ok((claimed, skipped))
    }

    fn close_loaders(&mut self) -> Result<Vec<(LoaderId, String, Objects)>> {
        let mut partitions = Vec::new();
        for (index, loader) in self.loaders.iter_mut().enumerate() {
            let start = Instant::now();
            let name = loader.name().to_string();
            let closed = loader.close().map_err(|source| EngineError::Close {
                loader: name.clone(),
                source,
            })?;
            for partition in closed {
                debug!(
                    "{} produced a partition of {} objects ({:?} to close)",
                    name,
                    partition.len(),
                    start.elapsed()
                );
                if !partition.is_empty() {
                    partitions.push((LoaderId(index), name.clone(), partition));
                }
            }
        }
        Ok(partitions)
    }

    /// Run the before-merge phase on every partition concurrently, then
    /// merge once all have joined.
    fn run_before_merge(&self, mut partitions: Vec<(LoaderId, String, Objects)>) -> Result<Objects> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.ingest.worker_count())
            .thread_name(|i| format!("pathweave-process-{}", i))
            .build()?;

        let pipeline = &self.pipeline;
        pool.install(|| {
            partitions.par_iter_mut().for_each(|(id, name, objects)| {
                let started = Instant::now();
                pipeline.run_phase(objects, "partition", Phase::BeforeMerge, Some((*id, name.as_str())));
                debug!("Before-merge processing for {} took {:?}", name, started.elapsed());
            });
        });
        info!(
            "Processed {} partitions before merge in {:?}",
            partitions.len(),
            start.elapsed()
        );

        let merged = merge(partitions.into_iter().map(|(_, _, p)| p).collect())?;
        Ok(merged)
    }

    /// Run the after-merge pipeline and finalize the graph.
    pub fn post_process(&self, objects: &mut Objects) -> GraphStatistics {
        let start = Instant::now();
        self.pipeline.run_phase(objects, "merged", Phase::AfterMerge, None);
        info!("After-merge processing took {:?}", start.elapsed());
        finalize(objects)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("loaders", &self.loader_names())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
