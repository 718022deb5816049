//! Edge optimizer and finalizer.
//!
//! Runs once the after-merge pipeline is done. Edge maps are compacted into
//! sorted slices, spare capacity is released, the graph is sealed against
//! further edges and switched to steady-state allocation.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::graph::{AllocationMode, Direction, Objects};
use crate::interner;

/// Count for one object or edge type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    pub name: &'static str,
    pub count: usize,
}

/// Descriptive statistics of a finalized graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStatistics {
    /// Objects besides the root
    pub objects: usize,
    /// Typed edges, counted once per directed pair and type
    pub edges: usize,
    /// Object types, most popular first
    pub object_types: Vec<TypeCount>,
    /// Edge types, most popular first
    pub edge_types: Vec<TypeCount>,
}

impl GraphStatistics {
    /// Aggregate statistics from a graph.
    pub fn collect(objects: &Objects) -> Self {
        let object_types = ranked(
            objects
                .statistics()
                .into_iter()
                .map(|(t, n)| (t.as_str(), n)),
        );
        let edge_types = ranked(
            objects
                .edge_statistics()
                .into_iter()
                .map(|(t, n)| (t.as_str(), n)),
        );
        Self {
            objects: objects.len(),
            edges: edge_types.iter().map(|c| c.count).sum(),
            object_types,
            edge_types,
        }
    }
}

/// Sort descending by count (name breaks ties), dropping zero counts.
fn ranked(counts: impl Iterator<Item = (&'static str, usize)>) -> Vec<TypeCount> {
    let merged: BTreeMap<&'static str, usize> = counts.filter(|(_, n)| *n > 0).collect();
    let mut ranked: Vec<TypeCount> = merged
        .into_iter()
        .map(|(name, count)| TypeCount { name, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(b.name)));
    ranked
}

/// Compact, seal and measure a graph. Safe to call more than once.
pub fn finalize(objects: &mut Objects) -> GraphStatistics {
    let start = Instant::now();

    for object in objects.objects_mut() {
        object.compact();
    }
    objects.shrink();
    objects.seal();
    objects.set_mode(AllocationMode::SteadyState);

    let statistics = GraphStatistics::collect(objects);

    let interner = interner::global();
    let purged = interner.purge_unused();
    interner.shrink();

    info!(
        "Finalized graph: {} objects, {} edges in {:?}",
        statistics.objects,
        statistics.edges,
        start.elapsed()
    );
    debug!(
        "Released {} unused interned values ({} remain)",
        purged,
        interner.len()
    );
    for count in &statistics.object_types {
        debug!("  object type {}: {}", count.name, count.count);
    }
    for count in &statistics.edge_types {
        debug!("  edge type {}: {}", count.name, count.count);
    }

    statistics
}

/// Whether every object's edge collections are compacted.
pub fn is_finalized(objects: &Objects) -> bool {
    objects.is_sealed() && objects.iter().all(|(_, o)| o.is_compact())
}

/// Every edge as `(from, to, edge type)` triples, sorted.
///
/// Mostly useful for comparing graphs in tests and diagnostics.
pub fn edge_list(objects: &Objects) -> Vec<(String, String, &'static str)> {
    let mut edges = Vec::new();
    for (_, object) in objects.iter() {
        for (peer, bits) in object.edges(Direction::Out) {
            for edge_type in bits.iter() {
                edges.push((
                    object.identity().to_string(),
                    objects[peer].identity().to_string(),
                    edge_type.as_str(),
                ));
            }
        }
    }
    edges.sort();
    edges
}
