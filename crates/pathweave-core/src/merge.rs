//! Merge of loader partitions into one graph.
//!
//! Objects are unified by identity key. On collision:
//!
//! - the object type of the first writer is kept unless it is `Other`
//! - per attribute name the first writer's values win; names only a later
//!   writer carries are copied
//! - edge sets are unioned
//! - the first non-empty parent wins and each child is listed under the
//!   parent it resolved to
//! - a parent link that would close a cycle with links from earlier
//!   partitions is dropped
//!
//! Partition roots fold into the unified root, and every object still
//! without a parent afterwards is anchored under the root.

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::graph::{Direction, ObjectId, Objects};

/// Errors that abort a merge. No graph is produced when one is returned.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("partition {index} is already finalized")]
    SealedPartition { index: usize },

    #[error("partition {index} references unknown object {id}")]
    DanglingReference { index: usize, id: ObjectId },
}

/// Result type for merge operations
pub type Result<T> = std::result::Result<T, MergeError>;

/// Unify all partitions into one graph.
///
/// Every partition is validated before any of them is consumed, so on
/// error nothing partial is produced.
pub fn merge(partitions: Vec<Objects>) -> Result<Objects> {
    let start = Instant::now();
    for (index, partition) in partitions.iter().enumerate() {
        validate(index, partition)?;
    }

    let total: usize = partitions.iter().map(Objects::len).sum();
    let partition_count = partitions.len();
    let mut merged = Objects::new();
    merged.reserve(total);

    for (index, partition) in partitions.into_iter().enumerate() {
        let before = merged.len();
        absorb_partition(&mut merged, partition);
        debug!(
            "Merged partition {} ({} new objects)",
            index,
            merged.len() - before
        );
    }

    let anchored = anchor_orphans(&mut merged);

    info!(
        "Merged {} partitions into {} objects ({} anchored under root) in {:?}",
        partition_count,
        merged.len(),
        anchored,
        start.elapsed()
    );
    Ok(merged)
}

fn validate(index: usize, partition: &Objects) -> Result<()> {
    if partition.is_sealed() {
        return Err(MergeError::SealedPartition { index });
    }
    let dangling = |id: ObjectId| -> Result<()> {
        if partition.contains(id) {
            Ok(())
        } else {
            Err(MergeError::DanglingReference { index, id })
        }
    };
    for (_, object) in partition.iter() {
        if let Some(parent) = object.parent() {
            dangling(parent)?;
        }
        for child in object.children() {
            dangling(*child)?;
        }
        for (peer, _) in object.edges(Direction::Out) {
            dangling(peer)?;
        }
    }
    Ok(())
}

fn absorb_partition(merged: &mut Objects, partition: Objects) {
    let (objects, _root) = partition.into_objects();

    // The partition root shares the unified root's identity, so `add`
    // folds it in like any other collision.
    let mut remap: Vec<ObjectId> = Vec::with_capacity(objects.len());
    let mut links = Vec::with_capacity(objects.len());
    for mut object in objects {
        links.push(object.take_links());
        remap.push(merged.add(object));
    }

    for (index, link) in links.into_iter().enumerate() {
        let id = remap[index];
        if let Some(parent) = link.parent {
            let parent = remap[parent.index()];
            if merged[id].parent().is_none() {
                if is_ancestor(merged, id, parent) {
                    warn!(
                        "Dropped parent link {} -> {} that would close a cycle",
                        merged[id].identity(),
                        merged[parent].identity()
                    );
                } else {
                    merged.set_parent(id, parent);
                }
            }
        }
        for (peer, edges) in link.outbound {
            merged.add_edges(id, remap[peer.index()], edges);
        }
    }
}

/// Whether `candidate` is `of` or one of its ancestors.
fn is_ancestor(merged: &Objects, candidate: ObjectId, of: ObjectId) -> bool {
    let mut current = Some(of);
    // Bounded walk; the tree is acyclic but stay safe on a broken chain.
    for _ in 0..=merged.len() {
        match current {
            Some(id) if id == candidate => return true,
            Some(id) => current = merged[id].parent(),
            None => return false,
        }
    }
    false
}

/// Attach every parentless non-root object to the root.
fn anchor_orphans(merged: &mut Objects) -> usize {
    let root = merged.root();
    let orphans: Vec<ObjectId> = merged
        .iter()
        .filter(|(id, object)| *id != root && object.parent().is_none())
        .map(|(id, _)| id)
        .collect();
    for id in &orphans {
        merged.set_parent(*id, root);
    }
    orphans.len()
}
