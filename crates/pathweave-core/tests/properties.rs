//! Behavioral guarantees of the ingestion core.
//!
//! Covers partition isolation, merge conservation, priority ordering,
//! finalization idempotence and ingest backpressure through the public API.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use common::{test_config, StubLoader};
use pathweave_core::finalize::edge_list;
use pathweave_core::{
    finalize, merge, EdgeType, Engine, IngestPool, Object, ObjectType, Objects, Phase, Pipeline,
    PoolOptions, Priority,
};

fn people(prefix: &str, count: usize) -> Vec<Object> {
    (0..count)
        .map(|i| Object::new(&format!("{}-{}", prefix, i), ObjectType::Person))
        .collect()
}

#[test]
fn test_before_merge_processors_see_only_their_partition() {
    let seen: Arc<Mutex<HashMap<String, Vec<String>>>> = Arc::new(Mutex::new(HashMap::new()));
    let sink = Arc::clone(&seen);

    let mut pipeline = Pipeline::new();
    pipeline.register_fn(Priority::BeforeMerge, "observe", move |objects, ctx| {
        let identities: Vec<String> = objects
            .iter()
            .filter(|(id, _)| *id != objects.root())
            .map(|(_, o)| o.identity().to_string())
            .collect();
        let source = ctx.source_name.clone().unwrap_or_default();
        sink.lock().insert(source, identities);
    });

    let mut engine = Engine::new(
        vec![
            StubLoader::boxed("left", ".l", people("left", 50)),
            StubLoader::boxed("right", ".r", people("right", 30)),
        ],
        pipeline,
        test_config(),
    );
    let graph = engine.run(&["x.l", "y.r"]).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen["left"].iter().all(|i| i.starts_with("left-")));
    assert!(seen["right"].iter().all(|i| i.starts_with("right-")));
    assert_eq!(seen["left"].len(), 50);
    assert_eq!(graph.len(), 80);
}

#[test]
fn test_disjoint_merge_conserves_objects() {
    let mut a = Objects::new();
    a.extend(people("a", 120));
    let mut b = Objects::new();
    b.extend(people("b", 80));
    let (count_a, count_b) = (a.len(), b.len());

    let merged = merge(vec![a, b]).unwrap();

    assert_eq!(merged.len(), count_a + count_b);
}

#[test]
fn test_priorities_run_in_ascending_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = Pipeline::new();
    for (priority, tag) in [
        (Priority::BeforeMergeHigh, 3),
        (Priority::BeforeMergeLow, 1),
        (Priority::BeforeMerge, 2),
    ] {
        let order = Arc::clone(&order);
        pipeline.register_fn(priority, format!("step-{}", tag), move |_, _| {
            order.lock().push(tag)
        });
    }

    let mut objects = Objects::new();
    pipeline.run_phase(&mut objects, "partition", Phase::BeforeMerge, None);

    assert_eq!(*order.lock(), vec![1, 2, 3]);
}

#[test]
fn test_finalizing_twice_matches_finalizing_once() {
    let mut objects = Objects::new();
    let ids: Vec<_> = people("p", 20).into_iter().map(|o| objects.add(o)).collect();
    for pair in ids.windows(2) {
        objects.add_edge(pair[0], pair[1], EdgeType::Owns);
        objects.add_edge(pair[1], pair[0], EdgeType::HasSession);
    }

    let once = finalize(&mut objects);
    let edges_once = edge_list(&objects);
    let twice = finalize(&mut objects);

    assert_eq!(once, twice);
    assert_eq!(edge_list(&objects), edges_once);
    assert_eq!(edges_once.len(), 38);
}

#[test]
fn test_ingest_queue_never_exceeds_capacity() {
    let capacity = 8;
    let options = PoolOptions {
        name: "slow".to_string(),
        workers: 2,
        capacity,
        batch_size: 4,
    };
    let pool = IngestPool::start(Objects::new(), options, |i: usize| {
        std::thread::sleep(Duration::from_millis(2));
        vec![Object::new(&format!("slow-{}", i), ObjectType::Other)]
    })
    .unwrap();

    let max_pending = AtomicUsize::new(0);
    for i in 0..200 {
        pool.submit(i).unwrap();
        max_pending.fetch_max(pool.pending(), Ordering::Relaxed);
    }

    assert!(max_pending.load(Ordering::Relaxed) <= capacity);
    assert_eq!(pool.finish().unwrap().len(), 200);
}
