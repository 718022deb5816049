//! Prioritized processing pipeline.
//!
//! Processors are registered at a [`Priority`]. Before-merge priorities run
//! once per loader partition (tagged with the loader that produced it),
//! after-merge priorities run once over the unified graph. Within one
//! priority processors run sequentially in registration order.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::debug;

use crate::graph::Objects;
use crate::loader::LoaderId;

/// Ordered stage markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    BeforeMergeLow,
    BeforeMerge,
    BeforeMergeHigh,
    BeforeMergeFinal,
    AfterMergeLow,
    AfterMerge,
    AfterMergeHigh,
    AfterMergeFinal,
}

impl Priority {
    /// Every priority in execution order.
    pub const ALL: [Priority; 8] = [
        Priority::BeforeMergeLow,
        Priority::BeforeMerge,
        Priority::BeforeMergeHigh,
        Priority::BeforeMergeFinal,
        Priority::AfterMergeLow,
        Priority::AfterMerge,
        Priority::AfterMergeHigh,
        Priority::AfterMergeFinal,
    ];

    pub fn phase(self) -> Phase {
        if self <= Priority::BeforeMergeFinal {
            Phase::BeforeMerge
        } else {
            Phase::AfterMerge
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::BeforeMergeLow => "before-merge-low",
            Priority::BeforeMerge => "before-merge",
            Priority::BeforeMergeHigh => "before-merge-high",
            Priority::BeforeMergeFinal => "before-merge-final",
            Priority::AfterMergeLow => "after-merge-low",
            Priority::AfterMerge => "after-merge",
            Priority::AfterMergeHigh => "after-merge-high",
            Priority::AfterMergeFinal => "after-merge-final",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two halves of the pipeline around the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    BeforeMerge,
    AfterMerge,
}

impl Phase {
    /// Priorities belonging to this phase, ascending.
    pub fn priorities(self) -> impl Iterator<Item = Priority> {
        Priority::ALL.into_iter().filter(move |p| p.phase() == self)
    }
}

/// What a processor is running against.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Free-form label of the graph ("partition", "merged", ...)
    pub label: String,
    pub priority: Priority,
    /// Producing loader; `None` after merge
    pub source: Option<LoaderId>,
    /// Name of the producing loader; `None` after merge
    pub source_name: Option<String>,
}

/// A graph transformation registered at one priority.
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, objects: &mut Objects, context: &StageContext);
}

struct FnProcessor<F> {
    name: String,
    func: F,
}

impl<F> Processor for FnProcessor<F>
where
    F: Fn(&mut Objects, &StageContext) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, objects: &mut Objects, context: &StageContext) {
        (self.func)(objects, context)
    }
}

/// Registry of processors by priority.
#[derive(Default)]
pub struct Pipeline {
    registry: BTreeMap<Priority, Vec<Box<dyn Processor>>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor at a priority.
    pub fn register(&mut self, priority: Priority, processor: Box<dyn Processor>) {
        self.registry.entry(priority).or_default().push(processor);
    }

    /// Register a closure as a processor.
    pub fn register_fn<F>(&mut self, priority: Priority, name: impl Into<String>, func: F)
    where
        F: Fn(&mut Objects, &StageContext) + Send + Sync + 'static,
    {
        self.register(
            priority,
            Box::new(FnProcessor {
                name: name.into(),
                func,
            }),
        );
    }

    /// Number of processors registered at a priority.
    pub fn count(&self, priority: Priority) -> usize {
        self.registry.get(&priority).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.registry.values().all(Vec::is_empty)
    }

    /// Run every processor registered at `priority`, in registration order.
    pub fn process(
        &self,
        objects: &mut Objects,
        label: &str,
        source: Option<(LoaderId, &str)>,
        priority: Priority,
    ) {
        let Some(processors) = self.registry.get(&priority) else {
            return;
        };
        let context = StageContext {
            label: label.to_string(),
            priority,
            source: source.map(|(id, _)| id),
            source_name: source.map(|(_, name)| name.to_string()),
        };
        for processor in processors {
            let start = Instant::now();
            processor.process(objects, &context);
            debug!(
                "Processor '{}' at {} on {} took {:?}",
                processor.name(),
                priority,
                label,
                start.elapsed()
            );
        }
    }

    /// Run every priority of a phase in ascending order.
    pub fn run_phase(
        &self,
        objects: &mut Objects,
        label: &str,
        phase: Phase,
        source: Option<(LoaderId, &str)>,
    ) {
        for priority in phase.priorities() {
            self.process(objects, label, source, priority);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (priority, processors) in &self.registry {
            let names: Vec<&str> = processors.iter().map(|p| p.name()).collect();
            map.entry(priority, &names);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_priority_order() {
        let mut sorted = Priority::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Priority::ALL.to_vec());
        assert_eq!(Priority::BeforeMergeFinal.phase(), Phase::BeforeMerge);
        assert_eq!(Priority::AfterMergeLow.phase(), Phase::AfterMerge);
        assert_eq!(Phase::BeforeMerge.priorities().count(), 4);
    }

    #[test]
    fn test_run_phase_ascending_and_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();

        for (priority, tag) in [
            (Priority::BeforeMergeHigh, "high"),
            (Priority::BeforeMergeLow, "low-1"),
            (Priority::BeforeMergeLow, "low-2"),
            (Priority::AfterMerge, "after"),
        ] {
            let log = Arc::clone(&log);
            pipeline.register_fn(priority, tag, move |_, _| log.lock().push(tag));
        }

        let mut objects = Objects::new();
        pipeline.run_phase(&mut objects, "partition", Phase::BeforeMerge, Some((LoaderId(0), "l")));
        assert_eq!(*log.lock(), vec!["low-1", "low-2", "high"]);

        log.lock().clear();
        pipeline.run_phase(&mut objects, "merged", Phase::AfterMerge, None);
        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[test]
    fn test_context_carries_source() {
        let seen = Arc::new(Mutex::new(None));
        let mut pipeline = Pipeline::new();
        let sink = Arc::clone(&seen);
        pipeline.register_fn(Priority::BeforeMerge, "capture", move |_, ctx| {
            *sink.lock() = Some((ctx.source, ctx.source_name.clone(), ctx.priority));
        });

        let mut objects = Objects::new();
        pipeline.process(&mut objects, "p", Some((LoaderId(2), "Host inventory loader")), Priority::BeforeMerge);
        assert_eq!(
            *seen.lock(),
            Some((
                Some(LoaderId(2)),
                Some("Host inventory loader".to_string()),
                Priority::BeforeMerge
            ))
        );
    }

    #[test]
    fn test_empty_priority_is_noop() {
        let pipeline = Pipeline::new();
        let mut objects = Objects::new();
        pipeline.process(&mut objects, "p", None, Priority::AfterMergeFinal);
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.count(Priority::AfterMergeFinal), 0);
    }
}
