//! Bounded ingestion pool shared by the loaders.
//!
//! A decoder thread submits raw records into a bounded `flume` channel;
//! worker threads convert them into objects and append them to the loader's
//! partition in batches, one mutex acquisition per batch. A full channel
//! blocks `submit`, which is what keeps memory bounded while a fast decoder
//! outruns conversion.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use pathweave_config::IngestConfig;
use tracing::debug;

use crate::graph::{Object, Objects};
use crate::loader::LoaderError;

/// Sizing for one pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Thread name prefix
    pub name: String,
    /// Number of worker threads
    pub workers: usize,
    /// Bounded channel capacity
    pub capacity: usize,
    /// Objects appended per lock acquisition
    pub batch_size: usize,
}

impl PoolOptions {
    /// Options from the ingest configuration with an explicit queue capacity.
    pub fn from_config(name: impl Into<String>, config: &IngestConfig, capacity: usize) -> Self {
        Self {
            name: name.into(),
            workers: config.worker_count(),
            capacity: capacity.max(1),
            batch_size: config.batch_size.max(1),
        }
    }
}

/// Worker pool converting records of type `R` into objects of one partition.
pub struct IngestPool<R> {
    sender: Option<flume::Sender<R>>,
    workers: Vec<JoinHandle<()>>,
    partition: Arc<Mutex<Objects>>,
}

impl<R: Send + 'static> IngestPool<R> {
    /// Spawn the workers. `convert` runs on worker threads and may return
    /// zero or more objects per record.
    pub fn start<F>(partition: Objects, options: PoolOptions, convert: F) -> Result<Self, LoaderError>
    where
        F: Fn(R) -> Vec<Object> + Send + Sync + 'static,
    {
        let (sender, receiver) = flume::bounded::<R>(options.capacity);
        let partition = Arc::new(Mutex::new(partition));
        let convert = Arc::new(convert);

        let mut workers = Vec::with_capacity(options.workers);
        for index in 0..options.workers.max(1) {
            let receiver = receiver.clone();
            let partition = Arc::clone(&partition);
            let convert = Arc::clone(&convert);
            let batch_size = options.batch_size;
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", options.name, index))
                .spawn(move || run_worker(receiver, partition, convert.as_ref(), batch_size))
                .map_err(LoaderError::Spawn)?;
            workers.push(handle);
        }

        debug!(
            "Started ingest pool '{}' with {} workers (capacity {}, batch {})",
            options.name,
            workers.len(),
            options.capacity,
            options.batch_size
        );

        Ok(Self {
            sender: Some(sender),
            workers,
            partition,
        })
    }

    /// Queue a record, blocking while the queue is full.
    pub fn submit(&self, record: R) -> Result<(), LoaderError> {
        let sender = self.sender.as_ref().ok_or(LoaderError::QueueClosed)?;
        sender.send(record).map_err(|_| LoaderError::QueueClosed)
    }

    /// Records queued but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.sender.as_ref().map_or(0, flume::Sender::len)
    }

    /// Close the queue, wait for every worker to drain it and return the
    /// partition.
    pub fn finish(mut self) -> Result<Objects, LoaderError> {
        drop(self.sender.take());
        let mut panicked = false;
        for handle in self.workers.drain(..) {
            panicked |= handle.join().is_err();
        }
        if panicked {
            return Err(LoaderError::WorkerPanicked);
        }
        let partition = Arc::try_unwrap(self.partition).map_err(|_| LoaderError::WorkerPanicked)?;
        Ok(partition.into_inner())
    }
}

fn run_worker<R, F>(
    receiver: flume::Receiver<R>,
    partition: Arc<Mutex<Objects>>,
    convert: &F,
    batch_size: usize,
) where
    F: Fn(R) -> Vec<Object>,
{
    let mut batch: Vec<Object> = Vec::with_capacity(batch_size);
    for record in receiver.iter() {
        batch.extend(convert(record));
        if batch.len() >= batch_size {
            partition.lock().extend(batch.drain(..));
        }
    }
    if !batch.is_empty() {
        partition.lock().extend(batch.drain(..));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ObjectType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn options(workers: usize, capacity: usize, batch_size: usize) -> PoolOptions {
        PoolOptions {
            name: "test-pool".to_string(),
            workers,
            capacity,
            batch_size,
        }
    }

    #[test]
    fn test_pool_converts_every_record() {
        let pool = IngestPool::start(Objects::new(), options(4, 16, 8), |i: usize| {
            vec![Object::new(&format!("obj-{}", i), ObjectType::Person)]
        })
        .unwrap();

        for i in 0..1000 {
            pool.submit(i).unwrap();
        }
        let partition = pool.finish().unwrap();
        assert_eq!(partition.len(), 1000);
        assert!(partition.find_by_identity("obj-999").is_some());
    }

    #[test]
    fn test_convert_may_drop_records() {
        let pool = IngestPool::start(Objects::new(), options(2, 4, 3), |i: usize| {
            if i % 2 == 0 {
                vec![Object::new(&format!("even-{}", i), ObjectType::Other)]
            } else {
                Vec::new()
            }
        })
        .unwrap();
        for i in 0..10 {
            pool.submit(i).unwrap();
        }
        assert_eq!(pool.finish().unwrap().len(), 5);
    }

    #[test]
    fn test_full_queue_blocks_submitter() {
        let (gate_tx, gate_rx) = flume::bounded::<()>(0);
        let capacity = 4;
        let workers = 1;
        let pool = IngestPool::start(Objects::new(), options(workers, capacity, 1), move |i: usize| {
            let _ = gate_rx.recv();
            vec![Object::new(&format!("gated-{}", i), ObjectType::Other)]
        })
        .unwrap();

        let submitted = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..20 {
                    pool.submit(i).unwrap();
                    submitted.fetch_add(1, Ordering::SeqCst);
                }
            });

            std::thread::sleep(Duration::from_millis(100));
            assert!(pool.pending() <= capacity);
            assert!(submitted.load(Ordering::SeqCst) <= capacity + workers);

            for _ in 0..20 {
                gate_tx.send(()).unwrap();
            }
        });

        assert_eq!(submitted.load(Ordering::SeqCst), 20);
        assert_eq!(pool.finish().unwrap().len(), 20);
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let pool = IngestPool::start(Objects::new(), options(1, 2, 1), |i: usize| {
            if i == 3 {
                panic!("conversion bug");
            }
            Vec::new()
        })
        .unwrap();
        for i in 0..3 {
            pool.submit(i).unwrap();
        }
        // The fourth record kills the only worker; later submits may fail.
        let _ = pool.submit(3);
        assert!(matches!(pool.finish(), Err(LoaderError::WorkerPanicked)));
    }
}
