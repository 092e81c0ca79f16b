// SPDX-License-Identifier: Apache-2.0

//! Fan-out of lifecycle events to worker threads.
//!
//! Events are routed by a hash of their path, so every event for one path is
//! handled by the same worker, in arrival order. That keeps read passes for a
//! path serialized while different paths are read in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::bounded_channel::{self, BoundedSender};
use crate::tail::error::{Error, Result};
use crate::tail::event::LifecycleEvent;
use crate::tail::reader::StatefulReader;
use crate::tail::record::RecordConsumer;

/// Default number of queued events per worker
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Worker index for `path` out of `workers`
pub fn shard_for(path: &Path, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}

/// Worker threads each driving their own engine
pub struct WorkerPool<C> {
    senders: Vec<BoundedSender<LifecycleEvent>>,
    workers: Vec<JoinHandle<Result<C>>>,
}

impl<C> WorkerPool<C>
where
    C: RecordConsumer + Send + 'static,
{
    /// Start `workers` threads, each with an engine from `reader`.
    pub fn spawn<S>(reader: &StatefulReader<S>, workers: usize, queue_depth: usize) -> Result<Self>
    where
        S: Fn() -> C,
    {
        if workers == 0 {
            return Err(Error::Config("At least one worker is required".to_string()));
        }

        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let (tx, rx) = bounded_channel::bounded::<LifecycleEvent>(queue_depth.max(1));
            let mut engine = reader.engine();

            let handle = thread::Builder::new()
                .name(format!("tail-worker-{}", index))
                .spawn(move || {
                    let mut events = 0u64;
                    while let Some(event) = rx.recv() {
                        if let Err(e) = engine.on_event(&event) {
                            error!(
                                worker = index,
                                path = ?event.path,
                                kind = %event.kind,
                                error = %e,
                                "Failed to handle lifecycle event, stopping worker"
                            );
                            return Err(e);
                        }
                        events += 1;
                    }
                    debug!(worker = index, events, "Tail worker drained");
                    Ok(engine.into_consumer())
                })?;

            senders.push(tx);
            handles.push(handle);
        }

        Ok(Self {
            senders,
            workers: handles,
        })
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Queue `event` on the worker owning its path, blocking while that
    /// worker's queue is full.
    ///
    /// Fails with `WorkerStopped` if that worker already exited on an error;
    /// `join` reports the cause.
    pub fn dispatch(&self, event: LifecycleEvent) -> Result<()> {
        let shard = shard_for(&event.path, self.senders.len());
        self.senders[shard]
            .send(event)
            .map_err(|_| Error::WorkerStopped(shard))
    }

    /// Close the queues, wait for every worker to drain and return their
    /// consumers in worker order. Reports the first worker failure.
    pub fn join(self) -> Result<Vec<C>> {
        drop(self.senders);

        let mut consumers = Vec::with_capacity(self.workers.len());
        let mut first_error = None;

        for (index, handle) in self.workers.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(consumer)) => consumers.push(consumer),
                Ok(Err(e)) => first_error = first_error.or(Some(e)),
                Err(_) => {
                    error!(worker = index, "Tail worker panicked");
                    first_error = first_error.or(Some(Error::WorkerPanicked(index)));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(consumers),
        }
    }
}
