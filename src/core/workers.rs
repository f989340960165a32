//! Background pool for frame fetch + decode
//!
//! Work-stealing deques: jobs go through a global injector, idle workers
//! steal from each other. Jobs never touch player state; they report back
//! through a channel drained on the owner thread.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::{debug, trace};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Dropping the pool never blocks the caller: workers are told to stop and
/// joined from a separate reaper thread. A worker stuck in a transfer exits
/// once the transfer returns.
pub struct Workers {
    name: String,
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Default size: 75% of cores, at least 2 (fetches are mostly I/O waits).
    pub fn default_threads() -> usize {
        (num_cpus::get() * 3 / 4).max(2)
    }

    /// Spawn `num_threads` workers named `{name}-{i}`.
    pub fn new(num_threads: usize, name: &str) -> std::io::Result<Self> {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(Worker::stealer).collect();
        let mut handles = Vec::with_capacity(num_threads);

        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, worker_id))
                .spawn(move || run_worker(worker_id, local, &injector, &stealers, &shutdown))?;
            handles.push(handle);
        }

        trace!("Workers initialized: {} threads", num_threads);

        Ok(Self {
            name: name.to_string(),
            injector,
            handles,
            shutdown,
        })
    }

    /// Queue a job; runs asynchronously on some worker.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }
}

fn run_worker(
    worker_id: usize,
    local: Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
    shutdown: &AtomicBool,
) {
    trace!("Worker {} started", worker_id);
    loop {
        if let Some(job) = local.pop() {
            job();
            continue;
        }

        // Refill the local queue from the injector, batch-wise
        if let Some(job) = injector.steal_batch_and_pop(&local).success() {
            job();
            continue;
        }

        if let Some(job) = stealers.iter().find_map(|s| s.steal().success()) {
            job();
            continue;
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        // No work: short sleep instead of spinning
        thread::sleep(Duration::from_millis(1));
    }
    trace!("Worker {} stopped", worker_id);
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);
        self.shutdown.store(true, Ordering::SeqCst);

        let handles = std::mem::take(&mut self.handles);
        let reaper = thread::Builder::new()
            .name(format!("{}-reaper", self.name))
            .spawn(move || {
                for handle in handles {
                    let _ = handle.join();
                }
                trace!("All {} workers stopped", num_threads);
            });
        if let Err(e) = reaper {
            // Handles were moved into the failed closure and dropped: detached
            debug!("Could not spawn worker reaper ({}), detaching workers", e);
        }
    }
}
