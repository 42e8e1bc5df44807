//! Worker-thread pool.
//!
//! A fixed set of detached threads consuming a bounded [`JobQueue`]. The
//! pool is built once at startup; failing to build it is fatal. There is no
//! shutdown path: the threads live as long as the process.

pub mod queue;

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, bail};

pub use queue::JobQueue;

/// A unit of work a pool thread can run.
pub trait Job: Send + 'static {
    fn process(self);
}

pub struct ThreadPool<T> {
    queue: Arc<JobQueue<T>>,
    threads: usize,
}

impl<T: Job> ThreadPool<T> {
    /// Spawns `threads` workers over a queue holding at most `max_requests`
    /// jobs.
    pub fn new(threads: usize, max_requests: usize) -> Result<Self> {
        if threads == 0 {
            bail!("thread pool needs at least one thread");
        }
        if max_requests == 0 {
            bail!("thread pool queue needs room for at least one request");
        }

        let queue = Arc::new(JobQueue::new(max_requests));
        for id in 0..threads {
            let queue = Arc::clone(&queue);
            // The handle is dropped right away: workers are detached.
            thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || run_worker(id, &queue))
                .with_context(|| format!("Failed to spawn worker thread {id}"))?;
        }
        tracing::info!(threads, max_requests, "Thread pool started");

        Ok(Self { queue, threads })
    }

    /// Queues a job for the workers.
    ///
    /// Never blocks. When the queue is full the job is handed back so the
    /// caller can retry it later.
    pub fn append(&self, job: T) -> Result<(), T> {
        self.queue.push(job)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

fn run_worker<T: Job>(id: usize, queue: &JobQueue<T>) {
    tracing::debug!(worker = id, "Worker thread running");
    loop {
        queue.pop().process();
    }
}
