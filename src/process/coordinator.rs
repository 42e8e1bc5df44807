//! Coordinator-side event handling for the process pool.
//!
//! Kept free of the reactor and of `fork` so the liveness rules can be
//! driven directly. Notices go to live workers in round-robin order. A
//! worker turns dead only once reaped, and the loop ends when nobody is
//! left to serve, including after a shutdown signal.

use libc::{c_int, pid_t};

use crate::process::reap_exited;
use crate::process::worker::WorkerSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Notice written to this worker index.
    Worker(usize),
    /// No live worker accepted the notice.
    NoWorkers,
}

#[derive(Debug)]
pub struct Coordinator {
    workers: WorkerSet,
    terminating: bool,
    stop: bool,
}

impl Coordinator {
    pub fn new(workers: WorkerSet) -> Self {
        let stop = workers.all_dead();
        Self {
            workers,
            terminating: false,
            stop,
        }
    }

    pub fn workers(&self) -> &WorkerSet {
        &self.workers
    }

    pub fn should_stop(&self) -> bool {
        self.stop
    }

    /// A shutdown signal arrived; waiting for workers to exit.
    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    /// Tells the next live worker to accept a connection.
    ///
    /// A worker whose channel fails is skipped, not marked dead: it turns
    /// dead when its exit is reaped. With no live worker left the
    /// coordinator stops.
    pub fn dispatch(&mut self) -> Dispatched {
        if self.terminating {
            return Dispatched::NoWorkers;
        }
        for _ in 0..self.workers.len() {
            let Some(worker) = self.workers.next_live() else {
                break;
            };
            match worker.notify() {
                Ok(()) => {
                    tracing::debug!(worker = worker.index, "Dispatched connection");
                    return Dispatched::Worker(worker.index);
                }
                Err(e) => {
                    tracing::warn!(worker = worker.index, error = %e, "Failed to notify worker");
                }
            }
        }

        if self.workers.all_dead() {
            tracing::error!("No live workers left");
            self.stop = true;
        }
        Dispatched::NoWorkers
    }

    /// Records that `pid` exited.
    pub fn on_child_exit(&mut self, pid: pid_t) {
        match self.workers.mark_reaped(pid) {
            Some(index) => tracing::warn!(worker = index, pid, "Worker exited"),
            None => tracing::debug!(pid, "Reaped unknown child"),
        }
        if self.workers.all_dead() {
            self.stop = true;
        }
    }

    /// Reaps every exited child without blocking.
    pub fn reap(&mut self) {
        for pid in reap_exited() {
            self.on_child_exit(pid);
        }
    }

    /// Sends SIGTERM to every live worker.
    pub fn terminate_workers(&self) {
        for pid in self.workers.live_pids() {
            tracing::info!(pid, "Terminating worker");
            // SAFETY: plain syscall on a pid we forked and have not reaped.
            if unsafe { libc::kill(pid, libc::SIGTERM) } == -1 {
                let e = std::io::Error::last_os_error();
                tracing::warn!(pid, error = %e, "Failed to signal worker");
            }
        }
    }

    pub fn handle_signal(&mut self, signal: c_int) {
        match signal {
            libc::SIGCHLD => self.reap(),
            libc::SIGTERM | libc::SIGINT => {
                tracing::info!(signal, "Shutting down process pool");
                self.terminating = true;
                self.terminate_workers();
            }
            _ => tracing::debug!(signal, "Ignoring signal"),
        }
    }
}
