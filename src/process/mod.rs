//! Pre-fork process pool.
//!
//! One coordinator owns the listening socket's readiness and hands each
//! incoming connection to a worker process by writing a notice on that
//! worker's control channel. Workers accept and serve on private reactors.
//! Signals reach both sides through a [`signal::SignalPipe`].

pub mod coordinator;
pub mod pool;
pub mod signal;
pub mod worker;

pub use coordinator::Coordinator;
pub use pool::{MAX_WORKERS, ProcessPool, Role};
pub use worker::{WorkerDescriptor, WorkerSet, WorkerState};

use libc::{c_int, pid_t};

/// Collects every exited child without blocking.
pub fn reap_exited() -> Vec<pid_t> {
    let mut reaped = Vec::new();
    loop {
        let mut status: c_int = 0;
        // SAFETY: status points to a valid c_int.
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            return reaped;
        }
        reaped.push(pid);
    }
}
