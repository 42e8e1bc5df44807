//! Worker process bookkeeping on the coordinator side.
//!
//! This module tracks the pre-forked workers, their liveness, and selects
//! the next worker for an incoming connection.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;

use libc::pid_t;

/// The only message on a control channel: "accept a connection".
pub const NEW_CONNECTION: u32 = 1;

/// Size of one notice on the wire.
pub const NOTICE_LEN: usize = std::mem::size_of::<u32>();

/// Liveness of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Running under this pid.
    Live(pid_t),
    /// Exited and reaped.
    Dead,
}

/// The coordinator's view of one worker.
#[derive(Debug)]
pub struct WorkerDescriptor {
    /// Position in the pool
    pub index: usize,

    /// Current liveness; `Dead` exactly when the pid has been reaped
    pub state: WorkerState,

    /// Coordinator end of the control channel, closed once dead
    channel: Option<UnixStream>,
}

impl WorkerDescriptor {
    pub fn new(index: usize, pid: pid_t, channel: UnixStream) -> Self {
        Self {
            index,
            state: WorkerState::Live(pid),
            channel: Some(channel),
        }
    }

    pub fn pid(&self) -> Option<pid_t> {
        match self.state {
            WorkerState::Live(pid) => Some(pid),
            WorkerState::Dead => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, WorkerState::Live(_))
    }

    /// Marks the worker reaped and closes its channel.
    pub fn mark_dead(&mut self) {
        self.state = WorkerState::Dead;
        self.channel = None;
    }

    /// Sends one "new connection" notice.
    pub fn notify(&mut self) -> io::Result<()> {
        match self.channel.as_mut() {
            Some(channel) => channel.write_all(&NEW_CONNECTION.to_ne_bytes()),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "worker is dead")),
        }
    }
}

/// Fixed-size set of workers with a round-robin cursor.
#[derive(Debug)]
pub struct WorkerSet {
    workers: Vec<WorkerDescriptor>,
    cursor: usize,
}

impl WorkerSet {
    pub fn new(workers: Vec<WorkerDescriptor>) -> Self {
        Self { workers, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerDescriptor> {
        self.workers.iter()
    }

    pub fn live_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_live()).count()
    }

    pub fn all_dead(&self) -> bool {
        self.live_count() == 0
    }

    pub fn live_pids(&self) -> Vec<pid_t> {
        self.workers.iter().filter_map(WorkerDescriptor::pid).collect()
    }

    /// Selects the next live worker, starting at the cursor, and moves the
    /// cursor just past it.
    ///
    /// Returns `None` if every worker is dead.
    pub fn next_live(&mut self) -> Option<&mut WorkerDescriptor> {
        let len = self.workers.len();
        let index = (0..len)
            .map(|offset| (self.cursor + offset) % len)
            .find(|&i| self.workers[i].is_live())?;
        self.cursor = (index + 1) % len;
        Some(&mut self.workers[index])
    }

    /// Marks the worker with `pid` dead. Returns its index if it was ours.
    pub fn mark_reaped(&mut self, pid: pid_t) -> Option<usize> {
        let worker = self.workers.iter_mut().find(|w| w.pid() == Some(pid))?;
        worker.mark_dead();
        Some(worker.index)
    }
}

/// What a worker found on its control channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Notices {
    /// Complete notices received.
    pub count: usize,
    /// The coordinator closed its end.
    pub closed: bool,
}

/// Drains a non-blocking control channel.
pub fn read_notices(channel: &mut UnixStream) -> io::Result<Notices> {
    let mut notices = Notices::default();
    let mut buf = [0u8; 16 * NOTICE_LEN];
    loop {
        match channel.read(&mut buf) {
            Ok(0) => {
                notices.closed = true;
                return Ok(notices);
            }
            Ok(n) => notices.count += n / NOTICE_LEN,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(notices),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
