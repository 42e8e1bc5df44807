use std::collections::HashMap;
use std::net::TcpListener;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, error, info, warn};

use crate::process::coordinator::Coordinator;
use crate::process::signal::SignalPipe;
use crate::process::worker::{WorkerDescriptor, WorkerSet, read_notices};
use crate::reactor::{Events, Interest, Mode, Reactor};
use crate::server::listener::{accept_pending, reject_busy};
use crate::server::session::{Readiness, Session, Step};

/// Upper bound on worker processes.
pub const MAX_WORKERS: usize = 16;

const LISTENER: u64 = u64::MAX - 2;
const SIGNALS: u64 = u64::MAX - 1;
const CONTROL: u64 = u64::MAX;

const HANDLED_SIGNALS: [libc::c_int; 3] = [libc::SIGCHLD, libc::SIGTERM, libc::SIGINT];

/// Which side of the fork this process is on.
#[derive(Debug)]
pub enum Role {
    Coordinator { workers: WorkerSet },
    Worker { index: usize, channel: UnixStream },
}

/// A forked pool, as seen from one process.
///
/// [`ProcessPool::spawn`] returns once in the coordinator and once in every
/// worker; [`ProcessPool::run`] then runs the loop for that role.
#[derive(Debug)]
pub struct ProcessPool {
    role: Role,
}

impl ProcessPool {
    /// Forks `workers` worker processes, each with its own control channel.
    pub fn spawn(workers: usize) -> Result<Self> {
        if workers == 0 || workers > MAX_WORKERS {
            bail!("process pool needs between 1 and {MAX_WORKERS} workers, got {workers}");
        }

        let mut descriptors = Vec::with_capacity(workers);
        for index in 0..workers {
            let (parent_end, child_end) =
                UnixStream::pair().context("Failed to create worker channel")?;

            // SAFETY: the child only continues into the worker loop, which
            // builds its own reactor and signal pipe.
            let pid = unsafe { libc::fork() };
            if pid < 0 {
                return Err(std::io::Error::last_os_error())
                    .with_context(|| format!("Failed to fork worker {index}"));
            }

            if pid == 0 {
                drop(parent_end);
                // Channels of earlier siblings belong to the coordinator.
                drop(descriptors);
                return Ok(Self {
                    role: Role::Worker {
                        index,
                        channel: child_end,
                    },
                });
            }

            drop(child_end);
            parent_end
                .set_nonblocking(true)
                .context("Failed to make worker channel non-blocking")?;
            info!(worker = index, pid, "Worker spawned");
            descriptors.push(WorkerDescriptor::new(index, pid, parent_end));
        }

        Ok(Self {
            role: Role::Coordinator {
                workers: WorkerSet::new(descriptors),
            },
        })
    }

    /// Runs this process's loop until the pool shuts down.
    pub fn run<S: Session>(
        self,
        listener: TcpListener,
        ctx: Arc<S::Context>,
        max_connections: usize,
    ) -> Result<()> {
        match self.role {
            Role::Coordinator { workers } => run_coordinator(workers, &listener),
            Role::Worker { index, channel } => {
                run_worker::<S>(index, channel, &listener, ctx, max_connections)
            }
        }
    }
}

fn run_coordinator(workers: WorkerSet, listener: &TcpListener) -> Result<()> {
    let reactor = Reactor::new().context("Failed to create epoll instance")?;
    listener.set_nonblocking(true)?;
    reactor
        .register(listener.as_raw_fd(), LISTENER, Interest::READABLE, Mode::Edge)
        .context("Failed to register listener")?;

    let mut signals = SignalPipe::install(&HANDLED_SIGNALS).context("Failed to install signal pipe")?;
    reactor
        .register(signals.fd(), SIGNALS, Interest::READABLE, Mode::Edge)
        .context("Failed to register signal pipe")?;

    let mut coordinator = Coordinator::new(workers);
    // A worker may have died before the handler was in place.
    coordinator.reap();
    info!(workers = coordinator.workers().live_count(), "Coordinator running");

    let mut events = Events::default();
    while !coordinator.should_stop() {
        reactor.wait(&mut events, None).context("epoll_wait failed")?;
        for event in events.iter() {
            match event.token() {
                LISTENER => {
                    coordinator.dispatch();
                }
                SIGNALS => {
                    for signal in signals.drain().context("Failed to read signal pipe")? {
                        coordinator.handle_signal(signal);
                    }
                }
                token => debug!(token, "Unexpected event in coordinator"),
            }
        }
    }

    info!("Coordinator stopped");
    Ok(())
}

/// Per-worker loop state.
struct Worker<S> {
    index: usize,
    reactor: Reactor,
    sessions: HashMap<RawFd, S>,
    max_connections: usize,
}

impl<S: Session> Worker<S> {
    fn accept(&mut self, listener: &TcpListener, ctx: &Arc<S::Context>) {
        accept_pending(listener, |stream, peer| {
            if self.sessions.len() >= self.max_connections {
                reject_busy(stream, peer);
                return;
            }
            let session = match S::open(stream, peer, Arc::clone(ctx)) {
                Ok(session) => session,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Failed to set up connection");
                    return;
                }
            };
            let fd = session.fd();
            if let Err(e) = self
                .reactor
                .register(fd, fd as u64, Interest::READABLE, Mode::OneShot)
            {
                error!(peer = %peer, error = %e, "Failed to register connection");
                return;
            }
            self.sessions.insert(fd, session);
            info!(worker = self.index, "Accepted connection from {}", peer);
        });
    }

    fn apply(&mut self, fd: RawFd, step: Step) {
        let Some(interest) = step.interest() else {
            self.close(fd);
            return;
        };
        if let Err(e) = self.reactor.rearm(fd, fd as u64, interest) {
            error!(fd, error = %e, "Failed to re-arm connection");
            self.close(fd);
        }
    }

    fn close(&mut self, fd: RawFd) {
        let Some(mut session) = self.sessions.remove(&fd) else {
            return;
        };
        if let Some(stream) = session.close() {
            debug!(peer = %session.peer(), fd, "Connection closed");
            if let Err(e) = self.reactor.deregister(stream) {
                debug!(fd, error = %e, "Deregister failed");
            }
        }
    }

    fn close_all(&mut self) {
        let fds: Vec<RawFd> = self.sessions.keys().copied().collect();
        for fd in fds {
            self.close(fd);
        }
    }
}

fn run_worker<S: Session>(
    index: usize,
    mut channel: UnixStream,
    listener: &TcpListener,
    ctx: Arc<S::Context>,
    max_connections: usize,
) -> Result<()> {
    let mut worker = Worker::<S> {
        index,
        reactor: Reactor::new().context("Failed to create worker epoll instance")?,
        sessions: HashMap::new(),
        max_connections,
    };

    channel.set_nonblocking(true)?;
    worker
        .reactor
        .register(channel.as_raw_fd(), CONTROL, Interest::READABLE, Mode::Edge)
        .context("Failed to register control channel")?;

    let mut signals = SignalPipe::install(&HANDLED_SIGNALS).context("Failed to install signal pipe")?;
    worker
        .reactor
        .register(signals.fd(), SIGNALS, Interest::READABLE, Mode::Edge)
        .context("Failed to register signal pipe")?;

    info!(worker = index, "Worker running");

    let mut events = Events::default();
    let mut stop = false;
    while !stop {
        worker
            .reactor
            .wait(&mut events, None)
            .context("epoll_wait failed")?;

        for event in events.iter() {
            match event.token() {
                CONTROL => {
                    let notices = read_notices(&mut channel).context("Failed to read control channel")?;
                    if notices.count > 0 {
                        worker.accept(listener, &ctx);
                    }
                    if notices.closed {
                        info!(worker = index, "Coordinator went away");
                        stop = true;
                    }
                }
                SIGNALS => {
                    for signal in signals.drain().context("Failed to read signal pipe")? {
                        match signal {
                            libc::SIGCHLD => {
                                crate::process::reap_exited();
                            }
                            libc::SIGTERM | libc::SIGINT => stop = true,
                            _ => {}
                        }
                    }
                }
                token => {
                    let fd = token as RawFd;
                    let Some(session) = worker.sessions.get_mut(&fd) else {
                        continue;
                    };
                    let step = if event.is_hangup() {
                        Step::Close
                    } else if event.is_readable() {
                        session.on_ready(Readiness::Readable)
                    } else if event.is_writable() {
                        session.on_ready(Readiness::Writable)
                    } else {
                        continue;
                    };
                    worker.apply(fd, step);
                }
            }
        }
    }

    worker.close_all();
    info!(worker = index, "Worker stopped");
    Ok(())
}
