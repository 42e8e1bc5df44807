//! Thread-pool architecture: one reactor thread, N worker threads.
//!
//! The reactor thread only accepts, registers sockets one-shot, and queues
//! ready sessions. Workers run one session step, then re-arm (or close) the
//! one descriptor they handled. One-shot arming guarantees a session is never
//! in two workers at once, and that request N+1 is not read before response
//! N is flushed.

use std::collections::HashMap;
use std::net::TcpListener;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::pool::{Job, ThreadPool};
use crate::reactor::{Events, Interest, Mode, Reactor};
use crate::server::listener::{accept_pending, reject_busy};
use crate::server::session::{Readiness, Session, Step};
use crate::sync::lock;

const LISTENER: u64 = u64::MAX;

/// State shared by the reactor thread and the workers.
struct Shared<S> {
    reactor: Reactor,
    sessions: Mutex<HashMap<RawFd, Arc<Mutex<S>>>>,
}

impl<S: Session> Shared<S> {
    /// Applies a session's next step to its registration.
    fn apply(&self, session: &mut S, step: Step) {
        let fd = session.fd();
        let Some(interest) = step.interest() else {
            self.close(session);
            return;
        };
        if let Err(e) = self.reactor.rearm(fd, fd as u64, interest) {
            tracing::error!(fd, error = %e, "Failed to re-arm connection");
            self.close(session);
        }
    }

    fn close(&self, session: &mut S) {
        let fd = session.fd();
        // Unmap the table entry before the descriptor number can be reused.
        lock(&self.sessions).remove(&fd);
        if let Some(stream) = session.close() {
            tracing::debug!(peer = %session.peer(), fd, "Connection closed");
            if let Err(e) = self.reactor.deregister(stream) {
                tracing::debug!(fd, error = %e, "Deregister failed");
            }
        }
    }
}

/// A ready session travelling through the job queue.
pub struct Dispatch<S: Session> {
    session: Arc<Mutex<S>>,
    ready: Readiness,
    shared: Arc<Shared<S>>,
}

impl<S: Session> Job for Dispatch<S> {
    fn process(self) {
        let mut session = lock(&self.session);
        let step = session.on_ready(self.ready);
        self.shared.apply(&mut session, step);
    }
}

/// Serves `listener` forever.
///
/// Only returns on a fatal error: pool construction, reactor setup, or a
/// failing `epoll_wait`.
pub fn run<S: Session>(
    listener: TcpListener,
    ctx: Arc<S::Context>,
    threads: usize,
    max_requests: usize,
    max_connections: usize,
) -> Result<()> {
    let pool: ThreadPool<Dispatch<S>> =
        ThreadPool::new(threads, max_requests).context("Failed to build thread pool")?;
    let shared = Arc::new(Shared {
        reactor: Reactor::new().context("Failed to create epoll instance")?,
        sessions: Mutex::new(HashMap::new()),
    });

    listener.set_nonblocking(true)?;
    shared
        .reactor
        .register(listener.as_raw_fd(), LISTENER, Interest::READABLE, Mode::Edge)
        .context("Failed to register listener")?;

    let mut events = Events::default();
    loop {
        shared
            .reactor
            .wait(&mut events, None)
            .context("epoll_wait failed")?;

        for event in events.iter() {
            if event.token() == LISTENER {
                accept_pending(&listener, |stream, peer| {
                    if lock(&shared.sessions).len() >= max_connections {
                        reject_busy(stream, peer);
                        return;
                    }
                    let session = match S::open(stream, peer, Arc::clone(&ctx)) {
                        Ok(session) => session,
                        Err(e) => {
                            tracing::warn!(peer = %peer, error = %e, "Failed to set up connection");
                            return;
                        }
                    };
                    let fd = session.fd();
                    let session = Arc::new(Mutex::new(session));
                    lock(&shared.sessions).insert(fd, Arc::clone(&session));
                    if let Err(e) =
                        shared
                            .reactor
                            .register(fd, fd as u64, Interest::READABLE, Mode::OneShot)
                    {
                        tracing::error!(peer = %peer, error = %e, "Failed to register connection");
                        shared.close(&mut lock(&session));
                        return;
                    }
                    tracing::info!("Accepted connection from {}", peer);
                });
                continue;
            }

            let fd = event.token() as RawFd;
            let Some(session) = lock(&shared.sessions).get(&fd).cloned() else {
                continue;
            };

            if event.is_hangup() {
                shared.close(&mut lock(&session));
                continue;
            }

            let ready = if event.is_readable() {
                Readiness::Readable
            } else if event.is_writable() {
                Readiness::Writable
            } else {
                continue;
            };

            let job = Dispatch {
                session,
                ready,
                shared: Arc::clone(&shared),
            };
            if let Err(job) = pool.append(job) {
                // Leave it armed so the same readiness comes back next cycle.
                tracing::warn!(fd, queued = pool.queued(), "Job queue full, deferring connection");
                let interest = match job.ready {
                    Readiness::Readable => Interest::READABLE,
                    Readiness::Writable => Interest::WRITABLE,
                };
                if let Err(e) = shared.reactor.rearm(fd, fd as u64, interest) {
                    tracing::error!(fd, error = %e, "Failed to re-arm deferred connection");
                    shared.close(&mut lock(&job.session));
                }
            }
        }
    }
}
