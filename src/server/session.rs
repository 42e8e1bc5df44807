//! The capability both worker pools need from a connection type.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::RawFd;
use std::sync::Arc;

use crate::reactor::Interest;

/// Which readiness woke the session up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Readable,
    Writable,
}

/// What the session wants next from the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Re-arm for readability.
    Read,
    /// Re-arm for writability.
    Write,
    /// Deregister and close.
    Close,
}

impl Step {
    pub fn interest(self) -> Option<Interest> {
        match self {
            Step::Read => Some(Interest::READABLE),
            Step::Write => Some(Interest::WRITABLE),
            Step::Close => None,
        }
    }
}

/// A connection-like unit that a pool can drive: created from an accepted
/// socket, advanced one step per readiness event.
pub trait Session: Send + Sized + 'static {
    /// Shared, read-only state every session of this type needs.
    type Context: Send + Sync + 'static;

    fn open(stream: TcpStream, peer: SocketAddr, ctx: Arc<Self::Context>) -> io::Result<Self>;

    fn fd(&self) -> RawFd;

    fn peer(&self) -> SocketAddr;

    /// Runs until the session needs another readiness event.
    fn on_ready(&mut self, ready: Readiness) -> Step;

    /// Releases per-request resources and hands back the socket so the
    /// caller can deregister it. Returns `None` if already closed.
    fn close(&mut self) -> Option<TcpStream>;
}
