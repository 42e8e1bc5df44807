//! Readiness notification.
//!
//! A thin wrapper over Linux `epoll`. Every descriptor is registered with a
//! caller-chosen `u64` token that comes back in its events. Connections are
//! registered in one-shot mode: after an event fires the descriptor is
//! disarmed until whoever handled the event calls [`Reactor::rearm`]. That is
//! what keeps two worker threads from ever touching the same connection.
//!
//! ```text
//!   register(fd, ONESHOT) ──► event ──► (disarmed) ──► handler runs
//!          ▲                                              │
//!          └──────────────── rearm(fd, interest) ◄────────┘
//! ```

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

/// Maximum number of events returned by a single [`Reactor::wait`].
pub const MAX_EVENTS: usize = 1024;

/// What a registration is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest(u32);

impl Interest {
    /// Readable, including the peer shutting down its write half.
    pub const READABLE: Interest = Interest((libc::EPOLLIN | libc::EPOLLRDHUP) as u32);
    /// Writable.
    pub const WRITABLE: Interest = Interest(libc::EPOLLOUT as u32);

    fn bits(self) -> u32 {
        self.0
    }
}

/// How a registration fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fires for as long as the descriptor is ready.
    Level,
    /// Fires on each readiness transition.
    Edge,
    /// Edge-triggered, and disarmed after the first event until re-armed.
    OneShot,
}

impl Mode {
    fn bits(self) -> u32 {
        match self {
            Mode::Level => 0,
            Mode::Edge => libc::EPOLLET as u32,
            Mode::OneShot => (libc::EPOLLET | libc::EPOLLONESHOT) as u32,
        }
    }
}

/// One readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    token: u64,
    flags: u32,
}

impl Event {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_readable(&self) -> bool {
        self.flags & (libc::EPOLLIN | libc::EPOLLRDHUP) as u32 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.flags & libc::EPOLLOUT as u32 != 0
    }

    /// The peer hung up entirely or the socket is in error. A half-close
    /// (`EPOLLRDHUP` alone) is reported as readable instead, so buffered
    /// request bytes still get served.
    pub fn is_hangup(&self) -> bool {
        self.flags & (libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0
    }
}

/// Buffer that [`Reactor::wait`] fills.
pub struct Events {
    raw: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            raw: vec![libc::epoll_event { events: 0, u64: 0 }; capacity],
            len: 0,
        }
    }

    /// Events produced by the last `wait`. Calling `wait` again restarts the
    /// sequence.
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.raw[..self.len].iter().map(|raw| Event {
            token: raw.u64,
            flags: raw.events,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::with_capacity(MAX_EVENTS)
    }
}

/// An epoll instance. Safe to share between threads: the kernel serializes
/// `epoll_ctl` calls against concurrent `epoll_wait`s.
#[derive(Debug)]
pub struct Reactor {
    epoll: OwnedFd,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        let fd = cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        // SAFETY: epoll_create1 returned a fresh descriptor that nothing else owns.
        let epoll = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { epoll })
    }

    /// Starts watching `fd`.
    pub fn register(&self, fd: RawFd, token: u64, interest: Interest, mode: Mode) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, interest.bits() | mode.bits())
    }

    /// Re-arms a one-shot registration with a (possibly different) interest.
    pub fn rearm(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, interest.bits() | Mode::OneShot.bits())
    }

    /// Stops watching a descriptor and closes it.
    ///
    /// Ownership of the descriptor moves into this call, so once it returns
    /// the descriptor is gone whether or not the removal itself succeeded.
    pub fn deregister(&self, fd: impl Into<OwnedFd>) -> io::Result<()> {
        let fd: OwnedFd = fd.into();
        let res = cvt(unsafe {
            libc::epoll_ctl(
                self.epoll.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd.as_raw_fd(),
                ptr::null_mut(),
            )
        });
        drop(fd);
        res.map(|_| ())
    }

    /// Blocks until at least one event is ready or `timeout` expires
    /// (`None` waits forever). A signal interrupting the wait yields zero
    /// events rather than an error so the caller can look at its signal pipe.
    pub fn wait(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<usize> {
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
        };
        let n = unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                events.raw.as_mut_ptr(),
                events.raw.len() as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            events.len = 0;
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        events.len = n as usize;
        Ok(events.len)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, token: u64, flags: u32) -> io::Result<()> {
        let mut event = libc::epoll_event { events: flags, u64: token };
        cvt(unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) })?;
        Ok(())
    }
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}
