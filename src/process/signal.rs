//! Signal unification through a self-pipe.
//!
//! The OS-level handler does one thing: `send` the signal number as a single
//! byte into a socket pair. The read end is registered with the process's
//! reactor, so signals show up as ordinary readable events and all real
//! handling (reaping, stopping) runs in the event loop, in order with
//! everything else.

use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use libc::c_int;
use signal_hook::SigId;

pub struct SignalPipe {
    reader: UnixStream,
    writer: UnixStream,
    handlers: Vec<SigId>,
}

impl SignalPipe {
    /// Creates the pipe and routes each of `signals` into it.
    pub fn install(signals: &[c_int]) -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;

        let mut pipe = Self {
            reader,
            writer,
            handlers: Vec::with_capacity(signals.len()),
        };
        let fd = pipe.writer.as_raw_fd();
        for &signal in signals {
            // SAFETY: the action only calls async-signal-safe functions
            // (`send` and errno access) and captures plain integers.
            let id = unsafe { signal_hook::low_level::register(signal, move || notify(fd, signal)) }?;
            pipe.handlers.push(id);
        }
        Ok(pipe)
    }

    /// Descriptor to register for readability.
    pub fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Reads every pending signal byte, oldest first.
    pub fn drain(&mut self) -> io::Result<Vec<c_int>> {
        let mut signals = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(signals),
                Ok(n) => signals.extend(buf[..n].iter().map(|&b| c_int::from(b))),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(signals),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        for id in self.handlers.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Signal-context half of the pipe.
fn notify(fd: RawFd, signal: c_int) {
    let byte = signal as u8;
    unsafe {
        let errno = libc::__errno_location();
        let saved = *errno;
        libc::send(fd, (&byte as *const u8).cast(), 1, libc::MSG_DONTWAIT);
        *errno = saved;
    }
}
