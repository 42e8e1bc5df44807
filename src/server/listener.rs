use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use anyhow::Context;
use tracing::info;

/// Sent to clients accepted while the server is at its connection limit.
pub const BUSY_MESSAGE: &[u8] = b"Internal server busy";

/// Binds the listening socket in non-blocking mode. Failure is fatal.
pub fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr).with_context(|| format!("Failed to bind {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("Failed to make listener non-blocking")?;
    info!("Listening on {}", listener.local_addr().context("listener has no address")?);
    Ok(listener)
}

/// Accepts every pending connection on a non-blocking listener.
///
/// Needed with edge-triggered registration: one readiness event may stand
/// for several queued connections. Returns how many were accepted.
pub fn accept_pending(
    listener: &TcpListener,
    mut on_accept: impl FnMut(TcpStream, SocketAddr),
) -> usize {
    let mut accepted = 0;
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                accepted += 1;
                on_accept(stream, peer);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return accepted,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
                return accepted;
            }
        }
    }
}

/// Tells an over-limit client we are busy and drops it.
pub fn reject_busy(mut stream: TcpStream, peer: SocketAddr) {
    tracing::warn!(peer = %peer, "Connection limit reached, rejecting client");
    if let Err(e) = stream.write_all(BUSY_MESSAGE) {
        tracing::debug!(peer = %peer, error = %e, "Failed to send busy notice");
    }
}
