use std::fmt::{self, Write as _};
use std::io::{self, IoSlice, Write};

use bytes::{BufMut, BytesMut};
use memmap2::Mmap;

use crate::http::response::{Body, Response, StatusCode};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Initial capacity of the header segment.
pub const WRITE_BUF_SIZE: usize = 2048;

/// Writes the status line and headers of `resp`, followed by the blank line.
pub fn serialize_head(resp: &Response, buf: &mut BytesMut) {
    // `BytesMut` grows on demand, so formatting into it cannot fail.
    let _ = write_head(resp, buf);
}

fn write_head(resp: &Response, buf: &mut BytesMut) -> fmt::Result {
    write!(
        buf,
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    )?;
    write!(buf, "Content-Length: {}\r\n", resp.content_length())?;
    if let Some(content_type) = resp.content_type {
        write!(buf, "Content-Type: {}\r\n", content_type)?;
    }
    let connection = if resp.keep_alive { "keep-alive" } else { "close" };
    write!(buf, "Connection: {}\r\n", connection)?;
    buf.put_slice(b"\r\n");
    Ok(())
}

/// Progress of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Every byte of the response has been handed to the kernel.
    Done,
    /// The socket buffer is full; call again once it is writable.
    WouldBlock,
}

/// A response split into at most two segments: the header buffer (which
/// also carries canned bodies) and a memory-mapped file. Both are sent with
/// one vectored write per attempt.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    keep_alive: bool,
    head: BytesMut,
    body: Option<Mmap>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: Response) -> Self {
        let mut head = BytesMut::with_capacity(WRITE_BUF_SIZE);
        serialize_head(&response, &mut head);
        let body = match response.body {
            Body::Canned(text) => {
                head.put_slice(text.as_bytes());
                None
            }
            Body::Mapped(map) => Some(map),
        };
        Self {
            status: response.status,
            keep_alive: response.keep_alive,
            head,
            body,
            written: 0,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn total_len(&self) -> usize {
        self.head.len() + self.body.as_ref().map_or(0, |m| m.len())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn is_done(&self) -> bool {
        self.written == self.total_len()
    }

    /// Number of output segments (1 or 2).
    pub fn segments(&self) -> usize {
        1 + usize::from(self.body.is_some())
    }

    /// Writes as much as the destination accepts without blocking.
    pub fn write_to<W: Write>(&mut self, dst: &mut W) -> io::Result<Flush> {
        while !self.is_done() {
            let head_len = self.head.len();
            let body: &[u8] = self.body.as_deref().unwrap_or(&[]);
            let res = if self.written < head_len {
                let slices = [IoSlice::new(&self.head[self.written..]), IoSlice::new(body)];
                dst.write_vectored(&slices)
            } else {
                dst.write_vectored(&[IoSlice::new(&body[self.written - head_len..])])
            };
            match res {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Flush::WouldBlock),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Flush::Done)
    }
}
