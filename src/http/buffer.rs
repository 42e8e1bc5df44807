//! Fixed-capacity read buffer with explicit parse cursors.

use std::io::{self, Read};
use std::ops::Range;

/// Capacity of a connection's read buffer. A request whose headers (plus
/// body) do not fit is rejected rather than grown into.
pub const READ_BUF_SIZE: usize = 4096;

/// Positions into the read buffer.
///
/// `line_start ≤ scan ≤ filled ≤ capacity` holds after every mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    line_start: usize,
    scan: usize,
    filled: usize,
}

impl Cursor {
    pub fn line_start(&self) -> usize {
        self.line_start
    }

    pub fn scan(&self) -> usize {
        self.scan
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    fn check(&self, capacity: usize) {
        debug_assert!(
            self.line_start <= self.scan && self.scan <= self.filled && self.filled <= capacity,
            "cursor invariant violated: {self:?} (capacity {capacity})"
        );
    }
}

/// Result of scanning for a line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A full `\r\n`-terminated line; the range excludes the terminator.
    Complete(Range<usize>),
    /// No terminator yet.
    Incomplete,
    /// A bare `\n`, or `\r` followed by something other than `\n`.
    Malformed,
}

/// Outcome of draining a socket into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// The socket has no more bytes for now.
    Drained,
    /// The peer closed its write half.
    PeerClosed,
    /// The buffer has no room left.
    Full,
}

pub struct ReadBuffer {
    buf: Box<[u8]>,
    cursor: Cursor,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::with_capacity(READ_BUF_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            cursor: Cursor::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn is_full(&self) -> bool {
        self.cursor.filled == self.buf.len()
    }

    /// Bytes received but not yet consumed by the scanner.
    pub fn unscanned(&self) -> usize {
        self.cursor.filled - self.cursor.scan
    }

    pub fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    /// Reads from `src` until it would block, reports EOF, or the buffer is
    /// full. Interrupted reads are retried.
    pub fn fill_from<R: Read>(&mut self, src: &mut R) -> io::Result<Fill> {
        loop {
            if self.is_full() {
                return Ok(Fill::Full);
            }
            match src.read(&mut self.buf[self.cursor.filled..]) {
                Ok(0) => return Ok(Fill::PeerClosed),
                Ok(n) => self.advance_filled(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Fill::Drained),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Copies `data` in, as far as it fits. Returns how many bytes were taken.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> usize {
        let start = self.cursor.filled;
        let n = data.len().min(self.buf.len() - start);
        self.buf[start..start + n].copy_from_slice(&data[..n]);
        self.advance_filled(n);
        n
    }

    fn advance_filled(&mut self, n: usize) {
        self.cursor.filled += n;
        self.cursor.check(self.buf.len());
    }

    /// Scans newly filled bytes for the end of the current line.
    ///
    /// On `Complete` the scan position moves past the terminator and the next
    /// line starts there. A `\r` that is the last byte received leaves the scan
    /// position on it, so the decision is retried once more bytes arrive.
    pub fn scan_line(&mut self) -> Line {
        let filled = self.cursor.filled;
        let mut i = self.cursor.scan;
        while i < filled {
            match self.buf[i] {
                b'\r' => {
                    if i + 1 == filled {
                        self.cursor.scan = i;
                        self.cursor.check(self.buf.len());
                        return Line::Incomplete;
                    }
                    if self.buf[i + 1] != b'\n' {
                        return Line::Malformed;
                    }
                    let line = self.cursor.line_start..i;
                    self.cursor.scan = i + 2;
                    self.cursor.line_start = self.cursor.scan;
                    self.cursor.check(self.buf.len());
                    return Line::Complete(line);
                }
                b'\n' => return Line::Malformed,
                _ => i += 1,
            }
        }
        self.cursor.scan = filled;
        self.cursor.check(self.buf.len());
        Line::Incomplete
    }

    /// Consumes `len` body bytes past the scan position, if they are all here.
    pub fn take_body(&mut self, len: usize) -> Option<Range<usize>> {
        if self.unscanned() < len {
            return None;
        }
        let body = self.cursor.scan..self.cursor.scan + len;
        self.cursor.scan += len;
        self.cursor.line_start = self.cursor.scan;
        self.cursor.check(self.buf.len());
        Some(body)
    }

    /// Room left for a body after the bytes consumed so far.
    pub fn room_after_scan(&self) -> usize {
        self.buf.len() - self.cursor.scan
    }

    /// Drops everything consumed so far and moves any unconsumed bytes (the
    /// start of a following request) to the front.
    pub fn compact(&mut self) {
        let start = self.cursor.scan;
        let end = self.cursor.filled;
        self.buf.copy_within(start..end, 0);
        self.cursor = Cursor {
            line_start: 0,
            scan: 0,
            filled: end - start,
        };
        self.cursor.check(self.buf.len());
    }

    /// Forgets all buffered bytes.
    pub fn clear(&mut self) {
        self.cursor = Cursor::default();
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}
