//! Incremental HTTP/1.1 request parser.
//!
//! The parser works directly on a connection's [`ReadBuffer`] and can be
//! resumed after every read: feeding a request in one piece or one byte at a
//! time produces the same result.

use std::fmt;

use url::Url;

use crate::http::buffer::{Line, READ_BUF_SIZE, ReadBuffer};
use crate::http::request::{Method, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// A bare `\n` or a `\r` not followed by `\n`.
    MalformedLine,
    /// The request line does not have exactly three parts.
    InvalidRequestLine,
    /// Unknown method, or a known one other than `GET`.
    UnsupportedMethod,
    /// Anything but `HTTP/1.1`.
    UnsupportedVersion,
    /// Target is neither origin-form nor `http://` absolute-form.
    InvalidTarget,
    /// A recognized header whose value is not valid UTF-8.
    InvalidHeader,
    InvalidContentLength,
    /// Headers (or headers plus body) do not fit in the read buffer.
    TooLarge,
    /// More bytes are needed. Only returned by [`parse_http_request`].
    Incomplete,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseError::MalformedLine => "malformed line terminator",
            ParseError::InvalidRequestLine => "invalid request line",
            ParseError::UnsupportedMethod => "unsupported method",
            ParseError::UnsupportedVersion => "unsupported protocol version",
            ParseError::InvalidTarget => "invalid request target",
            ParseError::InvalidHeader => "invalid header value",
            ParseError::InvalidContentLength => "invalid Content-Length",
            ParseError::TooLarge => "request too large",
            ParseError::Incomplete => "incomplete request",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ParseError {}

/// Where the parser is within the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RequestLine,
    Headers,
    Body,
}

#[derive(Debug)]
pub struct RequestParser {
    phase: Phase,
    request: Option<Request>,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            phase: Phase::RequestLine,
            request: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = Phase::RequestLine;
        self.request = None;
    }

    /// Consumes as much of `buf` as possible.
    ///
    /// Returns `Ok(Some(request))` once a full request (including its body)
    /// has been buffered, `Ok(None)` if more bytes are needed.
    pub fn advance(&mut self, buf: &mut ReadBuffer) -> Result<Option<Request>, ParseError> {
        loop {
            if self.phase == Phase::Body {
                let len = self.request.as_ref().map_or(0, |r| r.content_length);
                if len > buf.room_after_scan() {
                    return Err(ParseError::TooLarge);
                }
                return match buf.take_body(len) {
                    Some(_) => Ok(self.finish()),
                    None => Ok(None),
                };
            }

            let range = match buf.scan_line() {
                Line::Complete(range) => range,
                Line::Incomplete if buf.is_full() => return Err(ParseError::TooLarge),
                Line::Incomplete => return Ok(None),
                Line::Malformed => return Err(ParseError::MalformedLine),
            };
            let line = buf.bytes(range);

            match self.phase {
                Phase::RequestLine => {
                    self.request = Some(parse_request_line(line)?);
                    self.phase = Phase::Headers;
                }
                Phase::Headers => {
                    let Some(request) = self.request.as_mut() else {
                        return Err(ParseError::InvalidRequestLine);
                    };
                    if line.is_empty() {
                        if request.content_length > 0 {
                            self.phase = Phase::Body;
                            continue;
                        }
                        return Ok(self.finish());
                    }
                    parse_header_line(line, request)?;
                }
                Phase::Body => continue,
            }
        }
    }

    fn finish(&mut self) -> Option<Request> {
        self.phase = Phase::RequestLine;
        self.request.take()
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a complete request held in `buf`.
///
/// Returns the request and the number of bytes it occupied (head plus body).
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let mut read = ReadBuffer::with_capacity(READ_BUF_SIZE);
    read.extend_from_slice(buf);
    let mut parser = RequestParser::new();
    match parser.advance(&mut read)? {
        Some(request) => Ok((request, read.cursor().scan())),
        None => Err(ParseError::Incomplete),
    }
}

/// Splits `METHOD TARGET VERSION`.
pub fn parse_request_line(line: &[u8]) -> Result<Request, ParseError> {
    let text = std::str::from_utf8(line).map_err(|_| ParseError::InvalidRequestLine)?;
    let mut parts = text.split([' ', '\t']).filter(|p| !p.is_empty());

    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidRequestLine);
    };

    match Method::parse(method) {
        Some(Method::GET) => {}
        _ => return Err(ParseError::UnsupportedMethod),
    }
    if !version.eq_ignore_ascii_case("HTTP/1.1") {
        return Err(ParseError::UnsupportedVersion);
    }

    let path = normalize_target(target)?;
    Ok(Request::new(Method::GET, path, version.to_string()))
}

/// Reduces a request target to a clean path.
///
/// `http://host/a/../b?q` becomes `/b`. Dot segments are resolved, query and
/// fragment dropped, percent-escapes decoded.
pub fn normalize_target(target: &str) -> Result<String, ParseError> {
    let origin = match target.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("http://") => {
            let rest = &target[7..];
            let slash = rest.find('/').ok_or(ParseError::InvalidTarget)?;
            &rest[slash..]
        }
        _ => target,
    };
    if !origin.starts_with('/') {
        return Err(ParseError::InvalidTarget);
    }

    // A leading `//` would make the first segment an authority.
    let origin = format!("/{}", origin.trim_start_matches('/'));
    let base = Url::parse("http://localhost/").map_err(|_| ParseError::InvalidTarget)?;
    let url = base.join(&origin).map_err(|_| ParseError::InvalidTarget)?;
    let path = urlencoding::decode(url.path()).map_err(|_| ParseError::InvalidTarget)?;
    if path.contains('\0') {
        return Err(ParseError::InvalidTarget);
    }
    Ok(path.into_owned())
}

/// Applies one header line to `request`. Headers other than `Connection`,
/// `Content-Length` and `Host` are ignored.
pub fn parse_header_line(line: &[u8], request: &mut Request) -> Result<(), ParseError> {
    let Some(colon) = line.iter().position(|&b| b == b':') else {
        tracing::trace!(header = %String::from_utf8_lossy(line), "ignoring header without a colon");
        return Ok(());
    };
    let name = &line[..colon];
    let raw_value = &line[colon + 1..];

    let value = || {
        std::str::from_utf8(raw_value)
            .map(|v| v.trim_matches([' ', '\t']))
            .map_err(|_| ParseError::InvalidHeader)
    };

    if name.eq_ignore_ascii_case(b"Connection") {
        if value()?.eq_ignore_ascii_case("keep-alive") {
            request.keep_alive = true;
        }
    } else if name.eq_ignore_ascii_case(b"Content-Length") {
        request.content_length = value()?
            .parse()
            .map_err(|_| ParseError::InvalidContentLength)?;
    } else if name.eq_ignore_ascii_case(b"Host") {
        request.host = Some(value()?.to_string());
    } else {
        tracing::trace!(header = %String::from_utf8_lossy(name), "ignoring header");
    }
    Ok(())
}
