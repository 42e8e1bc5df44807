use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

use crate::http::buffer::{Fill, ReadBuffer};
use crate::http::files::StaticFiles;
use crate::http::parser::{Phase, RequestParser};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{Flush, ResponseWriter};
use crate::server::session::{Readiness, Session, Step};

/// Where a connection is in its request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    ReadingRequestLine,
    ReadingHeaders,
    ReadingBody,
    Responding,
    Closed,
}

/// One accepted client socket and everything needed to serve it.
///
/// The connection never blocks: it is driven by readiness events through
/// [`Session::on_ready`] and tells the caller what to wait for next.
pub struct Connection {
    stream: Option<TcpStream>,
    fd: RawFd,
    peer: SocketAddr,
    files: Arc<StaticFiles>,
    read: ReadBuffer,
    parser: RequestParser,
    request: Option<Request>,
    writer: Option<ResponseWriter>,
    peer_closed: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, files: Arc<StaticFiles>) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let fd = stream.as_raw_fd();
        Ok(Self {
            stream: Some(stream),
            fd,
            peer,
            files,
            read: ReadBuffer::new(),
            parser: RequestParser::new(),
            request: None,
            writer: None,
            peer_closed: false,
        })
    }

    pub fn state(&self) -> ConnState {
        if self.stream.is_none() {
            return ConnState::Closed;
        }
        if self.writer.is_some() {
            return ConnState::Responding;
        }
        match self.parser.phase() {
            Phase::RequestLine => ConnState::ReadingRequestLine,
            Phase::Headers => ConnState::ReadingHeaders,
            Phase::Body => ConnState::ReadingBody,
        }
    }

    /// The last request parsed on this connection, while its response is
    /// in flight.
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Drains the socket into the read buffer.
    pub fn fill(&mut self) -> io::Result<Fill> {
        match self.stream.as_mut() {
            Some(stream) => self.read.fill_from(stream),
            None => Ok(Fill::PeerClosed),
        }
    }

    /// Parses what has been buffered and, once a request is complete,
    /// prepares its response.
    fn process(&mut self) -> Step {
        match self.parser.advance(&mut self.read) {
            Ok(Some(request)) => {
                let mut response = self.build_response(&request);
                if self.peer_closed {
                    response.keep_alive = false;
                }
                tracing::info!(
                    peer = %self.peer,
                    method = request.method.as_str(),
                    path = %request.path,
                    host = request.host.as_deref().unwrap_or("-"),
                    status = response.status.as_u16(),
                    "Request"
                );
                self.request = Some(request);
                self.respond(response)
            }
            Ok(None) if self.peer_closed => {
                tracing::debug!(peer = %self.peer, "Peer closed before a full request");
                Step::Close
            }
            Ok(None) => Step::Read,
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = %e, "Bad request");
                self.respond(Response::error(StatusCode::BadRequest))
            }
        }
    }

    fn build_response(&self, request: &Request) -> Response {
        match self.files.open(&request.path) {
            Ok(file) => match file.map {
                Some(map) => Response::file(map, file.content_type, request.keep_alive),
                None => Response::empty_page(request.keep_alive),
            },
            Err(status) => Response::error(status),
        }
    }

    /// Formats the response; the caller arms the socket for writing.
    fn respond(&mut self, response: Response) -> Step {
        self.writer = Some(ResponseWriter::new(response));
        Step::Write
    }

    /// Writes the pending response. Dropping the writer releases the mapped
    /// file, which happens on every path out of here except `WouldBlock`.
    pub fn flush(&mut self) -> Step {
        let (Some(writer), Some(stream)) = (self.writer.as_mut(), self.stream.as_mut()) else {
            return Step::Close;
        };
        match writer.write_to(stream) {
            Ok(Flush::WouldBlock) => Step::Write,
            Ok(Flush::Done) => {
                let keep_alive = writer.keep_alive();
                self.writer = None;
                if !keep_alive {
                    return Step::Close;
                }
                self.reset();
                if self.read.unscanned() > 0 {
                    // The next request arrived together with this one.
                    return self.process();
                }
                Step::Read
            }
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = %e, "Write failed");
                self.writer = None;
                Step::Close
            }
        }
    }

    /// Prepares for the next request on a kept-alive connection.
    fn reset(&mut self) {
        self.parser.reset();
        self.read.compact();
        self.request = None;
        self.writer = None;
    }
}

impl Session for Connection {
    type Context = StaticFiles;

    fn open(stream: TcpStream, peer: SocketAddr, ctx: Arc<StaticFiles>) -> io::Result<Self> {
        Connection::new(stream, peer, ctx)
    }

    fn fd(&self) -> RawFd {
        self.fd
    }

    fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn on_ready(&mut self, ready: Readiness) -> Step {
        if self.stream.is_none() {
            return Step::Close;
        }
        if ready == Readiness::Writable || self.writer.is_some() {
            return self.flush();
        }

        match self.fill() {
            Ok(Fill::PeerClosed) => self.peer_closed = true,
            Ok(Fill::Drained | Fill::Full) => {}
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = %e, "Read failed");
                return Step::Close;
            }
        }
        self.process()
    }

    fn close(&mut self) -> Option<TcpStream> {
        self.writer = None;
        self.request = None;
        self.read.clear();
        self.stream.take()
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}
