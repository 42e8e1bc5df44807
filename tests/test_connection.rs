use std::fs;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sentinel_httpd::http::buffer::READ_BUF_SIZE;
use sentinel_httpd::http::connection::{ConnState, Connection};
use sentinel_httpd::http::files::StaticFiles;
use sentinel_httpd::http::response::{EMPTY_PAGE, StatusCode};
use sentinel_httpd::server::listener::{self, BUSY_MESSAGE};
use sentinel_httpd::server::session::{Readiness, Session, Step};
use sentinel_httpd::server::threaded;
use tempfile::TempDir;

const INDEX: &str = "<h1>Hello</h1>";

fn doc_root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), INDEX).unwrap();
    fs::write(dir.path().join("empty.txt"), b"").unwrap();
    fs::write(dir.path().join("one.txt"), b"x").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    dir
}

fn start_server(root: &TempDir, max_connections: usize) -> SocketAddr {
    let listener = listener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let files = Arc::new(StaticFiles::new(root.path()));
    thread::spawn(move || {
        threaded::run::<Connection>(listener, files, 2, 64, max_connections).unwrap();
    });
    addr
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

struct Reply {
    status: u16,
    head: String,
    body: Vec<u8>,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Reads exactly one response, leaving the socket positioned after it.
fn read_reply(stream: &mut TcpStream) -> Reply {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    while !raw.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).unwrap();
        assert_ne!(n, 0, "connection closed inside the head");
        raw.push(byte[0]);
    }
    let head = String::from_utf8(raw).unwrap();
    let status = head.split(' ').nth(1).unwrap().parse().unwrap();

    let mut reply = Reply {
        status,
        head,
        body: Vec::new(),
    };
    let len: usize = reply.header("Content-Length").unwrap().parse().unwrap();
    reply.body = vec![0u8; len];
    stream.read_exact(&mut reply.body).unwrap();
    reply
}

fn get(addr: SocketAddr, request: &str) -> Reply {
    let mut stream = connect(addr);
    stream.write_all(request.as_bytes()).unwrap();
    read_reply(&mut stream)
}

fn assert_closed(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test]
fn test_serves_existing_file() {
    let root = doc_root();
    let addr = start_server(&root, 1024);

    let reply = get(addr, "GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");

    assert_eq!(reply.status, 200);
    assert_eq!(reply.header("Content-Length"), Some("14"));
    assert_eq!(reply.header("Content-Type"), Some("text/html"));
    assert_eq!(reply.header("Connection"), Some("close"));
    assert_eq!(reply.body, INDEX.as_bytes());
}

#[test]
fn test_missing_file_is_404() {
    let root = doc_root();
    let addr = start_server(&root, 1024);

    let mut stream = connect(addr);
    stream
        .write_all(b"GET /nope.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let reply = read_reply(&mut stream);

    assert_eq!(reply.status, 404);
    assert_eq!(reply.body, StatusCode::NotFound.canned_body().as_bytes());
    assert_eq!(reply.header("Connection"), Some("close"));
    assert_closed(&mut stream);
}

#[test]
fn test_directory_is_403() {
    let root = doc_root();
    let addr = start_server(&root, 1024);

    let reply = get(addr, "GET /sub HTTP/1.1\r\n\r\n");
    assert_eq!(reply.status, 403);
}

#[test]
fn test_file_not_world_readable_is_403() {
    let root = doc_root();
    let secret = root.path().join("secret.txt");
    fs::write(&secret, b"hidden").unwrap();
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o600)).unwrap();
    let addr = start_server(&root, 1024);

    let reply = get(addr, "GET /secret.txt HTTP/1.1\r\n\r\n");
    assert_eq!(reply.status, 403);
    assert_eq!(reply.body, StatusCode::Forbidden.canned_body().as_bytes());
}

#[test]
fn test_post_is_400_and_closes() {
    let root = doc_root();
    let addr = start_server(&root, 1024);

    let mut stream = connect(addr);
    stream
        .write_all(b"POST /index.html HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
        .unwrap();
    let reply = read_reply(&mut stream);

    assert_eq!(reply.status, 400);
    assert_closed(&mut stream);
}

#[test]
fn test_malformed_request_gets_the_same_answer_every_time() {
    let root = doc_root();
    let addr = start_server(&root, 1024);

    let mut answers = Vec::new();
    for _ in 0..2 {
        let mut stream = connect(addr);
        stream.write_all(b"GET / HTTP/1.1\nHost: x\r\n\r\n").unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).unwrap();
        answers.push(raw);
    }

    assert!(answers[0].starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
    assert_eq!(answers[0], answers[1]);
}

#[test]
fn test_keep_alive_serves_several_requests() {
    let root = doc_root();
    let addr = start_server(&root, 1024);

    let mut stream = connect(addr);
    for _ in 0..3 {
        stream
            .write_all(b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
            .unwrap();
        let reply = read_reply(&mut stream);
        assert_eq!(reply.status, 200);
        assert_eq!(reply.header("Connection"), Some("keep-alive"));
        assert_eq!(reply.body, INDEX.as_bytes());
    }

    stream.write_all(b"GET /one.txt HTTP/1.1\r\n\r\n").unwrap();
    let last = read_reply(&mut stream);
    assert_eq!(last.header("Connection"), Some("close"));
    assert_closed(&mut stream);
}

#[test]
fn test_pipelined_requests_are_answered_in_order() {
    let root = doc_root();
    let addr = start_server(&root, 1024);

    let mut stream = connect(addr);
    stream
        .write_all(
            b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n\
              GET /one.txt HTTP/1.1\r\n\r\n",
        )
        .unwrap();

    let first = read_reply(&mut stream);
    let second = read_reply(&mut stream);
    assert_eq!(first.body, INDEX.as_bytes());
    assert_eq!(second.body, b"x");
    assert_closed(&mut stream);
}

#[test]
fn test_file_sizes() {
    let root = doc_root();
    let large: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
    fs::write(root.path().join("large.bin"), &large).unwrap();
    let addr = start_server(&root, 1024);

    let empty = get(addr, "GET /empty.txt HTTP/1.1\r\n\r\n");
    assert_eq!(empty.status, 200);
    assert_eq!(empty.header("Content-Type"), Some("text/html"));
    assert_eq!(empty.body, EMPTY_PAGE.as_bytes());

    let one = get(addr, "GET /one.txt HTTP/1.1\r\n\r\n");
    assert_eq!(one.header("Content-Type"), Some("text/plain"));
    assert_eq!(one.body, b"x");

    let big = get(addr, "GET /large.bin HTTP/1.1\r\n\r\n");
    assert_eq!(big.status, 200);
    assert_eq!(big.body.len(), large.len());
    assert!(big.body == large);
}

#[test]
fn test_oversized_head_is_400() {
    let root = doc_root();
    let addr = start_server(&root, 1024);

    let mut request = b"GET / HTTP/1.1\r\nX-Padding: ".to_vec();
    request.resize(READ_BUF_SIZE, b'a');

    let mut stream = connect(addr);
    stream.write_all(&request).unwrap();
    let reply = read_reply(&mut stream);
    assert_eq!(reply.status, 400);
}

#[test]
fn test_half_closed_client_is_still_served() {
    let root = doc_root();
    let addr = start_server(&root, 1024);

    let mut stream = connect(addr);
    stream.write_all(b"GET /one.txt HTTP/1.1\r\n\r\n").unwrap();
    stream.shutdown(Shutdown::Write).unwrap();

    let reply = read_reply(&mut stream);
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, b"x");
}

#[test]
fn test_connection_limit_rejects_with_busy_notice() {
    let root = doc_root();
    let addr = start_server(&root, 1);

    let _held = connect(addr);
    thread::sleep(Duration::from_millis(100));

    let mut second = connect(addr);
    let mut raw = Vec::new();
    second.read_to_end(&mut raw).unwrap();
    assert_eq!(raw, BUSY_MESSAGE);
}

/// Drives a `Connection` directly over a loopback pair.
fn direct_pair(root: &TempDir) -> (TcpStream, Connection) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = connect(listener.local_addr().unwrap());
    let (server, peer) = listener.accept().unwrap();
    let files = Arc::new(StaticFiles::new(root.path()));
    (client, Connection::open(server, peer, files).unwrap())
}

fn step_until_not_read(conn: &mut Connection) -> Step {
    for _ in 0..100 {
        match conn.on_ready(Readiness::Readable) {
            Step::Read => thread::sleep(Duration::from_millis(10)),
            step => return step,
        }
    }
    panic!("request never completed");
}

#[test]
fn test_connection_states_across_keep_alive() {
    let root = doc_root();
    let (mut client, mut conn) = direct_pair(&root);
    assert_eq!(conn.state(), ConnState::ReadingRequestLine);

    client
        .write_all(b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    assert_eq!(step_until_not_read(&mut conn), Step::Write);
    assert_eq!(conn.state(), ConnState::Responding);
    assert_eq!(conn.request().map(|r| r.path.as_str()), Some("/index.html"));

    assert_eq!(conn.on_ready(Readiness::Writable), Step::Read);
    assert_eq!(conn.state(), ConnState::ReadingRequestLine);
    assert!(conn.request().is_none());
    assert_eq!(read_reply(&mut client).body, INDEX.as_bytes());

    client.write_all(b"GET /one.txt HTTP/1.1\r\n").unwrap();
    assert_eq!(step_until_not_read_or_headers(&mut conn), ConnState::ReadingHeaders);

    client.shutdown(Shutdown::Write).unwrap();
    assert_eq!(step_until_not_read(&mut conn), Step::Close);
    assert!(conn.close().is_some());
    assert_eq!(conn.state(), ConnState::Closed);
    assert!(conn.close().is_none());
}

fn step_until_not_read_or_headers(conn: &mut Connection) -> ConnState {
    for _ in 0..100 {
        assert_eq!(conn.on_ready(Readiness::Readable), Step::Read);
        if conn.state() == ConnState::ReadingHeaders {
            return ConnState::ReadingHeaders;
        }
        thread::sleep(Duration::from_millis(10));
    }
    conn.state()
}

/// Answers one read with `done` after sleeping, tying up a pool thread.
struct Slow {
    stream: Option<TcpStream>,
    fd: RawFd,
    peer: SocketAddr,
    delay: Arc<Duration>,
}

impl Session for Slow {
    type Context = Duration;

    fn open(stream: TcpStream, peer: SocketAddr, delay: Arc<Duration>) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let fd = stream.as_raw_fd();
        Ok(Self {
            stream: Some(stream),
            fd,
            peer,
            delay,
        })
    }

    fn fd(&self) -> RawFd {
        self.fd
    }

    fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn on_ready(&mut self, _ready: Readiness) -> Step {
        let Some(stream) = self.stream.as_mut() else {
            return Step::Close;
        };
        let mut buf = [0u8; 64];
        match stream.read(&mut buf) {
            Ok(0) => return Step::Close,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Step::Read,
            Err(_) => return Step::Close,
        }
        thread::sleep(*self.delay);
        let _ = stream.write_all(b"done");
        Step::Close
    }

    fn close(&mut self) -> Option<TcpStream> {
        self.stream.take()
    }
}

#[test]
fn test_full_job_queue_defers_instead_of_dropping() {
    let listener = listener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        // One thread, room for one queued job: the rest must wait their turn.
        threaded::run::<Slow>(listener, Arc::new(Duration::from_millis(100)), 1, 1, 1024)
            .unwrap();
    });

    let mut clients: Vec<TcpStream> = (0..5).map(|_| connect(addr)).collect();
    for client in &mut clients {
        client.write_all(b"go").unwrap();
    }

    for client in &mut clients {
        let mut raw = Vec::new();
        client.read_to_end(&mut raw).unwrap();
        assert_eq!(raw, b"done");
    }
}
