use std::io::Write;

use bytes::BytesMut;
use memmap2::Mmap;
use sentinel_httpd::http::response::{Body, EMPTY_PAGE, Response, StatusCode};
use sentinel_httpd::http::writer::{Flush, ResponseWriter, WRITE_BUF_SIZE, serialize_head};

fn head_of(resp: &Response) -> String {
    let mut buf = BytesMut::new();
    serialize_head(resp, &mut buf);
    String::from_utf8(buf.to_vec()).unwrap()
}

fn map_bytes(data: &[u8]) -> (tempfile::NamedTempFile, Mmap) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    let map = unsafe { Mmap::map(file.as_file()).unwrap() };
    (file, map)
}

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::BadRequest.reason_phrase(), "Bad Request");
    assert_eq!(StatusCode::Forbidden.reason_phrase(), "Forbidden");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    assert_eq!(StatusCode::InternalServerError.reason_phrase(), "Internal Error");
}

#[test]
fn test_status_code_is_success() {
    assert!(StatusCode::Ok.is_success());
    assert!(!StatusCode::NotFound.is_success());
}

#[test]
fn test_error_response_closes_and_carries_canned_body() {
    let resp = Response::error(StatusCode::NotFound);

    assert!(!resp.keep_alive);
    assert_eq!(resp.content_type, None);
    assert_eq!(
        resp.body.as_bytes(),
        b"The requested file was not found on this server.\n"
    );
    assert_eq!(resp.content_length(), resp.body.len());
}

#[test]
fn test_error_head_format() {
    let resp = Response::error(StatusCode::BadRequest);
    let head = head_of(&resp);

    assert_eq!(
        head,
        format!(
            "HTTP/1.1 400 Bad Request\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            StatusCode::BadRequest.canned_body().len()
        )
    );
}

#[test]
fn test_head_is_appended_to_the_write_buffer() {
    let mut buf = BytesMut::with_capacity(WRITE_BUF_SIZE);
    buf.extend_from_slice(b"prefix|");
    let start = buf.as_ptr();

    serialize_head(&Response::error(StatusCode::NotFound), &mut buf);

    assert_eq!(buf.as_ptr(), start);
    assert!(buf.starts_with(b"prefix|HTTP/1.1 404 Not Found\r\n"));
    assert!(buf.ends_with(b"Connection: close\r\n\r\n"));
}

#[test]
fn test_empty_page_head_keeps_alive() {
    let resp = Response::empty_page(true);
    let head = head_of(&resp);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains(&format!("Content-Length: {}\r\n", EMPTY_PAGE.len())));
    assert!(head.contains("Content-Type: text/html\r\n"));
    assert!(head.contains("Connection: keep-alive\r\n"));
    assert!(head.ends_with("\r\n\r\n"));
}

#[test]
fn test_canned_body_travels_in_one_segment() {
    let mut writer = ResponseWriter::new(Response::error(StatusCode::Forbidden));
    let mut out = Vec::new();

    assert_eq!(writer.segments(), 1);
    assert_eq!(writer.write_to(&mut out).unwrap(), Flush::Done);
    assert!(writer.is_done());

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"));
    assert!(text.ends_with(StatusCode::Forbidden.canned_body()));
}

#[test]
fn test_mapped_file_is_written_after_the_head() {
    let content = b"<h1>hello</h1>";
    let (_file, map) = map_bytes(content);
    let resp = Response::file(map, "text/html", false);
    assert!(matches!(resp.body, Body::Mapped(_)));

    let mut writer = ResponseWriter::new(resp);
    assert_eq!(writer.segments(), 2);

    let mut out = Vec::new();
    assert_eq!(writer.write_to(&mut out).unwrap(), Flush::Done);
    assert_eq!(writer.written(), out.len());

    let text = String::from_utf8(out).unwrap();
    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    assert!(head.contains(&format!("Content-Length: {}", content.len())));
    assert!(head.contains("Content-Type: text/html"));
    assert!(head.contains("Connection: close"));
    assert_eq!(body.as_bytes(), content);
}

#[test]
fn test_write_zero_is_an_error() {
    struct Closed;
    impl Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let mut writer = ResponseWriter::new(Response::error(StatusCode::NotFound));
    let err = writer.write_to(&mut Closed).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::WriteZero);
}
