use memmap2::Mmap;

/// HTTP status codes the server answers with.
///
/// - `Ok` (200): File served
/// - `BadRequest` (400): Malformed or unsupported request
/// - `Forbidden` (403): Directory or non world-readable file
/// - `NotFound` (404): Nothing at that path
/// - `InternalServerError` (500): The file could not be opened or mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use sentinel_httpd::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Error",
        }
    }

    /// The fixed body sent with an error status.
    pub fn canned_body(&self) -> &'static str {
        match self {
            StatusCode::Ok => EMPTY_PAGE,
            StatusCode::BadRequest => {
                "Your request has bad syntax or is inherently impossible to satisfy.\n"
            }
            StatusCode::Forbidden => "You do not have permission to get file from this server.\n",
            StatusCode::NotFound => "The requested file was not found on this server.\n",
            StatusCode::InternalServerError => {
                "There was an unusual problem serving the requested file.\n"
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

/// Body served for a zero-length file.
pub const EMPTY_PAGE: &str = "<html><body></body></html>";

/// Where the response body comes from.
#[derive(Debug)]
pub enum Body {
    /// A static string written right after the headers.
    Canned(&'static str),
    /// A memory-mapped file, written straight from the mapping. Dropping the
    /// body unmaps the file.
    Mapped(Mmap),
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Body::Canned(s) => s.len(),
            Body::Mapped(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Canned(s) => s.as_bytes(),
            Body::Mapped(map) => &map[..],
        }
    }
}

/// A response ready to be serialized.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub keep_alive: bool,
    pub body: Body,
}

impl Response {
    /// 200 with a mapped file.
    pub fn file(map: Mmap, content_type: &'static str, keep_alive: bool) -> Self {
        Self {
            status: StatusCode::Ok,
            content_type: Some(content_type),
            keep_alive,
            body: Body::Mapped(map),
        }
    }

    /// 200 for a zero-length file: nothing to map, so a fixed empty page.
    pub fn empty_page(keep_alive: bool) -> Self {
        Self {
            status: StatusCode::Ok,
            content_type: Some("text/html"),
            keep_alive,
            body: Body::Canned(EMPTY_PAGE),
        }
    }

    /// An error status with its canned body. Error responses always close
    /// the connection.
    pub fn error(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            keep_alive: false,
            body: Body::Canned(status.canned_body()),
        }
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }
}
