/// HTTP request methods.
///
/// All of these are recognized on the request line, but the static file core
/// only serves `GET`; anything else is answered with 400 Bad Request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method, ignoring ASCII case.
    ///
    /// # Example
    ///
    /// ```
    /// # use sentinel_httpd::http::request::Method;
    /// assert_eq!(Method::parse("GET"), Some(Method::GET));
    /// assert_eq!(Method::parse("get"), Some(Method::GET));
    /// assert_eq!(Method::parse("BREW"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        const METHODS: [(&str, Method); 7] = [
            ("GET", Method::GET),
            ("POST", Method::POST),
            ("PUT", Method::PUT),
            ("DELETE", Method::DELETE),
            ("HEAD", Method::HEAD),
            ("OPTIONS", Method::OPTIONS),
            ("PATCH", Method::PATCH),
        ];
        METHODS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, m)| *m)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

/// A parsed request head.
///
/// Only the headers the server acts on are kept: `Host` for logging,
/// `Content-Length` to know where the request ends, and `Connection` to
/// decide whether the socket is reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Always `GET` once parsing succeeded.
    pub method: Method,
    /// Normalized, percent-decoded path beginning with `/`.
    pub path: String,
    /// Protocol version as sent (`HTTP/1.1`).
    pub version: String,
    /// Value of the `Host` header, if any.
    pub host: Option<String>,
    /// Declared body length; 0 when absent.
    pub content_length: usize,
    /// True only for an explicit `Connection: keep-alive`.
    pub keep_alive: bool,
}

impl Request {
    pub(crate) fn new(method: Method, path: String, version: String) -> Self {
        Self {
            method,
            path,
            version,
            host: None,
            content_length: 0,
            keep_alive: false,
        }
    }
}
