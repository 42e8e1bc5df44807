//! MIME type detection based on file extensions.

use std::path::Path;

/// Content type for `path`, judged by its extension (case-insensitive).
/// Unknown extensions are served as `text/plain`.
///
/// ```
/// # use sentinel_httpd::http::mime::content_type;
/// assert_eq!(content_type("/index.HTML"), "text/html");
/// assert_eq!(content_type("/notes"), "text/plain");
/// ```
pub fn content_type(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("gif") => "image/gif",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "text/plain",
    }
}
