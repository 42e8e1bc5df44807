//! HTTP protocol implementation.
//!
//! This module implements the HTTP/1.1 subset a static file server needs,
//! on top of non-blocking sockets.
//!
//! # Architecture
//!
//! - **`buffer`**: Fixed-capacity read buffer with explicit parse cursors
//! - **`parser`**: Incremental, chunk-insensitive request parser
//! - **`request`**: Parsed request head
//! - **`response`**: Status codes, canned bodies and the response value
//! - **`writer`**: Serializes a response into header + mapped-file segments
//!   and flushes them with vectored writes
//! - **`files`**: Document root resolution and file mapping
//! - **`mime`**: MIME type detection based on file extensions
//! - **`connection`**: The per-socket state machine tying it all together
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌────────────────────┐
//!        │ ReadingRequestLine │ ← Wait for `GET /path HTTP/1.1`
//!        └─────────┬──────────┘
//!                  ▼
//!        ┌────────────────────┐
//!        │   ReadingHeaders   │ ← Until the blank line
//!        └─────────┬──────────┘
//!                  │ Content-Length > 0
//!                  ▼
//!        ┌────────────────────┐
//!        │    ReadingBody     │ ← Until the body is buffered
//!        └─────────┬──────────┘
//!                  ▼
//!        ┌────────────────────┐
//!        │     Responding     │ ← Flush headers + mapped file
//!        └─────────┬──────────┘
//!                  ├─ Keep-Alive → ReadingRequestLine (same connection)
//!                  └─ Close → Closed
//! ```
//!
//! Any protocol error jumps straight to `Responding` with a 400 and closes
//! once it has been sent.

pub mod buffer;
pub mod connection;
pub mod files;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
