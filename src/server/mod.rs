//! Accept path and the two serving architectures.

pub mod listener;
pub mod session;
pub mod threaded;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{Config, PoolMode};
use crate::http::connection::Connection;
use crate::http::files::StaticFiles;
use crate::process::ProcessPool;

/// Binds the configured address and serves static files until shutdown.
///
/// In process mode this returns in every forked process once its own loop
/// ends.
pub fn run(cfg: &Config) -> Result<()> {
    let files = Arc::new(StaticFiles::new(cfg.static_files.root.clone()));
    tracing::info!(root = %files.root().display(), mode = ?cfg.pool.mode, "Serving static files");

    // Bound before any fork so every process shares the socket.
    let listener = listener::bind(&cfg.server.listen_addr)?;
    match cfg.pool.mode {
        PoolMode::Threads => threaded::run::<Connection>(
            listener,
            files,
            cfg.pool.workers,
            cfg.pool.max_requests,
            cfg.server.max_connections,
        ),
        PoolMode::Processes => ProcessPool::spawn(cfg.pool.workers)?.run::<Connection>(
            listener,
            files,
            cfg.server.max_connections,
        ),
    }
}
