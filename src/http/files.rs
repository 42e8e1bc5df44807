//! Document root resolution and read-only file mapping.

use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use memmap2::Mmap;

use crate::http::mime;
use crate::http::response::StatusCode;

/// Permission bit for "readable by others".
const WORLD_READABLE: u32 = 0o004;

/// A file that passed every check and is ready to be sent.
#[derive(Debug)]
pub struct StaticFile {
    pub path: PathBuf,
    pub content_type: &'static str,
    /// `None` for zero-length files, which are never mapped.
    pub map: Option<Mmap>,
}

impl StaticFile {
    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves request paths against a document root.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins a request path onto the root. Returns `None` if the path tries
    /// to climb out of the root.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let mut full = self.root.clone();
        for component in Path::new(request_path).components() {
            match component {
                Component::Normal(part) => full.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => return None,
            }
        }
        Some(full)
    }

    /// Stats and maps the file behind `request_path`.
    ///
    /// Missing file → 404. Directory or not world-readable → 403.
    /// Open or map failure → 500.
    pub fn open(&self, request_path: &str) -> Result<StaticFile, StatusCode> {
        let path = self.resolve(request_path).ok_or(StatusCode::Forbidden)?;

        let meta = std::fs::metadata(&path).map_err(|_| StatusCode::NotFound)?;
        if meta.is_dir() || meta.permissions().mode() & WORLD_READABLE == 0 {
            return Err(StatusCode::Forbidden);
        }

        let content_type = mime::content_type(&path);
        if meta.len() == 0 {
            return Ok(StaticFile {
                path,
                content_type,
                map: None,
            });
        }

        let file = File::open(&path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to open file");
            StatusCode::InternalServerError
        })?;
        // SAFETY: read-only private mapping. Truncating the file underneath it
        // while the response is in flight can still fault.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to map file");
            StatusCode::InternalServerError
        })?;

        Ok(StaticFile {
            path,
            content_type,
            map: Some(map),
        })
    }
}
