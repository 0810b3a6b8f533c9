//! Layout of the local metadata cache.
//!
//! The unpacked feed holds one directory per identifier, each containing a
//! single record: `<dir>/<gid>/pg<gid>.rdf`.

use std::path::{Path, PathBuf};

use crate::error::{ExtractError, ExtractResult};
use crate::model::Gid;

/// Read-only view of the unpacked metadata cache.
#[derive(Debug, Clone)]
pub struct EpubCache {
    dir: PathBuf,
}

impl EpubCache {
    /// A cache rooted at the per-identifier directory listing.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache inside an unpacked feed archive (`<root>/cache/epub`).
    pub fn in_archive_root(root: &Path) -> Self {
        Self::new(root.join("cache").join("epub"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `gid`.
    pub fn document_path(&self, gid: Gid) -> PathBuf {
        self.dir.join(gid.to_string()).join(format!("pg{gid}.rdf"))
    }

    /// Read the record for `gid`.
    pub fn read_document(&self, gid: Gid) -> ExtractResult<String> {
        let path = self.document_path(gid);
        match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8(bytes).map_err(|e| ExtractError::Parse {
                gid,
                message: format!("{} is not UTF-8: {e}", path.display()),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ExtractError::NotFound {
                gid,
                path: path.display().to_string(),
            }),
            Err(e) => Err(ExtractError::Io { gid, source: e }),
        }
    }

    /// All identifiers present in the cache, ascending.
    ///
    /// Entries whose name mentions `delete` are withdrawn records and are
    /// skipped, as is anything that is not a positive integer.
    pub fn gids(&self) -> std::io::Result<Vec<Gid>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut gids = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.to_ascii_lowercase().contains("delete") {
                tracing::debug!(entry = %name, "skipping withdrawn cache entry");
                continue;
            }
            match name.parse::<Gid>() {
                Ok(gid) => gids.push(gid),
                Err(_) => tracing::warn!(entry = %name, "ignoring non-identifier cache entry"),
            }
        }
        gids.sort();
        Ok(gids)
    }

    /// Whether the cache holds at least one record directory.
    pub fn is_populated(&self) -> bool {
        std::fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Remove every cached record.
    pub fn delete(&self) -> std::io::Result<bool> {
        delete_tree(&self.dir)
    }
}

/// Remove an unpacked cache tree. Returns whether anything was removed.
pub fn delete_tree(root: &Path) -> std::io::Result<bool> {
    match std::fs::remove_dir_all(root) {
        Ok(()) => {
            tracing::info!(path = %root.display(), "deleted cache");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
