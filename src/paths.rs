//! XDG-compliant path resolution for gutcat.
//!
//! The unpacked feed lives under the cache directory (it can always be
//! fetched again); the catalog database and downloaded texts live under the
//! data directory.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::cache::EpubCache;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(gutcat::paths::no_home),
        help("Set the HOME environment variable or pass --cache-dir and --database explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(gutcat::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global XDG-compliant directories.
#[derive(Debug, Clone)]
pub struct CatalogPaths {
    /// `$XDG_CONFIG_HOME/gutenberg-catalog/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/gutenberg-catalog/`
    pub data_dir: PathBuf,
    /// `$XDG_CACHE_HOME/gutenberg-catalog/`
    pub cache_dir: PathBuf,
}

impl CatalogPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("gutenberg-catalog");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("gutenberg-catalog");

        let cache_dir = std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".cache"))
            .join("gutenberg-catalog");

        Ok(Self {
            config_dir,
            data_dir,
            cache_dir,
        })
    }

    /// Create all base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.cache_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Path to the catalog database.
    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join("catalog.redb")
    }

    /// Where downloaded plain texts go by default.
    pub fn texts_dir(&self) -> PathBuf {
        self.data_dir.join("texts")
    }

    /// Root the feed archive is unpacked into.
    pub fn archive_root(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Per-identifier record directory inside the unpacked archive.
    pub fn epub_cache(&self) -> EpubCache {
        EpubCache::in_archive_root(&self.cache_dir)
    }
}
