//! Rich diagnostic error types for the catalog pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::model::Gid;
use crate::paths::PathError;

/// Top-level error type for the catalog pipeline.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error("failed to list cached records in {path}: {source}")]
    #[diagnostic(
        code(gutcat::cache::scan),
        help("Run `gutcat fetch` to populate the cache, or pass --cache-dir.")
    )]
    CacheScan {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Extraction errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    #[error("no cached metadata for {gid}: {path}")]
    #[diagnostic(
        code(gutcat::extract::not_found),
        help(
            "The cache has no document for this identifier. \
             Run `gutcat fetch --force` to refresh the cache, or rebuild \
             with `--skip-failures` to leave the identifier out."
        )
    )]
    NotFound { gid: Gid, path: String },

    #[error("malformed metadata for {gid}: {message}")]
    #[diagnostic(
        code(gutcat::extract::parse),
        help(
            "The cached document is not well-formed XML. \
             The archive may have been truncated while unpacking; \
             re-fetch it with `gutcat fetch --force`."
        )
    )]
    Parse { gid: Gid, message: String },

    #[error("failed to read metadata for {gid}: {source}")]
    #[diagnostic(
        code(gutcat::extract::io),
        help("A filesystem operation failed. Check cache directory permissions.")
    )]
    Io {
        gid: Gid,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    /// Identifier the failure belongs to.
    pub fn gid(&self) -> Gid {
        match self {
            Self::NotFound { gid, .. } | Self::Parse { gid, .. } | Self::Io { gid, .. } => *gid,
        }
    }
}

/// Convenience alias for extraction results.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(gutcat::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(gutcat::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             Delete the database file and rebuild with `gutcat build`."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(gutcat::store::serde),
        help(
            "Failed to encode or decode a stored row. \
             The database was probably written by another version; rebuild it."
        )
    )]
    Serialization { message: String },

    #[error("relation not found: \"{name}\"")]
    #[diagnostic(
        code(gutcat::store::relation_not_found),
        help("The relation has not been written yet. Run `gutcat build` first.")
    )]
    RelationNotFound { name: String },

    #[error("relation \"{relation}\" has no column \"{column}\"")]
    #[diagnostic(
        code(gutcat::store::unknown_column),
        help(
            "The persisted relation was built with a different projection. \
             Rebuild with `--columns` including this column, or query another field."
        )
    )]
    UnknownColumn { relation: String, column: String },

    #[error("invalid lookup pattern \"{pattern}\": {message}")]
    #[diagnostic(
        code(gutcat::store::invalid_pattern),
        help("Use `%` for any run of characters and `_` for exactly one.")
    )]
    InvalidPattern { pattern: String, message: String },

    #[error("row for {gid} has {actual} values but relation \"{relation}\" has {expected} columns")]
    #[diagnostic(
        code(gutcat::store::schema_mismatch),
        help("Every row must carry exactly one value per column.")
    )]
    SchemaMismatch {
        relation: String,
        gid: Gid,
        expected: usize,
        actual: usize,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Fetch errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("HTTP {status} fetching \"{url}\"")]
    #[diagnostic(
        code(gutcat::fetch::status),
        help("The server refused the request. Check the configured URL.")
    )]
    Status { url: String, status: u16 },

    #[error("transport error fetching \"{url}\": {message}")]
    #[diagnostic(
        code(gutcat::fetch::transport),
        help(
            "Failed to reach the server. Check that the network is available \
             and consider raising `timeout_secs` in the config."
        )
    )]
    Transport { url: String, message: String },

    #[error("unsupported archive: \"{url}\"")]
    #[diagnostic(
        code(gutcat::fetch::unsupported_archive),
        help("Supported archives are .tar, .tar.gz/.tgz and .tar.bz2/.tbz2.")
    )]
    UnsupportedArchive { url: String },

    #[error("failed to unpack archive into {dest}: {source}")]
    #[diagnostic(
        code(gutcat::fetch::unpack),
        help("The download may be truncated. Retry with `gutcat fetch --force`.")
    )]
    Unpack {
        dest: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(gutcat::fetch::io),
        help("A filesystem operation failed. Check output directory permissions.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for fetch results.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Convenience alias for functions returning catalog results.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
