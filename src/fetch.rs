//! Fetching the metadata feed and plain-text works over HTTP.
//!
//! Uses `ureq` for synchronous requests with a configurable timeout. The
//! feed archive is streamed straight into the tar unpacker; nothing is
//! buffered in memory.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::EpubCache;
use crate::config::CatalogConfig;
use crate::error::{FetchError, FetchResult};
use crate::model::Gid;

/// Compression wrapped around the feed tarball.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    Gzip,
    Bzip2,
}

impl ArchiveKind {
    /// Detect the archive kind from a URL or file name.
    pub fn detect(url: &str) -> Option<Self> {
        let lower = url.to_lowercase();
        if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
            Some(Self::Bzip2)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::Gzip)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Unpack a tar stream into `dest`.
pub fn unpack_archive(reader: impl Read, kind: ArchiveKind, dest: &Path) -> FetchResult<()> {
    std::fs::create_dir_all(dest).map_err(|e| FetchError::Io { source: e })?;
    let unpack_err = |e: std::io::Error| FetchError::Unpack {
        dest: dest.display().to_string(),
        source: e,
    };
    match kind {
        ArchiveKind::Tar => tar::Archive::new(reader).unpack(dest).map_err(unpack_err),
        ArchiveKind::Gzip => tar::Archive::new(flate2::read::GzDecoder::new(reader))
            .unpack(dest)
            .map_err(unpack_err),
        ArchiveKind::Bzip2 => tar::Archive::new(bzip2::read::BzDecoder::new(reader))
            .unpack(dest)
            .map_err(unpack_err),
    }
}

/// Result of [`Fetcher::fetch_archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The cache already held records; nothing was downloaded.
    AlreadyCached,
    /// The archive was downloaded and unpacked.
    Unpacked { records: usize },
}

/// HTTP client for the feed archive and plain-text downloads.
pub struct Fetcher {
    agent: ureq::Agent,
    archive_url: String,
    text_url: String,
}

impl Fetcher {
    pub fn new(config: &CatalogConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.timeout_secs))
            .timeout_read(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            agent,
            archive_url: config.archive_url.clone(),
            text_url: config.text_url.clone(),
        }
    }

    fn get(&self, url: &str) -> FetchResult<ureq::Response> {
        match self.agent.get(url).call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Status {
                url: url.into(),
                status,
            }),
            Err(ureq::Error::Transport(transport)) => Err(FetchError::Transport {
                url: url.into(),
                message: transport.to_string(),
            }),
        }
    }

    /// Download and unpack the feed archive into `root`.
    ///
    /// Skipped when `cache` already holds records, unless `force` is set, in
    /// which case the existing records are removed first.
    pub fn fetch_archive(
        &self,
        root: &Path,
        cache: &EpubCache,
        force: bool,
    ) -> FetchResult<FetchOutcome> {
        if cache.is_populated() {
            if !force {
                tracing::info!(path = %cache.dir().display(), "cache already populated");
                return Ok(FetchOutcome::AlreadyCached);
            }
            cache.delete().map_err(|e| FetchError::Io { source: e })?;
        }

        let kind = ArchiveKind::detect(&self.archive_url).ok_or_else(|| {
            FetchError::UnsupportedArchive {
                url: self.archive_url.clone(),
            }
        })?;

        tracing::info!(url = %self.archive_url, dest = %root.display(), "fetching archive");
        let response = self.get(&self.archive_url)?;
        unpack_archive(response.into_reader(), kind, root)?;

        let records = cache
            .gids()
            .map_err(|e| FetchError::Io { source: e })?
            .len();
        tracing::info!(records, "archive unpacked");
        Ok(FetchOutcome::Unpacked { records })
    }

    /// Plain-text URL of a work.
    pub fn text_url(&self, gid: Gid) -> String {
        self.text_url.replace("{gid}", &gid.to_string())
    }

    /// Download the plain text of `gid` to `<out_dir>/g<gid>.txt`.
    pub fn download_text(&self, gid: Gid, out_dir: &Path) -> FetchResult<PathBuf> {
        std::fs::create_dir_all(out_dir).map_err(|e| FetchError::Io { source: e })?;
        let url = self.text_url(gid);
        let response = self.get(&url)?;

        let path = out_dir.join(format!("g{gid}.txt"));
        let mut file = std::fs::File::create(&path).map_err(|e| FetchError::Io { source: e })?;
        std::io::copy(&mut response.into_reader(), &mut file).map_err(|e| {
            FetchError::Transport {
                url: url.clone(),
                message: format!("read body: {e}"),
            }
        })?;
        tracing::debug!(%gid, path = %path.display(), "downloaded text");
        Ok(path)
    }

    /// Download several works, stopping at the first failure.
    pub fn download_texts(&self, gids: &[Gid], out_dir: &Path) -> FetchResult<Vec<PathBuf>> {
        gids.iter()
            .map(|gid| self.download_text(*gid, out_dir))
            .collect()
    }
}
