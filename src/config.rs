//! Pipeline configuration, persisted as TOML.
//!
//! Every key is optional. The namespace map, field table and filter
//! parameters are compiled once into an [`Extractor`] and a
//! [`CatalogFilter`], which are then passed explicitly through the pipeline.

use std::collections::BTreeMap;
use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::{BuildOptions, FailurePolicy};
use crate::cache::EpubCache;
use crate::extract::{Extractor, FieldTable, Namespaces};
use crate::filter::{CatalogFilter, RecognizedFormats, DEFAULT_COLUMNS};
use crate::model::Field;

/// Errors from loading or compiling configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(gutcat::config::read),
        help("Ensure the config file is readable, or remove it to use the defaults.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(gutcat::config::parse),
        help("Check the TOML syntax and key names in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(gutcat::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown namespace prefix \"{prefix}\" in query \"{query}\"")]
    #[diagnostic(
        code(gutcat::config::unknown_prefix),
        help("Declare the prefix under [namespaces] in the config file.")
    )]
    UnknownPrefix { prefix: String, query: String },

    #[error("invalid query \"{query}\": {message}")]
    #[diagnostic(
        code(gutcat::config::invalid_query),
        help(
            "Queries are `.//prefix:name/prefix:name/...` paths; \
             `//` may only appear at the start."
        )
    )]
    InvalidQuery { query: String, message: String },

    #[error("{message}")]
    #[diagnostic(
        code(gutcat::config::unknown_field),
        help("Field names under [fields] must be catalog fields.")
    )]
    UnknownField { message: String },

    #[error("invalid recognized formats: {message}")]
    #[diagnostic(
        code(gutcat::config::invalid_formats),
        help("List at least one MIME descriptor under [filter].formats.")
    )]
    InvalidFormats { message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Selection and projection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_media_type")]
    pub media_type: String,
    #[serde(default = "default_rights_prefix")]
    pub rights_prefix: String,
    #[serde(default = "default_formats_version")]
    pub formats_version: u32,
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    #[serde(default = "default_columns")]
    pub columns: Vec<Field>,
}

fn default_language() -> String {
    "en".into()
}
fn default_media_type() -> String {
    "Text".into()
}
fn default_rights_prefix() -> String {
    "Public".into()
}
fn default_formats_version() -> u32 {
    RecognizedFormats::gutenberg().version
}
fn default_formats() -> Vec<String> {
    RecognizedFormats::gutenberg().descriptors
}
fn default_columns() -> Vec<Field> {
    DEFAULT_COLUMNS.to_vec()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            media_type: default_media_type(),
            rights_prefix: default_rights_prefix(),
            formats_version: default_formats_version(),
            formats: default_formats(),
            columns: default_columns(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Feed archive (`.tar.bz2`, `.tar.gz` or `.tar`).
    #[serde(default = "default_archive_url")]
    pub archive_url: String,
    /// Plain-text download URL; `{gid}` is replaced by the identifier.
    #[serde(default = "default_text_url")]
    pub text_url: String,
    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extract documents in parallel.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default)]
    pub on_error: FailurePolicy,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub namespaces: Namespaces,
    /// Field → query. Replaces the built-in table when present.
    #[serde(default = "default_fields")]
    pub fields: BTreeMap<String, String>,
}

fn default_archive_url() -> String {
    "https://www.gutenberg.org/cache/epub/feeds/rdf-files.tar.bz2".into()
}
fn default_text_url() -> String {
    "https://www.gutenberg.org/ebooks/{gid}.txt.utf-8".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_parallel() -> bool {
    true
}
fn default_fields() -> BTreeMap<String, String> {
    FieldTable::gutenberg_queries()
        .into_iter()
        .map(|(field, query)| (field.as_str().to_string(), query))
        .collect()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            archive_url: default_archive_url(),
            text_url: default_text_url(),
            timeout_secs: default_timeout_secs(),
            parallel: default_parallel(),
            on_error: FailurePolicy::default(),
            filter: FilterConfig::default(),
            namespaces: Namespaces::default(),
            fields: default_fields(),
        }
    }
}

impl CatalogConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    /// Load from a TOML file, or the defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Compile the field table against the namespace map.
    pub fn field_table(&self) -> ConfigResult<FieldTable> {
        let queries = self
            .fields
            .iter()
            .map(|(name, query)| {
                let field = name
                    .parse::<Field>()
                    .map_err(|message| ConfigError::UnknownField { message })?;
                Ok((field, query.clone()))
            })
            .collect::<ConfigResult<BTreeMap<Field, String>>>()?;
        FieldTable::compile(&queries, &self.namespaces)
    }

    /// An extractor reading from `cache`.
    pub fn extractor(&self, cache: EpubCache) -> ConfigResult<Extractor> {
        Ok(Extractor::new(cache, self.field_table()?))
    }

    pub fn catalog_filter(&self) -> ConfigResult<CatalogFilter> {
        CatalogFilter::new(
            &self.filter.language,
            &self.filter.media_type,
            &self.filter.rights_prefix,
            RecognizedFormats {
                version: self.filter.formats_version,
                descriptors: self.filter.formats.clone(),
            },
        )
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            policy: self.on_error,
            parallel: self.parallel,
        }
    }
}
