//! Selection of the publishable catalog.
//!
//! A wide record passes when it is English, typed as text, in the public
//! domain, and offered in a recognized plain-text format. Each condition is a
//! separate predicate; a failing predicate yields a [`FilterMismatch`] that is
//! logged and never propagated.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::model::{Field, Gid};
use crate::reshape::{WideRecord, WideTable, NONE_GIVEN};

/// Placeholder written into projected creators/subjects cells that have no value.
pub const NONE_GIVEN_DISPLAY: &str = "None given";

/// Default projection of the publishable catalog.
pub const DEFAULT_COLUMNS: [Field; 3] = [Field::Title, Field::Creators, Field::Subjects];

/// Plain-text format descriptors a work must offer to be published.
///
/// The feed's format strings drift over time, so the set carries a version
/// that is recorded in the configuration alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedFormats {
    pub version: u32,
    pub descriptors: Vec<String>,
}

impl RecognizedFormats {
    /// The descriptors used by the feed since its RDF format was introduced.
    pub fn gutenberg() -> Self {
        let mut descriptors: Vec<String> = ["utf-8", "ascii", "iso-8859-1"]
            .iter()
            .map(|cs| format!("text/plain; charset={cs}"))
            .collect();
        descriptors.push("text/plain".into());
        Self {
            version: 1,
            descriptors,
        }
    }
}

impl Default for RecognizedFormats {
    fn default() -> Self {
        Self::gutenberg()
    }
}

/// Why a record was left out of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterMismatch {
    #[error("no {field} column")]
    MissingColumn { field: Field },

    #[error("language is {found:?}")]
    Language { found: String },

    #[error("type is {found:?}")]
    MediaType { found: String },

    #[error("rights are {found:?}")]
    Rights { found: String },

    #[error("no recognized plain-text format")]
    Format,
}

/// The selection predicates and their parameters.
#[derive(Debug, Clone)]
pub struct CatalogFilter {
    language: String,
    media_type: String,
    rights_prefix: String,
    formats: RecognizedFormats,
    format_pattern: Regex,
}

impl CatalogFilter {
    /// Build a filter. Comparison values are normalized to upper case, the
    /// same normalization extracted values went through.
    pub fn new(
        language: &str,
        media_type: &str,
        rights_prefix: &str,
        formats: RecognizedFormats,
    ) -> Result<Self, ConfigError> {
        if formats.descriptors.is_empty() {
            return Err(ConfigError::InvalidFormats {
                message: "the recognized format list is empty".into(),
            });
        }
        let alternatives: Vec<String> = formats
            .descriptors
            .iter()
            .map(|d| regex::escape(d.trim()))
            .collect();
        // A descriptor must start a line of the cell, after optional whitespace.
        let pattern = format!(r"(?mi)^\s*(?:{})", alternatives.join("|"));
        let format_pattern = Regex::new(&pattern).map_err(|e| ConfigError::InvalidFormats {
            message: e.to_string(),
        })?;

        Ok(Self {
            language: language.trim().to_uppercase(),
            media_type: media_type.trim().to_uppercase(),
            rights_prefix: rights_prefix.trim().to_uppercase(),
            formats,
            format_pattern,
        })
    }

    /// English public-domain texts in a recognized plain-text format.
    pub fn gutenberg() -> Result<Self, ConfigError> {
        Self::new("en", "Text", "Public", RecognizedFormats::gutenberg())
    }

    pub fn formats(&self) -> &RecognizedFormats {
        &self.formats
    }

    pub fn language_matches(&self, rec: &WideRecord) -> Result<(), FilterMismatch> {
        let found = cell(rec, Field::Languages)?;
        if found == self.language {
            Ok(())
        } else {
            Err(FilterMismatch::Language {
                found: found.to_string(),
            })
        }
    }

    pub fn type_matches(&self, rec: &WideRecord) -> Result<(), FilterMismatch> {
        let found = cell(rec, Field::Types)?;
        if found == self.media_type {
            Ok(())
        } else {
            Err(FilterMismatch::MediaType {
                found: found.to_string(),
            })
        }
    }

    pub fn rights_match(&self, rec: &WideRecord) -> Result<(), FilterMismatch> {
        let found = cell(rec, Field::Rights)?;
        if found != NONE_GIVEN && found.starts_with(&self.rights_prefix) {
            Ok(())
        } else {
            Err(FilterMismatch::Rights {
                found: found.to_string(),
            })
        }
    }

    pub fn format_matches(&self, rec: &WideRecord) -> Result<(), FilterMismatch> {
        match rec.get(Field::Formats) {
            Some(found) if found != NONE_GIVEN && self.format_pattern.is_match(found) => Ok(()),
            _ => Err(FilterMismatch::Format),
        }
    }

    /// Run every predicate, in order, stopping at the first mismatch.
    pub fn check(&self, rec: &WideRecord) -> Result<(), FilterMismatch> {
        self.language_matches(rec)?;
        self.type_matches(rec)?;
        self.rights_match(rec)?;
        self.format_matches(rec)
    }

    /// Select passing records and project them onto `columns`.
    ///
    /// An empty `columns` means [`DEFAULT_COLUMNS`].
    pub fn apply(&self, wide: &WideTable, columns: &[Field]) -> CatalogTable {
        let mut projection: Vec<Field> = Vec::new();
        for field in if columns.is_empty() { &DEFAULT_COLUMNS[..] } else { columns } {
            if !projection.contains(field) {
                projection.push(*field);
            }
        }

        let mut entries = BTreeMap::new();
        for (gid, rec) in wide.iter() {
            if let Err(mismatch) = self.check(rec) {
                tracing::trace!(%gid, %mismatch, "filtered out");
                continue;
            }
            let cells = projection
                .iter()
                .map(|field| (*field, project(rec, *field)))
                .collect();
            entries.insert(gid, CatalogEntry { cells });
        }

        tracing::info!(
            candidates = wide.len(),
            selected = entries.len(),
            "catalog filtered"
        );
        CatalogTable {
            columns: projection,
            entries,
        }
    }
}

fn cell(rec: &WideRecord, field: Field) -> Result<&str, FilterMismatch> {
    rec.get(field).ok_or(FilterMismatch::MissingColumn { field })
}

fn project(rec: &WideRecord, field: Field) -> String {
    let substitutes = matches!(field, Field::Creators | Field::Subjects);
    match rec.get(field) {
        Some(value) if value != NONE_GIVEN => value.to_string(),
        _ if substitutes => NONE_GIVEN_DISPLAY.to_string(),
        _ => NONE_GIVEN.to_string(),
    }
}

/// One published row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    cells: BTreeMap<Field, String>,
}

impl CatalogEntry {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.cells.get(&field).map(String::as_str)
    }
}

/// The publishable catalog, indexed by gid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTable {
    columns: Vec<Field>,
    entries: BTreeMap<Gid, CatalogEntry>,
}

impl CatalogTable {
    /// Projected columns, in the caller's order.
    pub fn columns(&self) -> &[Field] {
        &self.columns
    }

    pub fn get(&self, gid: Gid) -> Option<&CatalogEntry> {
        self.entries.get(&gid)
    }

    /// Entries in ascending gid order.
    pub fn iter(&self) -> impl Iterator<Item = (Gid, &CatalogEntry)> {
        self.entries.iter().map(|(gid, e)| (*gid, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
