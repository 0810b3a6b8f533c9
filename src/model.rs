//! Core data types for the catalog pipeline.
//!
//! A cached metadata document is reduced to [`Observation`]s, one per
//! extracted value. Observations are keyed by [`Gid`] and tagged with the
//! [`Field`] they were extracted for.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Catalog identifier of one work.
///
/// Identifiers are assigned by the upstream collection and are always
/// positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(NonZeroU64);

impl Gid {
    /// Create a `Gid` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Gid)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Gid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u64 = s
            .trim()
            .parse()
            .map_err(|_| format!("not a catalog identifier: \"{s}\""))?;
        Gid::new(raw).ok_or_else(|| "catalog identifiers start at 1".to_string())
    }
}

/// The bibliographic attributes extracted from every document.
///
/// Variant order is the column order of wide tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Subjects,
    Bookshelves,
    Languages,
    Agents,
    Rights,
    Title,
    Types,
    Creators,
    Formats,
}

impl Field {
    /// Every field, in column order.
    pub const ALL: [Field; 9] = [
        Field::Subjects,
        Field::Bookshelves,
        Field::Languages,
        Field::Agents,
        Field::Rights,
        Field::Title,
        Field::Types,
        Field::Creators,
        Field::Formats,
    ];

    /// Column name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subjects => "subjects",
            Self::Bookshelves => "bookshelves",
            Self::Languages => "languages",
            Self::Agents => "agents",
            Self::Rights => "rights",
            Self::Title => "title",
            Self::Types => "types",
            Self::Creators => "creators",
            Self::Formats => "formats",
        }
    }

    /// Whether values must be sorted before they are joined.
    ///
    /// Format lists have no meaningful document order.
    pub fn sorts_values(&self) -> bool {
        matches!(self, Self::Formats)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Field::ALL.iter().map(|f| f.as_str()).collect();
                format!("unknown field \"{s}\" (expected one of: {})", known.join(", "))
            })
    }
}

/// One extracted value: the long-form unit of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub gid: Gid,
    pub field: Field,
    pub value: String,
}

impl Observation {
    pub fn new(gid: Gid, field: Field, value: impl Into<String>) -> Self {
        Self {
            gid,
            field,
            value: value.into(),
        }
    }
}
