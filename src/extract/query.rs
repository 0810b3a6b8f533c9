//! Compiled element-path queries.
//!
//! Queries use the ElementPath subset the field table needs:
//! `.//dcterms:creator/pgterms:agent/pgterms:name` selects every
//! `pgterms:name` child of a `pgterms:agent` child of a `dcterms:creator`
//! element anywhere below the document root. A query without the leading
//! `.//` is anchored at the root's children. `*` matches any element.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Prefix → namespace URI bindings used to resolve query steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespaces(BTreeMap<String, String>);

impl Namespaces {
    /// The bindings used by the Project Gutenberg RDF feed.
    pub fn gutenberg() -> Self {
        let pairs = [
            ("base", "http://www.gutenberg.org/"),
            ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
            ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
            ("marcrel", "http://id.loc.gov/vocabulary/relators/"),
            ("pgterms", "http://www.gutenberg.org/2009/pgterms/"),
            ("cc", "http://web.resource.org/cc/"),
            ("dcam", "http://purl.org/dc/dcam/"),
            ("dcterms", "http://purl.org/dc/terms/"),
        ];
        Self(
            pairs
                .into_iter()
                .map(|(p, uri)| (p.to_string(), uri.to_string()))
                .collect(),
        )
    }

    /// Resolve a prefix to its URI.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.0.get(prefix).map(String::as_str)
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::gutenberg()
    }
}

/// Namespace-qualified element name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: Option<&str>, local: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            local: local.to_string(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Any,
    Name(QName),
}

impl Step {
    fn matches(&self, name: &QName) -> bool {
        match self {
            Step::Any => true,
            Step::Name(want) => want == name,
        }
    }
}

/// A path query compiled against a namespace map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    descendant: bool,
    steps: Vec<Step>,
}

impl PathQuery {
    /// Compile `expr`, resolving every prefix through `namespaces`.
    pub fn compile(expr: &str, namespaces: &Namespaces) -> Result<Self, ConfigError> {
        let trimmed = expr.trim();
        let (descendant, rest) = if let Some(rest) = trimmed.strip_prefix(".//") {
            (true, rest)
        } else if let Some(rest) = trimmed.strip_prefix("./") {
            (false, rest)
        } else {
            (false, trimmed)
        };

        if rest.is_empty() {
            return Err(ConfigError::InvalidQuery {
                query: expr.to_string(),
                message: "query selects no elements".into(),
            });
        }

        let mut steps = Vec::new();
        for raw in rest.split('/') {
            let step = match raw {
                "" => {
                    return Err(ConfigError::InvalidQuery {
                        query: expr.to_string(),
                        message: "`//` is only supported at the start of a query".into(),
                    });
                }
                "*" => Step::Any,
                _ => match raw.split_once(':') {
                    Some((prefix, local)) => {
                        let uri = namespaces.resolve(prefix).ok_or_else(|| {
                            ConfigError::UnknownPrefix {
                                prefix: prefix.to_string(),
                                query: expr.to_string(),
                            }
                        })?;
                        Step::Name(QName::new(Some(uri), local))
                    }
                    None => Step::Name(QName::new(None, raw)),
                },
            };
            steps.push(step);
        }

        Ok(Self {
            descendant,
            steps,
        })
    }

    /// Whether the innermost element of `stack` is selected.
    ///
    /// `stack[0]` is the document root, which a query never selects.
    pub fn matches(&self, stack: &[QName]) -> bool {
        let k = self.steps.len();
        if stack.len() < k + 1 {
            return false;
        }
        if !self.descendant && stack.len() != k + 1 {
            return false;
        }
        let tail = &stack[stack.len() - k..];
        self.steps.iter().zip(tail).all(|(step, name)| step.matches(name))
    }
}
