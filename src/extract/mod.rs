//! Metadata extraction from cached RDF/XML records.
//!
//! Every field of the [`FieldTable`] is a [`PathQuery`]. A document is read
//! once, in a single streaming pass; each element selected by a query
//! contributes its leading text to that field, in document order.

pub mod query;

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::cache::EpubCache;
use crate::config::ConfigError;
use crate::error::{ExtractError, ExtractResult};
use crate::model::{Field, Gid};

pub use query::{Namespaces, PathQuery, QName};

/// Extracted values per field, in document order.
///
/// Every field of the table is present, with an empty list when nothing
/// matched.
pub type Metadata = BTreeMap<Field, Vec<String>>;

/// Fixed association of fields to the queries that extract them.
#[derive(Debug, Clone)]
pub struct FieldTable {
    entries: Vec<(Field, PathQuery)>,
}

impl FieldTable {
    /// Query expressions for the Project Gutenberg RDF feed.
    pub fn gutenberg_queries() -> BTreeMap<Field, String> {
        [
            (Field::Subjects, ".//dcterms:subject/rdf:Description/rdf:value"),
            (Field::Bookshelves, ".//pgterms:bookshelf/rdf:Description/rdf:value"),
            (Field::Languages, ".//dcterms:language/rdf:Description/rdf:value"),
            (Field::Agents, ".//marcrel:ill/pgterms:agent/pgterms:name"),
            (Field::Rights, ".//dcterms:rights"),
            (Field::Title, ".//dcterms:title"),
            (Field::Types, ".//dcterms:type/rdf:Description/rdf:value"),
            (Field::Creators, ".//dcterms:creator/pgterms:agent/pgterms:name"),
            (
                Field::Formats,
                ".//dcterms:hasFormat/pgterms:file/dcterms:format/rdf:Description/rdf:value",
            ),
        ]
        .into_iter()
        .map(|(f, q)| (f, q.to_string()))
        .collect()
    }

    /// Compile a table of query expressions.
    pub fn compile(
        queries: &BTreeMap<Field, String>,
        namespaces: &Namespaces,
    ) -> Result<Self, ConfigError> {
        let entries = queries
            .iter()
            .map(|(field, expr)| PathQuery::compile(expr, namespaces).map(|q| (*field, q)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// The Project Gutenberg table.
    pub fn gutenberg() -> Result<Self, ConfigError> {
        Self::compile(&Self::gutenberg_queries(), &Namespaces::gutenberg())
    }

    /// Declared fields, in column order.
    pub fn fields(&self) -> Vec<Field> {
        self.entries.iter().map(|(f, _)| *f).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An element that is still open while streaming.
struct OpenElement {
    /// Captures started by this element: (entry index, slot in the field's values).
    captures: Vec<(usize, usize)>,
    /// Only text before the first child element is captured.
    seen_child: bool,
}

/// Reads cached documents and evaluates the field table against them.
#[derive(Debug, Clone)]
pub struct Extractor {
    cache: EpubCache,
    table: FieldTable,
}

impl Extractor {
    pub fn new(cache: EpubCache, table: FieldTable) -> Self {
        Self { cache, table }
    }

    pub fn table(&self) -> &FieldTable {
        &self.table
    }

    pub fn cache(&self) -> &EpubCache {
        &self.cache
    }

    /// Locate, read and parse the document for `gid`.
    pub fn extract(&self, gid: Gid) -> ExtractResult<Metadata> {
        let xml = self.cache.read_document(gid)?;
        self.extract_document(gid, &xml)
    }

    /// Parse an already-loaded document.
    pub fn extract_document(&self, gid: Gid, xml: &str) -> ExtractResult<Metadata> {
        let parse_err = |message: String| ExtractError::Parse { gid, message };

        let mut values: Vec<Vec<String>> = vec![Vec::new(); self.table.len()];
        let mut path: Vec<QName> = Vec::new();
        let mut open: Vec<OpenElement> = Vec::new();
        let mut saw_root = false;

        let mut reader = NsReader::from_str(xml);
        loop {
            let (resolved, event) = reader
                .read_resolved_event()
                .map_err(|e| parse_err(e.to_string()))?;
            match event {
                Event::Start(start) | Event::Empty(start) if path.is_empty() && saw_root => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    return Err(parse_err(format!(
                        "second root element <{name}> after the document element"
                    )));
                }
                Event::Start(start) => {
                    saw_root = true;
                    if let Some(parent) = open.last_mut() {
                        parent.seen_child = true;
                    }
                    path.push(element_name(&resolved, start.local_name().as_ref()));
                    let captures = self.begin_captures(&path, &mut values);
                    open.push(OpenElement {
                        captures,
                        seen_child: false,
                    });
                }
                Event::Empty(_) => {
                    // Self-closing elements have no text, selected or not.
                    saw_root = true;
                    if let Some(parent) = open.last_mut() {
                        parent.seen_child = true;
                    }
                }
                Event::End(_) => {
                    path.pop();
                    open.pop();
                }
                Event::Text(text) => {
                    if let Some(top) = open.last() {
                        if !top.seen_child && !top.captures.is_empty() {
                            let text = text
                                .unescape()
                                .map_err(|e| parse_err(format!("bad text content: {e}")))?;
                            append(&mut values, &top.captures, &text);
                        }
                    } else if !text.iter().all(u8::is_ascii_whitespace) {
                        return Err(parse_err("text outside the document element".into()));
                    }
                }
                Event::CData(cdata) => {
                    if let Some(top) = open.last() {
                        if !top.seen_child && !top.captures.is_empty() {
                            let text = String::from_utf8_lossy(&cdata);
                            append(&mut values, &top.captures, &text);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(parse_err("document has no root element".into()));
        }
        if let Some(unclosed) = path.last() {
            return Err(parse_err(format!("unexpected end of document inside <{unclosed}>")));
        }

        Ok(self
            .table
            .entries
            .iter()
            .zip(values)
            .map(|((field, _), mut found)| {
                found.retain(|v| !v.is_empty());
                (*field, found)
            })
            .collect())
    }

    /// Open a value slot for every query selecting the innermost element.
    fn begin_captures(&self, path: &[QName], values: &mut [Vec<String>]) -> Vec<(usize, usize)> {
        let mut captures = Vec::new();
        for (idx, (_, query)) in self.table.entries.iter().enumerate() {
            if query.matches(path) {
                values[idx].push(String::new());
                captures.push((idx, values[idx].len() - 1));
            }
        }
        captures
    }
}

fn element_name(resolved: &ResolveResult<'_>, local: &[u8]) -> QName {
    let local = String::from_utf8_lossy(local);
    match resolved {
        ResolveResult::Bound(ns) => {
            let ns = String::from_utf8_lossy(ns.as_ref());
            QName::new(Some(&ns), &local)
        }
        _ => QName::new(None, &local),
    }
}

fn append(values: &mut [Vec<String>], captures: &[(usize, usize)], text: &str) {
    for &(idx, slot) in captures {
        values[idx][slot].push_str(text);
    }
}
