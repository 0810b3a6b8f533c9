//! Durable relation store backed by redb.
//!
//! A relation is a rectangular table: ordered column names plus one row per
//! [`Gid`]. Each relation lives in its own redb table keyed by gid; its
//! column list is kept in a shared schema table. Rewriting a relation
//! replaces it wholesale inside one write transaction.

pub mod like;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition, TableError};

use crate::error::{StoreError, StoreResult};
use crate::filter::CatalogTable;
use crate::model::{Field, Gid};
use crate::reshape::WideTable;

pub use like::LikePattern;

/// Name of the published catalog relation.
pub const CATALOG_RELATION: &str = "catalog";

/// Column list per relation name.
const SCHEMA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("schema");

fn rows_table_name(relation: &str) -> String {
    format!("relation:{relation}")
}

fn redb_err<E: Display>(op: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

/// A rectangular table keyed by gid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    name: String,
    columns: Vec<String>,
    rows: BTreeMap<Gid, Vec<String>>,
}

impl Relation {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: BTreeMap::new(),
        }
    }

    /// The wide table as a relation: every declared field is a column.
    pub fn from_wide(name: impl Into<String>, wide: &WideTable) -> Self {
        let mut relation = Self::new(name, field_columns(wide.fields()));
        for (gid, record) in wide.iter() {
            let values = wide
                .fields()
                .iter()
                .map(|f| record.get(*f).unwrap_or_default().to_string())
                .collect();
            relation.rows.insert(gid, values);
        }
        relation
    }

    /// The published catalog as a relation, in projection order.
    pub fn from_catalog(name: impl Into<String>, catalog: &CatalogTable) -> Self {
        let mut relation = Self::new(name, field_columns(catalog.columns()));
        for (gid, entry) in catalog.iter() {
            let values = catalog
                .columns()
                .iter()
                .map(|f| entry.get(*f).unwrap_or_default().to_string())
                .collect();
            relation.rows.insert(gid, values);
        }
        relation
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, column: &str) -> StoreResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| StoreError::UnknownColumn {
                relation: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// Add or replace a row. The row must have one value per column.
    pub fn insert(&mut self, gid: Gid, values: Vec<String>) -> StoreResult<()> {
        if values.len() != self.columns.len() {
            return Err(StoreError::SchemaMismatch {
                relation: self.name.clone(),
                gid,
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        self.rows.insert(gid, values);
        Ok(())
    }

    pub fn get(&self, gid: Gid) -> Option<&[String]> {
        self.rows.get(&gid).map(Vec::as_slice)
    }

    /// Rows in ascending gid order.
    pub fn rows(&self) -> impl Iterator<Item = (Gid, &[String])> {
        self.rows.iter().map(|(gid, v)| (*gid, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn field_columns(fields: &[Field]) -> Vec<String> {
    fields.iter().map(|f| f.as_str().to_string()).collect()
}

/// The embedded catalog database.
pub struct CatalogStore {
    db: Database,
}

impl CatalogStore {
    /// Open or create the database file at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io { source: e })?;
        }
        let db = Database::create(path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", path.display()),
        })?;
        Ok(Self { db })
    }

    /// Replace the relation of the same name, rows and schema together.
    pub fn replace(&self, relation: &Relation) -> StoreResult<()> {
        let rows_name = rows_table_name(&relation.name);
        let rows_def: TableDefinition<u64, &[u8]> = TableDefinition::new(&rows_name);
        let columns = encode(&relation.columns)?;

        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        txn.delete_table(rows_def).map_err(redb_err("delete_table"))?;
        {
            let mut rows = txn.open_table(rows_def).map_err(redb_err("open_table"))?;
            for (gid, values) in &relation.rows {
                let bytes = encode(values)?;
                rows.insert(gid.get(), bytes.as_slice())
                    .map_err(redb_err("insert"))?;
            }
            let mut schema = txn.open_table(SCHEMA_TABLE).map_err(redb_err("open_table"))?;
            schema
                .insert(relation.name.as_str(), columns.as_slice())
                .map_err(redb_err("insert"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;

        tracing::info!(
            relation = %relation.name,
            rows = relation.len(),
            columns = relation.columns.len(),
            "relation replaced"
        );
        Ok(())
    }

    /// Column names of a stored relation.
    pub fn columns(&self, name: &str) -> StoreResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let schema = match txn.open_table(SCHEMA_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(StoreError::RelationNotFound { name: name.into() });
            }
            Err(e) => return Err(redb_err("open_table")(e)),
        };
        let guard = schema
            .get(name)
            .map_err(redb_err("get"))?
            .ok_or_else(|| StoreError::RelationNotFound { name: name.into() })?;
        decode(guard.value())
    }

    /// Read a whole relation.
    pub fn load(&self, name: &str) -> StoreResult<Relation> {
        let mut relation = Relation::new(name, self.columns(name)?);
        self.scan(name, |gid, values| {
            relation.insert(gid, values)?;
            Ok(())
        })?;
        Ok(relation)
    }

    /// One row of a relation.
    pub fn row(&self, name: &str, gid: Gid) -> StoreResult<Option<Vec<String>>> {
        self.columns(name)?;
        let rows_name = rows_table_name(name);
        let rows_def: TableDefinition<u64, &[u8]> = TableDefinition::new(&rows_name);
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let rows = match txn.open_table(rows_def) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(redb_err("open_table")(e)),
        };
        match rows.get(gid.get()).map_err(redb_err("get"))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Gids whose `column` cell matches `pattern`, ascending.
    ///
    /// See [`LikePattern::for_lookup`] for the pattern syntax.
    pub fn lookup(&self, name: &str, pattern: &str, column: &str) -> StoreResult<Vec<Gid>> {
        let columns = self.columns(name)?;
        let idx = columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| StoreError::UnknownColumn {
                relation: name.to_string(),
                column: column.to_string(),
            })?;
        let pattern = LikePattern::for_lookup(pattern)?;

        let mut found = Vec::new();
        self.scan(name, |gid, values| {
            if values.get(idx).is_some_and(|cell| pattern.matches(cell)) {
                found.push(gid);
            }
            Ok(())
        })?;
        tracing::debug!(relation = name, column, matches = found.len(), "lookup");
        Ok(found)
    }

    /// Visit every row of a relation in gid order.
    fn scan(
        &self,
        name: &str,
        mut visit: impl FnMut(Gid, Vec<String>) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let rows_name = rows_table_name(name);
        let rows_def: TableDefinition<u64, &[u8]> = TableDefinition::new(&rows_name);
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let rows = match txn.open_table(rows_def) {
            Ok(table) => table,
            // A relation replaced with no rows may have no rows table.
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(e) => return Err(redb_err("open_table")(e)),
        };
        for entry in rows.iter().map_err(redb_err("iter"))? {
            let (key, value) = entry.map_err(redb_err("iter"))?;
            let gid = Gid::new(key.value()).ok_or_else(|| StoreError::Serialization {
                message: format!("relation \"{name}\" holds a zero gid"),
            })?;
            visit(gid, decode(value.value())?)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gid(raw: u64) -> Gid {
        Gid::new(raw).unwrap()
    }

    fn authors() -> Relation {
        let mut rel = Relation::new(
            CATALOG_RELATION,
            vec!["title".into(), "creators".into()],
        );
        rel.insert(gid(1342), vec!["PRIDE AND PREJUDICE".into(), "AUSTEN, JANE".into()])
            .unwrap();
        rel.insert(gid(26), vec!["PARADISE LOST".into(), "MILTON, JOHN".into()])
            .unwrap();
        rel.insert(gid(158), vec!["EMMA".into(), "AUSTEN, JANE".into()])
            .unwrap();
        rel
    }

    #[test]
    fn replace_and_load() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::open(&dir.path().join("db").join("catalog.redb")).unwrap();
        store.replace(&authors()).unwrap();

        let loaded = store.load(CATALOG_RELATION).unwrap();
        assert_eq!(loaded, authors());
        let gids: Vec<u64> = loaded.rows().map(|(g, _)| g.get()).collect();
        assert_eq!(gids, vec![26, 158, 1342]);
    }

    #[test]
    fn replace_drops_previous_rows_and_columns() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();
        store.replace(&authors()).unwrap();

        let mut smaller = Relation::new(CATALOG_RELATION, vec!["title".into()]);
        smaller.insert(gid(5), vec!["X".into()]).unwrap();
        store.replace(&smaller).unwrap();

        let loaded = store.load(CATALOG_RELATION).unwrap();
        assert_eq!(loaded.columns(), &["title".to_string()]);
        assert_eq!(loaded.len(), 1);
        assert!(store.row(CATALOG_RELATION, gid(1342)).unwrap().is_none());
    }

    #[test]
    fn lookup_by_pattern() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();
        store.replace(&authors()).unwrap();

        let austen = store.lookup(CATALOG_RELATION, "AUSTEN%", "creators").unwrap();
        assert_eq!(austen, vec![gid(158), gid(1342)]);
        let milton = store.lookup(CATALOG_RELATION, "Milton", "creators").unwrap();
        assert_eq!(milton, vec![gid(26)]);
        assert!(store
            .lookup(CATALOG_RELATION, "%PARADISE%", "creators")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unknown_relation_and_column() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();
        assert!(matches!(
            store.load("catalog"),
            Err(StoreError::RelationNotFound { .. })
        ));
        store.replace(&authors()).unwrap();
        assert!(matches!(
            store.lookup(CATALOG_RELATION, "X", "formats"),
            Err(StoreError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn row_width_is_checked() {
        let mut rel = Relation::new("r", vec!["a".into(), "b".into()]);
        let err = rel.insert(gid(1), vec!["only one".into()]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::SchemaMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.redb");
        {
            let store = CatalogStore::open(&path).unwrap();
            store.replace(&authors()).unwrap();
        }
        let store = CatalogStore::open(&path).unwrap();
        assert_eq!(
            store.row(CATALOG_RELATION, gid(26)).unwrap(),
            Some(vec!["PARADISE LOST".to_string(), "MILTON, JOHN".to_string()])
        );
    }
}
