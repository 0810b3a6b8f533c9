//! Long-form → wide reshaping.
//!
//! Two pure steps: [`group_and_join`] collapses the values of each
//! (gid, field) pair into one newline-joined string, and [`pivot_with_fill`]
//! lays the groups out as one record per gid with a cell for every declared
//! field.

use std::collections::BTreeMap;

use crate::model::{Field, Gid, Observation};

/// Separator between the values of a multi-valued cell.
pub const VALUE_SEPARATOR: &str = "\n";

/// Cell value for a field with no observations.
pub const NONE_GIVEN: &str = "NONE GIVEN";

/// Joined values per (gid, field), only for pairs that have observations.
pub type Grouped = BTreeMap<Gid, BTreeMap<Field, String>>;

/// One row of the wide table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideRecord {
    cells: BTreeMap<Field, String>,
}

impl WideRecord {
    /// Cell for `field`, or `None` if the field is not a column.
    pub fn get(&self, field: Field) -> Option<&str> {
        self.cells.get(&field).map(String::as_str)
    }

    /// Whether `field` is a column whose cell is the fill sentinel.
    pub fn is_none_given(&self, field: Field) -> bool {
        self.get(field) == Some(NONE_GIVEN)
    }

    pub fn cells(&self) -> &BTreeMap<Field, String> {
        &self.cells
    }
}

/// One record per gid, one column per declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideTable {
    fields: Vec<Field>,
    records: BTreeMap<Gid, WideRecord>,
}

impl WideTable {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, gid: Gid) -> Option<&WideRecord> {
        self.records.get(&gid)
    }

    /// Records in ascending gid order.
    pub fn iter(&self) -> impl Iterator<Item = (Gid, &WideRecord)> {
        self.records.iter().map(|(gid, rec)| (*gid, rec))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Group observations by (gid, field) and join each group's values in
/// sequence order.
pub fn group_and_join<'a>(observations: impl IntoIterator<Item = &'a Observation>) -> Grouped {
    let mut grouped: Grouped = BTreeMap::new();
    for obs in observations {
        grouped
            .entry(obs.gid)
            .or_default()
            .entry(obs.field)
            .and_modify(|joined| {
                joined.push_str(VALUE_SEPARATOR);
                joined.push_str(&obs.value);
            })
            .or_insert_with(|| obs.value.clone());
    }
    grouped
}

/// Lay groups out as wide records over `fields`, filling absent cells with
/// [`NONE_GIVEN`].
///
/// Groups for fields outside `fields` are dropped. Column order follows
/// [`Field`] order regardless of the order of `fields`.
pub fn pivot_with_fill(grouped: Grouped, fields: &[Field]) -> WideTable {
    let mut fields = fields.to_vec();
    fields.sort();
    fields.dedup();

    let records = grouped
        .into_iter()
        .map(|(gid, mut joined)| {
            let cells = fields
                .iter()
                .map(|f| {
                    let cell = joined.remove(f).unwrap_or_else(|| NONE_GIVEN.to_string());
                    (*f, cell)
                })
                .collect();
            (gid, WideRecord { cells })
        })
        .collect();

    WideTable { fields, records }
}

/// Both steps at once.
pub fn reshape<'a>(
    observations: impl IntoIterator<Item = &'a Observation>,
    fields: &[Field],
) -> WideTable {
    pivot_with_fill(group_and_join(observations), fields)
}

/// Both steps, with a record for every gid in `gids`.
///
/// A gid whose document matched no field still gets a record, filled
/// entirely with [`NONE_GIVEN`].
pub fn reshape_with_gids<'a>(
    gids: &[Gid],
    observations: impl IntoIterator<Item = &'a Observation>,
    fields: &[Field],
) -> WideTable {
    let mut grouped = group_and_join(observations);
    for gid in gids {
        grouped.entry(*gid).or_default();
    }
    pivot_with_fill(grouped, fields)
}
