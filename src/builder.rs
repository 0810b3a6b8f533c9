//! Catalog builder: runs extraction over many identifiers and flattens the
//! results into the long-form observation table.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, ExtractResult};
use crate::extract::{Extractor, Metadata};
use crate::model::{Field, Gid, Observation};

/// What to do when one identifier cannot be extracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the build at the first failing identifier.
    #[default]
    Abort,
    /// Log the failure, record it in the report, and keep going.
    Skip,
}

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub policy: FailurePolicy,
    /// Extract documents on the rayon thread pool.
    pub parallel: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::Abort,
            parallel: true,
        }
    }
}

/// The long-form table: one row per extracted (gid, field, value).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationTable {
    rows: Vec<Observation>,
}

impl ObservationTable {
    pub fn new(rows: Vec<Observation>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Count identical values of `field`, optionally only those starting
    /// with `prefix`. Sorted by descending count, then value.
    pub fn value_counts(&self, field: Field, prefix: Option<&str>) -> Vec<(String, usize)> {
        let prefix = prefix.map(str::to_uppercase);
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for obs in self.rows.iter().filter(|o| o.field == field) {
            if prefix.as_deref().is_some_and(|p| !obs.value.starts_with(p)) {
                continue;
            }
            *counts.entry(obs.value.as_str()).or_default() += 1;
        }
        let mut counts: Vec<(String, usize)> =
            counts.into_iter().map(|(v, n)| (v.to_string(), n)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }
}

impl IntoIterator for ObservationTable {
    type Item = Observation;
    type IntoIter = std::vec::IntoIter<Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Outcome of a build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub table: ObservationTable,
    /// Identifiers that contributed to the table.
    pub extracted: Vec<Gid>,
    /// Identifiers left out under [`FailurePolicy::Skip`], with the reason.
    pub skipped: Vec<(Gid, String)>,
}

/// Flatten one document's metadata into observations.
///
/// Values are upper-cased. Fields that sort their values are sorted after
/// upper-casing, so the order matches what downstream comparisons see.
pub fn observations_for(gid: Gid, metadata: Metadata) -> Vec<Observation> {
    let mut out = Vec::new();
    for (field, values) in metadata {
        let mut values: Vec<String> = values.iter().map(|v| v.to_uppercase()).collect();
        if field.sorts_values() {
            values.sort();
        }
        out.extend(values.into_iter().map(|v| Observation::new(gid, field, v)));
    }
    out
}

/// Extract every identifier in `gids` and build the observation table.
///
/// Rows keep the order of `gids`, whether or not extraction runs in
/// parallel. Under [`FailurePolicy::Abort`] the error returned is the one for
/// the earliest failing identifier.
pub fn build_observations(
    extractor: &Extractor,
    gids: &[Gid],
    options: BuildOptions,
) -> ExtractResult<BuildReport> {
    let extract_one = |gid: Gid| -> (Gid, ExtractResult<Vec<Observation>>) {
        let result = extractor.extract(gid).map(|md| observations_for(gid, md));
        (gid, result)
    };

    let results: Vec<(Gid, ExtractResult<Vec<Observation>>)> = if options.parallel {
        gids.par_iter().map(|&gid| extract_one(gid)).collect()
    } else {
        gids.iter().map(|&gid| extract_one(gid)).collect()
    };

    let mut report = BuildReport::default();
    let mut rows = Vec::new();
    for (gid, result) in results {
        match result {
            Ok(observations) => {
                tracing::debug!(%gid, values = observations.len(), "extracted");
                rows.extend(observations);
                report.extracted.push(gid);
            }
            Err(err) => match options.policy {
                FailurePolicy::Abort => return Err(err),
                FailurePolicy::Skip => {
                    tracing::warn!(%gid, error = %err, "skipping identifier");
                    report.skipped.push((gid, describe(&err)));
                }
            },
        }
    }
    report.table = ObservationTable::new(rows);

    tracing::info!(
        extracted = report.extracted.len(),
        skipped = report.skipped.len(),
        observations = report.table.len(),
        "observation table built"
    );
    Ok(report)
}

fn describe(err: &ExtractError) -> String {
    match err {
        ExtractError::NotFound { .. } => "missing".into(),
        ExtractError::Parse { message, .. } => format!("malformed: {message}"),
        ExtractError::Io { source, .. } => format!("unreadable: {source}"),
    }
}
