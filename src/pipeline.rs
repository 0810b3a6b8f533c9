//! End-to-end catalog build.
//!
//! Orchestrates: cache scan → extraction → observation table → wide table →
//! filter and projection → relation in the store.

use crate::builder::{BuildOptions, BuildReport, build_observations};
use crate::cache::EpubCache;
use crate::config::{CatalogConfig, ConfigResult};
use crate::error::{CatalogError, CatalogResult};
use crate::extract::Extractor;
use crate::filter::{CatalogFilter, CatalogTable};
use crate::model::{Field, Gid};
use crate::reshape::{WideTable, reshape_with_gids};
use crate::store::{CATALOG_RELATION, CatalogStore, Relation};

/// What a build publishes and how it extracts.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub build: BuildOptions,
    /// Projection of the published catalog; empty means the default columns.
    pub columns: Vec<Field>,
    /// Publish the wide table instead of the filtered catalog.
    pub unfiltered: bool,
}

/// Every intermediate table of one build.
#[derive(Debug, Clone)]
pub struct CatalogBuild {
    pub report: BuildReport,
    pub wide: WideTable,
    pub catalog: CatalogTable,
}

impl CatalogBuild {
    /// The relation to publish.
    pub fn relation(&self, unfiltered: bool) -> Relation {
        if unfiltered {
            Relation::from_wide(CATALOG_RELATION, &self.wide)
        } else {
            Relation::from_catalog(CATALOG_RELATION, &self.catalog)
        }
    }

    pub fn summary(&self) -> BuildSummary {
        BuildSummary {
            identifiers: self.report.extracted.len() + self.report.skipped.len(),
            observations: self.report.table.len(),
            wide_rows: self.wide.len(),
            catalog_rows: self.catalog.len(),
            skipped: self.report.skipped.clone(),
        }
    }
}

/// Counts reported after a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub identifiers: usize,
    pub observations: usize,
    pub wide_rows: usize,
    pub catalog_rows: usize,
    pub skipped: Vec<(Gid, String)>,
}

/// Extractor and filter compiled from one configuration.
pub struct CatalogPipeline {
    extractor: Extractor,
    filter: CatalogFilter,
}

impl CatalogPipeline {
    pub fn new(extractor: Extractor, filter: CatalogFilter) -> Self {
        Self { extractor, filter }
    }

    /// Compile the configured field table and filter, reading from `cache`.
    pub fn from_config(config: &CatalogConfig, cache: EpubCache) -> ConfigResult<Self> {
        Ok(Self::new(config.extractor(cache)?, config.catalog_filter()?))
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn filter(&self) -> &CatalogFilter {
        &self.filter
    }

    /// Identifiers present in the cache.
    pub fn cached_gids(&self) -> CatalogResult<Vec<Gid>> {
        let cache = self.extractor.cache();
        cache.gids().map_err(|e| CatalogError::CacheScan {
            path: cache.dir().display().to_string(),
            source: e,
        })
    }

    /// Build every table for `gids` without touching the store.
    pub fn run(&self, gids: &[Gid], options: &PipelineOptions) -> CatalogResult<CatalogBuild> {
        let report = build_observations(&self.extractor, gids, options.build)?;
        let wide = reshape_with_gids(
            &report.extracted,
            report.table.rows(),
            &self.extractor.table().fields(),
        );
        let catalog = self.filter.apply(&wide, &options.columns);
        Ok(CatalogBuild {
            report,
            wide,
            catalog,
        })
    }

    /// Build from every cached identifier and replace the stored catalog.
    pub fn publish(
        &self,
        store: &CatalogStore,
        options: &PipelineOptions,
    ) -> CatalogResult<BuildSummary> {
        let gids = self.cached_gids()?;
        tracing::info!(
            identifiers = gids.len(),
            parallel = options.build.parallel,
            "building catalog"
        );
        let build = self.run(&gids, options)?;
        store.replace(&build.relation(options.unfiltered))?;
        Ok(build.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FailurePolicy;
    use crate::error::ExtractError;
    use tempfile::TempDir;

    fn doc(title: &str, language: &str, format: &str) -> String {
        format!(
            r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                xmlns:dcterms="http://purl.org/dc/terms/"
                xmlns:pgterms="http://www.gutenberg.org/2009/pgterms/">
              <pgterms:ebook>
                <dcterms:title>{title}</dcterms:title>
                <dcterms:rights>Public domain in the USA.</dcterms:rights>
                <dcterms:language><rdf:Description><rdf:value>{language}</rdf:value></rdf:Description></dcterms:language>
                <dcterms:type><rdf:Description><rdf:value>Text</rdf:value></rdf:Description></dcterms:type>
                <dcterms:hasFormat><pgterms:file><dcterms:format><rdf:Description>
                  <rdf:value>{format}</rdf:value>
                </rdf:Description></dcterms:format></pgterms:file></dcterms:hasFormat>
              </pgterms:ebook>
            </rdf:RDF>"#
        )
    }

    fn pipeline_with(docs: &[(u64, String)]) -> (TempDir, CatalogPipeline) {
        let dir = TempDir::new().unwrap();
        let cache = EpubCache::in_archive_root(dir.path());
        for (id, body) in docs {
            let sub = cache.dir().join(id.to_string());
            std::fs::create_dir_all(&sub).unwrap();
            std::fs::write(sub.join(format!("pg{id}.rdf")), body).unwrap();
        }
        let pipeline = CatalogPipeline::from_config(&CatalogConfig::default(), cache).unwrap();
        (dir, pipeline)
    }

    #[test]
    fn filters_and_projects() {
        let (_dir, pipeline) = pipeline_with(&[
            (1, doc("Kept", "en", "text/plain; charset=utf-8")),
            (2, doc("French", "fr", "text/plain")),
            (3, doc("Html only", "en", "text/html")),
        ]);
        let gids = pipeline.cached_gids().unwrap();
        let build = pipeline.run(&gids, &PipelineOptions::default()).unwrap();

        assert_eq!(build.report.table.len(), 3 * 5);
        assert_eq!(build.wide.len(), 3);
        assert_eq!(build.catalog.len(), 1);
        let entry = build.catalog.get(Gid::new(1).unwrap()).unwrap();
        assert_eq!(entry.get(Field::Title), Some("KEPT"));
        assert_eq!(entry.get(Field::Creators), Some("None given"));
    }

    #[test]
    fn unfiltered_relation_carries_every_field() {
        let (_dir, pipeline) = pipeline_with(&[(7, doc("Wide", "de", "text/html"))]);
        let gids = pipeline.cached_gids().unwrap();
        let build = pipeline.run(&gids, &PipelineOptions::default()).unwrap();

        assert!(build.relation(false).is_empty());
        let wide = build.relation(true);
        assert_eq!(wide.columns().len(), Field::ALL.len());
        let row = wide.get(Gid::new(7).unwrap()).unwrap();
        let idx = wide.column_index("languages").unwrap();
        assert_eq!(row[idx], "DE");
        let idx = wide.column_index("subjects").unwrap();
        assert_eq!(row[idx], "NONE GIVEN");
    }

    #[test]
    fn record_without_fields_still_gets_a_wide_row() {
        let (_dir, pipeline) = pipeline_with(&[
            (1, doc("Titled", "en", "text/plain")),
            (
                2,
                r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"/>"#.to_string(),
            ),
        ]);
        let gids = pipeline.cached_gids().unwrap();
        let build = pipeline.run(&gids, &PipelineOptions::default()).unwrap();

        assert_eq!(build.report.extracted.len(), 2);
        assert_eq!(build.wide.len(), 2);
        let empty = build.wide.get(Gid::new(2).unwrap()).unwrap();
        assert!(Field::ALL.iter().all(|f| empty.is_none_given(*f)));
        assert_eq!(build.summary().wide_rows, build.report.extracted.len());
        assert_eq!(build.relation(true).len(), 2);
    }

    #[test]
    fn abort_stops_before_publishing() {
        let (dir, pipeline) = pipeline_with(&[
            (1, doc("Fine", "en", "text/plain")),
            (2, "<rdf:RDF>".to_string()),
        ]);
        let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();
        let err = pipeline
            .publish(&store, &PipelineOptions::default())
            .unwrap_err();
        assert!(matches!(err, CatalogError::Extract(ExtractError::Parse { .. })));
        assert!(store.load(CATALOG_RELATION).is_err());
    }

    #[test]
    fn skip_publishes_the_rest() {
        let (dir, pipeline) = pipeline_with(&[
            (1, doc("Fine", "en", "text/plain")),
            (2, "<rdf:RDF>".to_string()),
        ]);
        let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();
        let options = PipelineOptions {
            build: BuildOptions {
                policy: FailurePolicy::Skip,
                parallel: true,
            },
            ..Default::default()
        };
        let summary = pipeline.publish(&store, &options).unwrap();
        assert_eq!(summary.identifiers, 2);
        assert_eq!(summary.catalog_rows, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(store.load(CATALOG_RELATION).unwrap().len(), 1);
    }
}
