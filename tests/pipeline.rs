//! End-to-end catalog builds over a temporary cache and database.
//!
//! These tests lay out a cache the way the unpacked feed does, run the full
//! pipeline, and query the stored catalog.

use gutenberg_catalog::builder::{BuildOptions, FailurePolicy};
use gutenberg_catalog::cache::EpubCache;
use gutenberg_catalog::config::CatalogConfig;
use gutenberg_catalog::error::{CatalogError, ExtractError};
use gutenberg_catalog::model::{Field, Gid};
use gutenberg_catalog::pipeline::{CatalogPipeline, PipelineOptions};
use gutenberg_catalog::store::{CATALOG_RELATION, CatalogStore};

struct Work<'a> {
    id: u64,
    title: &'a str,
    creators: &'a [&'a str],
    subjects: &'a [&'a str],
    language: &'a str,
    rights: &'a str,
    formats: &'a [&'a str],
}

impl Work<'_> {
    fn rdf(&self) -> String {
        let values = |wrapper: &str, items: &[&str]| -> String {
            items
                .iter()
                .map(|v| {
                    format!(
                        "<dcterms:{wrapper}><rdf:Description rdf:nodeID=\"N\">\
                         <rdf:value>{v}</rdf:value></rdf:Description></dcterms:{wrapper}>"
                    )
                })
                .collect()
        };
        let creators: String = self
            .creators
            .iter()
            .map(|c| {
                format!(
                    "<dcterms:creator><pgterms:agent rdf:about=\"2009/agents/1\">\
                     <pgterms:name>{c}</pgterms:name></pgterms:agent></dcterms:creator>"
                )
            })
            .collect();
        let formats: String = self
            .formats
            .iter()
            .map(|f| {
                format!(
                    "<dcterms:hasFormat><pgterms:file rdf:about=\"f\"><dcterms:format>\
                     <rdf:Description rdf:nodeID=\"F\"><rdf:value>{f}</rdf:value>\
                     </rdf:Description></dcterms:format></pgterms:file></dcterms:hasFormat>"
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<rdf:RDF xml:base="http://www.gutenberg.org/"
  xmlns:dcterms="http://purl.org/dc/terms/"
  xmlns:pgterms="http://www.gutenberg.org/2009/pgterms/"
  xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
  xmlns:marcrel="http://id.loc.gov/vocabulary/relators/">
  <pgterms:ebook rdf:about="ebooks/{id}">
    <dcterms:title>{title}</dcterms:title>
    {creators}
    <dcterms:rights>{rights}</dcterms:rights>
    {language}
    <dcterms:type><rdf:Description rdf:nodeID="T"><rdf:value>Text</rdf:value></rdf:Description></dcterms:type>
    {subjects}
    {formats}
  </pgterms:ebook>
</rdf:RDF>"#,
            id = self.id,
            title = self.title,
            rights = self.rights,
            language = values("language", &[self.language]),
            subjects = values("subject", self.subjects),
        )
    }
}

const PUBLIC: &str = "Public domain in the USA.";

fn library() -> Vec<Work<'static>> {
    vec![
        Work {
            id: 1342,
            title: "Pride and Prejudice",
            creators: &["Austen, Jane"],
            subjects: &["Courtship -- Fiction", "England -- Fiction"],
            language: "en",
            rights: PUBLIC,
            formats: &["text/html", "text/plain; charset=utf-8"],
        },
        Work {
            id: 158,
            title: "Emma",
            creators: &["Austen, Jane"],
            subjects: &[],
            language: "en",
            rights: PUBLIC,
            formats: &["text/plain; charset=us-ascii"],
        },
        Work {
            id: 26,
            title: "Paradise Lost",
            creators: &["Milton, John"],
            subjects: &["Epic poetry, English"],
            language: "en",
            rights: PUBLIC,
            formats: &["text/plain"],
        },
        Work {
            id: 20,
            title: "Paradise Lost (illustrated)",
            creators: &["Milton, John", "Doré, Gustave"],
            subjects: &["Fall of man -- Poetry"],
            language: "en",
            rights: PUBLIC,
            formats: &["text/plain; charset=iso-8859-1", "application/epub+zip"],
        },
        Work {
            id: 17989,
            title: "Le comte de Monte-Cristo",
            creators: &["Dumas, Alexandre"],
            subjects: &["Adventure stories"],
            language: "fr",
            rights: PUBLIC,
            formats: &["text/plain; charset=utf-8"],
        },
        Work {
            id: 90000,
            title: "Copyrighted Work",
            creators: &["Someone, Recent"],
            subjects: &[],
            language: "en",
            rights: "Copyrighted. Read the copyright notice inside this book for details.",
            formats: &["text/plain"],
        },
        Work {
            id: 41,
            title: "Audio Only",
            creators: &["Irving, Washington"],
            subjects: &[],
            language: "en",
            rights: PUBLIC,
            formats: &["audio/mpeg"],
        },
    ]
}

fn gid(raw: u64) -> Gid {
    Gid::new(raw).unwrap()
}

fn populate(root: &std::path::Path, works: &[Work<'_>]) -> EpubCache {
    let cache = EpubCache::in_archive_root(root);
    for work in works {
        let dir = cache.dir().join(work.id.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("pg{}.rdf", work.id)), work.rdf()).unwrap();
    }
    cache
}

#[test]
fn builds_and_looks_up_by_creator() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = populate(dir.path(), &library());
    let pipeline = CatalogPipeline::from_config(&CatalogConfig::default(), cache).unwrap();
    let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();

    let summary = pipeline.publish(&store, &PipelineOptions::default()).unwrap();
    assert_eq!(summary.identifiers, 7);
    assert_eq!(summary.wide_rows, 7);
    assert_eq!(summary.catalog_rows, 4);
    assert!(summary.skipped.is_empty());

    let austen = store.lookup(CATALOG_RELATION, "AUSTEN%", "creators").unwrap();
    assert_eq!(austen, vec![gid(158), gid(1342)]);

    // Either creator of a joined cell matches a substring lookup.
    let milton = store.lookup(CATALOG_RELATION, "Milton, John", "creators").unwrap();
    assert_eq!(milton, vec![gid(20), gid(26)]);
    let dore = store.lookup(CATALOG_RELATION, "doré", "creators").unwrap();
    assert!(dore.is_empty(), "non-ASCII letters compare case-sensitively");
    let dore = store.lookup(CATALOG_RELATION, "DORÉ", "creators").unwrap();
    assert_eq!(dore, vec![gid(20)]);

    assert!(store.lookup(CATALOG_RELATION, "DUMAS%", "creators").unwrap().is_empty());
}

#[test]
fn stored_rows_use_default_projection() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = populate(dir.path(), &library());
    let pipeline = CatalogPipeline::from_config(&CatalogConfig::default(), cache).unwrap();
    let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();
    pipeline.publish(&store, &PipelineOptions::default()).unwrap();

    let catalog = store.load(CATALOG_RELATION).unwrap();
    assert_eq!(catalog.columns(), &["title", "creators", "subjects"]);
    assert_eq!(
        catalog.get(gid(1342)).unwrap(),
        &[
            "PRIDE AND PREJUDICE".to_string(),
            "AUSTEN, JANE".to_string(),
            "COURTSHIP -- FICTION\nENGLAND -- FICTION".to_string(),
        ]
    );
    assert_eq!(catalog.get(gid(158)).unwrap()[2], "None given");
    assert_eq!(catalog.get(gid(20)).unwrap()[1], "MILTON, JOHN\nDORÉ, GUSTAVE");
    assert!(catalog.get(gid(17989)).is_none());
    assert!(catalog.get(gid(90000)).is_none());
    assert!(catalog.get(gid(41)).is_none());
}

#[test]
fn rebuilding_is_idempotent() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = populate(dir.path(), &library());
    let pipeline = CatalogPipeline::from_config(&CatalogConfig::default(), cache).unwrap();
    let db = dir.path().join("data").join("catalog.redb");

    let first = {
        let store = CatalogStore::open(&db).unwrap();
        pipeline.publish(&store, &PipelineOptions::default()).unwrap();
        store.load(CATALOG_RELATION).unwrap()
    };
    let store = CatalogStore::open(&db).unwrap();
    let options = PipelineOptions {
        build: BuildOptions {
            parallel: false,
            ..Default::default()
        },
        ..Default::default()
    };
    pipeline.publish(&store, &options).unwrap();
    assert_eq!(store.load(CATALOG_RELATION).unwrap(), first);
}

#[test]
fn unfiltered_build_replaces_catalog_with_wide_table() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = populate(dir.path(), &library());
    let pipeline = CatalogPipeline::from_config(&CatalogConfig::default(), cache).unwrap();
    let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();

    pipeline.publish(&store, &PipelineOptions::default()).unwrap();
    let options = PipelineOptions {
        unfiltered: true,
        ..Default::default()
    };
    pipeline.publish(&store, &options).unwrap();

    let wide = store.load(CATALOG_RELATION).unwrap();
    assert_eq!(wide.len(), 7);
    assert_eq!(wide.columns().len(), Field::ALL.len());
    let french = store.lookup(CATALOG_RELATION, "FR", "languages").unwrap();
    assert_eq!(french, vec![gid(17989)]);
    let idx = wide.column_index("formats").unwrap();
    assert_eq!(
        wide.get(gid(20)).unwrap()[idx],
        "APPLICATION/EPUB+ZIP\nTEXT/PLAIN; CHARSET=ISO-8859-1"
    );
}

#[test]
fn custom_projection_and_language_from_config() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = populate(dir.path(), &library());
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
        [filter]
        language = "fr"
        columns = ["title", "languages"]
        "#,
    )
    .unwrap();
    let config = CatalogConfig::load(&config_path).unwrap();
    let pipeline = CatalogPipeline::from_config(&config, cache).unwrap();
    let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();
    let options = PipelineOptions {
        columns: config.filter.columns.clone(),
        ..Default::default()
    };
    pipeline.publish(&store, &options).unwrap();

    let catalog = store.load(CATALOG_RELATION).unwrap();
    assert_eq!(catalog.columns(), &["title", "languages"]);
    assert_eq!(catalog.len(), 1);
    assert_eq!(
        catalog.get(gid(17989)).unwrap(),
        &["LE COMTE DE MONTE-CRISTO".to_string(), "FR".to_string()]
    );
}

#[test]
fn failure_policy_decides_between_abort_and_skip() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = populate(dir.path(), &library());
    std::fs::write(cache.document_path(gid(26)), "<rdf:RDF><pgterms:ebook>").unwrap();
    // A record directory without its document.
    std::fs::create_dir_all(cache.dir().join("77")).unwrap();
    let pipeline = CatalogPipeline::from_config(&CatalogConfig::default(), cache).unwrap();
    let store = CatalogStore::open(&dir.path().join("catalog.redb")).unwrap();

    let err = pipeline
        .publish(&store, &PipelineOptions::default())
        .unwrap_err();
    assert!(matches!(err, CatalogError::Extract(ExtractError::Parse { .. })));
    assert!(store.load(CATALOG_RELATION).is_err());

    let options = PipelineOptions {
        build: BuildOptions {
            policy: FailurePolicy::Skip,
            parallel: true,
        },
        ..Default::default()
    };
    let summary = pipeline.publish(&store, &options).unwrap();
    assert_eq!(summary.identifiers, 8);
    assert_eq!(summary.catalog_rows, 3);
    let skipped: Vec<Gid> = summary.skipped.iter().map(|(g, _)| *g).collect();
    assert_eq!(skipped, vec![gid(26), gid(77)]);
    assert_eq!(summary.skipped[1].1, "missing");
}

#[test]
fn withdrawn_entries_are_ignored() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = populate(dir.path(), &library()[..2]);
    std::fs::create_dir_all(cache.dir().join("999_delete")).unwrap();
    let pipeline = CatalogPipeline::from_config(&CatalogConfig::default(), cache).unwrap();

    let gids = pipeline.cached_gids().unwrap();
    assert_eq!(gids, vec![gid(158), gid(1342)]);
}
