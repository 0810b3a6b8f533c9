// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # gutenberg-catalog
//!
//! Builds a searchable catalog of Project Gutenberg works from the RDF
//! metadata feed.
//!
//! ## Architecture
//!
//! - **Extraction** (`extract`, `cache`): namespace-aware path queries over cached RDF records
//! - **Builder** (`builder`): long-form observation table, optionally extracted in parallel
//! - **Reshaping** (`reshape`): one wide row per work, multi-valued fields joined
//! - **Filter** (`filter`): English public-domain plain texts, projected to a few columns
//! - **Store** (`store`): relations in redb, with `LIKE`-style lookup
//! - **Fetch** (`fetch`): feed archive download and plain-text retrieval
//!
//! ## Library usage
//!
//! ```no_run
//! use gutenberg_catalog::config::CatalogConfig;
//! use gutenberg_catalog::paths::CatalogPaths;
//! use gutenberg_catalog::pipeline::{CatalogPipeline, PipelineOptions};
//! use gutenberg_catalog::store::{CatalogStore, CATALOG_RELATION};
//!
//! let paths = CatalogPaths::resolve().unwrap();
//! let config = CatalogConfig::default();
//! let pipeline = CatalogPipeline::from_config(&config, paths.epub_cache()).unwrap();
//! let store = CatalogStore::open(&paths.database_file()).unwrap();
//! pipeline.publish(&store, &PipelineOptions::default()).unwrap();
//! let austen = store.lookup(CATALOG_RELATION, "AUSTEN%", "creators").unwrap();
//! ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod filter;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod reshape;
pub mod store;
