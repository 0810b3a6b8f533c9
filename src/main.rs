//! gutcat CLI: Project Gutenberg catalog builder.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use gutenberg_catalog::builder::{FailurePolicy, build_observations};
use gutenberg_catalog::cache::EpubCache;
use gutenberg_catalog::config::CatalogConfig;
use gutenberg_catalog::fetch::{FetchOutcome, Fetcher};
use gutenberg_catalog::model::{Field, Gid};
use gutenberg_catalog::paths::CatalogPaths;
use gutenberg_catalog::pipeline::{CatalogPipeline, PipelineOptions};
use gutenberg_catalog::store::{CATALOG_RELATION, CatalogStore};

#[derive(Parser)]
#[command(name = "gutcat", version, about = "Project Gutenberg catalog builder")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/gutenberg-catalog/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory the feed archive is unpacked into.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Catalog database file.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and unpack the RDF metadata feed.
    Fetch {
        /// Re-download even if the cache is populated.
        #[arg(long)]
        force: bool,
    },

    /// Build the catalog from the cache and store it.
    Build {
        /// Store every extracted field instead of the filtered catalog.
        #[arg(long)]
        unfiltered: bool,

        /// Columns of the stored catalog (comma-separated).
        #[arg(long, value_delimiter = ',')]
        columns: Vec<Field>,

        /// Leave out identifiers that cannot be extracted.
        #[arg(long)]
        skip_failures: bool,

        /// Extract on one thread.
        #[arg(long)]
        sequential: bool,
    },

    /// Delete the unpacked feed.
    Clean,

    /// List works whose field matches a pattern.
    Lookup {
        /// `LIKE` pattern (`%`, `_`); without wildcards, a substring.
        pattern: String,

        /// Column to match against.
        #[arg(long, default_value = "creators")]
        field: Field,

        /// Print titles alongside identifiers.
        #[arg(long)]
        titles: bool,

        /// Print JSON.
        #[arg(long)]
        json: bool,
    },

    /// Download the plain texts of matching works.
    Download {
        /// `LIKE` pattern (`%`, `_`); without wildcards, a substring.
        pattern: String,

        /// Output directory (default: `texts` under the data directory).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Column to match against.
        #[arg(long, default_value = "creators")]
        field: Field,
    },

    /// Show the most common plain-text format descriptors in the cache.
    Formats {
        /// Number of descriptors to show.
        #[arg(long, default_value = "20")]
        top: usize,
    },
}

/// Resolved locations and configuration for one invocation.
struct Context {
    paths: CatalogPaths,
    config: CatalogConfig,
    archive_root: PathBuf,
    database: PathBuf,
}

impl Context {
    fn resolve(cli: &Cli) -> Result<Self> {
        let paths = CatalogPaths::resolve()?;
        let config_file = cli.config.clone().unwrap_or_else(|| paths.config_file());
        let config = CatalogConfig::load_or_default(&config_file)?;
        let archive_root = cli.cache_dir.clone().unwrap_or_else(|| paths.archive_root());
        let database = cli.database.clone().unwrap_or_else(|| paths.database_file());
        Ok(Self {
            paths,
            config,
            archive_root,
            database,
        })
    }

    fn cache(&self) -> EpubCache {
        EpubCache::in_archive_root(&self.archive_root)
    }

    fn pipeline(&self) -> Result<CatalogPipeline> {
        Ok(CatalogPipeline::from_config(&self.config, self.cache())?)
    }
}

#[derive(Serialize)]
struct LookupHit {
    gid: Gid,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::resolve(&cli)?;

    match cli.command {
        Commands::Fetch { force } => {
            ctx.paths.ensure_dirs()?;
            let fetcher = Fetcher::new(&ctx.config);
            match fetcher.fetch_archive(&ctx.archive_root, &ctx.cache(), force)? {
                FetchOutcome::AlreadyCached => {
                    println!(
                        "Cache already populated at {} (use --force to re-download)",
                        ctx.cache().dir().display()
                    );
                }
                FetchOutcome::Unpacked { records } => {
                    println!("Unpacked {records} records into {}", ctx.cache().dir().display());
                }
            }
        }

        Commands::Build {
            unfiltered,
            columns,
            skip_failures,
            sequential,
        } => {
            ctx.paths.ensure_dirs()?;
            let mut build = ctx.config.build_options();
            if skip_failures {
                build.policy = FailurePolicy::Skip;
            }
            if sequential {
                build.parallel = false;
            }
            let options = PipelineOptions {
                build,
                columns: if columns.is_empty() {
                    ctx.config.filter.columns.clone()
                } else {
                    columns
                },
                unfiltered,
            };

            let pipeline = ctx.pipeline()?;
            let store = CatalogStore::open(&ctx.database)?;
            let summary = pipeline.publish(&store, &options)?;

            println!("Identifiers:  {}", summary.identifiers);
            println!("Observations: {}", summary.observations);
            println!("Works:        {}", summary.wide_rows);
            if unfiltered {
                println!("Stored all {} works (unfiltered)", summary.wide_rows);
            } else {
                println!("Catalog:      {}", summary.catalog_rows);
            }
            if !summary.skipped.is_empty() {
                println!("Skipped ({}):", summary.skipped.len());
                for (gid, reason) in &summary.skipped {
                    println!("  {gid}: {reason}");
                }
            }
            println!("Database: {}", ctx.database.display());
        }

        Commands::Clean => {
            let cache = ctx.cache();
            if cache.delete().into_diagnostic()? {
                println!("Deleted {}", cache.dir().display());
            } else {
                println!("Nothing to delete at {}", cache.dir().display());
            }
        }

        Commands::Lookup {
            pattern,
            field,
            titles,
            json,
        } => {
            let store = CatalogStore::open(&ctx.database)?;
            let gids = store.lookup(CATALOG_RELATION, &pattern, field.as_str())?;

            let title_idx = if titles {
                let columns = store.columns(CATALOG_RELATION)?;
                columns.iter().position(|c| c == Field::Title.as_str())
            } else {
                None
            };
            let mut hits = Vec::with_capacity(gids.len());
            for gid in gids {
                let title = match title_idx {
                    Some(idx) => store
                        .row(CATALOG_RELATION, gid)?
                        .and_then(|row| row.into_iter().nth(idx)),
                    None => None,
                };
                hits.push(LookupHit { gid, title });
            }

            if json {
                let out = serde_json::to_string_pretty(&hits).into_diagnostic()?;
                println!("{out}");
            } else if hits.is_empty() {
                println!("No works match \"{pattern}\" in {field}.");
            } else {
                for hit in &hits {
                    match &hit.title {
                        // Multi-valued titles print on one line.
                        Some(title) => println!("{}\t{}", hit.gid, title.replace('\n', " / ")),
                        None => println!("{}", hit.gid),
                    }
                }
            }
        }

        Commands::Download {
            pattern,
            out,
            field,
        } => {
            let store = CatalogStore::open(&ctx.database)?;
            let gids = store.lookup(CATALOG_RELATION, &pattern, field.as_str())?;
            if gids.is_empty() {
                miette::bail!("no works match \"{pattern}\" in {field}");
            }
            let out = out.unwrap_or_else(|| ctx.paths.texts_dir());
            let fetcher = Fetcher::new(&ctx.config);
            let files = fetcher.download_texts(&gids, &out)?;
            println!("Downloaded {} texts into {}", files.len(), out.display());
        }

        Commands::Formats { top } => {
            let pipeline = ctx.pipeline()?;
            let gids = pipeline.cached_gids()?;
            let mut options = ctx.config.build_options();
            options.policy = FailurePolicy::Skip;
            let report = build_observations(pipeline.extractor(), &gids, options)?;

            let recognized = pipeline.filter().formats();
            println!(
                "Recognized formats (v{}): {}",
                recognized.version,
                recognized.descriptors.join(", ")
            );
            let counts = report.table.value_counts(Field::Formats, Some("text/plain"));
            println!("Plain-text formats in the cache ({} distinct):", counts.len());
            for (value, count) in counts.iter().take(top) {
                println!("  {count:>8}  {value}");
            }
        }
    }

    Ok(())
}
