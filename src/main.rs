//! CLI entry point for the document retrieval engine.
//!
//! Provides commands for building the index, searching it and inspecting
//! the metadata store. Main components: Cli parser, Commands enum and one
//! handler per command.

use anyhow::{Context, anyhow, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use docsift::display::{
    Status, THEME, TableBuilder, bar_reporter, create_cache_table, create_progress_bar,
    create_results_table, create_stats_table, with_spinner,
};
use docsift::storage::IndexManifest;
use docsift::vector::VectorDimension;
use docsift::{
    BuildOutcome, ExtractiveSummarizer, HashingEmbedder, HybridSearchEngine, IndexBuilder,
    IndexHandle, IndexPersistence, MetadataStore, PlainTextExtractor, Settings, logging,
};
use std::path::PathBuf;
use std::sync::Arc;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Local hybrid document retrieval
#[derive(Parser)]
#[command(
    name = "docsift",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local hybrid document retrieval",
    long_about = "Index local documents and search them with dense vectors, BM25 and cluster summaries fused into one ranking.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .docsift directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Index documents under one or more roots
    #[command(
        about = "Build the searchable index from document folders",
        after_help = "Examples:\n  docsift index ~/notes\n  docsift index ./docs ./papers --threads 8"
    )]
    Index {
        /// Files or directories to index
        #[arg(required = true, num_args = 1..)]
        roots: Vec<PathBuf>,

        /// Number of extraction threads (overrides config)
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Search the index
    #[command(
        about = "Hybrid search over the indexed documents",
        after_help = "Examples:\n  docsift search \"what is the red planet\"\n  docsift search \"Jupiter moons\" -k 3 --json"
    )]
    Search {
        /// Query text
        query: String,

        /// Number of results (defaults to search.default_top_k)
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index and store statistics
    #[command(about = "Display index manifest, file counts and cache statistics")]
    Stats,

    /// Manage the response cache
    #[command(about = "Inspect or clear the response cache")]
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show current configuration settings
    #[command(about = "Display the effective settings")]
    Config,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached response
    Clear,
    /// Show cache entry and hit counts
    Stats,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{}", THEME.status(Status::Failed, &format!("{e:#}")));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .map_err(|e| anyhow!("Configuration error loading {}: {e}", path.display()))?,
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        }),
    };
    settings.validate().map_err(|reason| anyhow!("Invalid configuration: {reason}"))?;
    logging::init(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force).map_err(|e| anyhow!("{e}"))?;
            println!(
                "{}",
                THEME.status(Status::Done, &format!("Created configuration file at {}", path.display()))
            );
            println!("Edit this file to customize your settings.");
            Ok(())
        }
        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Index { roots, threads } => {
            if let Some(threads) = threads {
                settings.indexing.extraction_threads = threads;
            }
            run_index(Arc::new(settings), &roots)
        }
        Commands::Search {
            query,
            top_k,
            json,
        } => run_search(&settings, &query, top_k, json),
        Commands::Stats => run_stats(&settings),
        Commands::Cache { action } => run_cache(&settings, action),
    }
}

fn open_store(settings: &Settings) -> anyhow::Result<MetadataStore> {
    MetadataStore::from_config(&settings.storage).with_context(|| {
        format!(
            "Failed to open metadata store at {}",
            settings.storage.database_path.display()
        )
    })
}

fn run_index(settings: Arc<Settings>, roots: &[PathBuf]) -> anyhow::Result<()> {
    let store = Arc::new(open_store(&settings)?);
    let dimension = VectorDimension::new(settings.embedding.dimension)?;
    let builder = IndexBuilder::new(
        settings.clone(),
        Arc::new(PlainTextExtractor::new(settings.indexing.max_file_size)),
        Arc::new(HashingEmbedder::new(dimension)),
        Arc::new(ExtractiveSummarizer),
        store,
    )?;

    let bar = create_progress_bar("Starting");
    let reporter = bar_reporter(bar.clone());

    match builder.build(roots, &reporter) {
        Ok(BuildOutcome::Built { index, stats }) => {
            bar.finish_with_message("Indexing complete");
            stats.display();
            println!(
                "\n{}",
                THEME.status(Status::Done, &format!(
                    "Index saved to {}",
                    THEME.apply(&THEME.path, builder.persistence().base_path().display())
                ))
            );
            tracing::debug!("{}", index.manifest.describe());
            Ok(())
        }
        Ok(BuildOutcome::Empty) => {
            bar.finish_and_clear();
            println!("{}", THEME.status(Status::Notice, "No indexable files found"));
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            eprintln!("{}", THEME.index_error(&e));
            std::process::exit(1);
        }
    }
}

fn run_search(
    settings: &Settings,
    query: &str,
    top_k: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let persistence = IndexPersistence::new(settings.index_path.clone());
    if !persistence.exists() {
        bail!(
            "No index found at {}\nSuggestion: Run 'docsift index <PATH>' first",
            persistence.base_path().display()
        );
    }

    let handle = IndexHandle::new();
    let index = with_spinner("Loading index", || persistence.load())?;
    handle.swap(index);
    let snapshot = handle.snapshot().context("index slot is empty")?;

    // Query vectors must match the dimension the index was built with
    let dimension = match snapshot.manifest.dimension {
        0 => snapshot.vectors.dimension(),
        d => VectorDimension::new(d as usize)?,
    };
    let store = match open_store(settings) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!("{e:#}");
            None
        }
    };

    let engine = HybridSearchEngine::new(
        snapshot,
        Arc::new(HashingEmbedder::new(dimension)),
        store,
        settings,
    );
    let results = engine.search(query, top_k.unwrap_or(settings.search.default_top_k))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("{}", THEME.status(Status::Notice, "No results"));
    } else {
        println!("{}", create_results_table(&results));
    }
    Ok(())
}

fn run_stats(settings: &Settings) -> anyhow::Result<()> {
    let persistence = IndexPersistence::new(settings.index_path.clone());
    let manifest_path = persistence.manifest_path();
    if !manifest_path.exists() {
        println!("{}", THEME.status(Status::Notice, "No index has been built yet"));
        return Ok(());
    }
    let manifest = IndexManifest::load(&manifest_path)?;
    let store = open_store(settings)?;

    println!("{}", THEME.apply(&THEME.header, manifest.describe()));
    println!(
        "{}",
        create_stats_table(
            &manifest,
            store.file_count()?,
            store.chunk_total()?,
            &store.cache_stats()?
        )
    );

    let recent = store.recent_searches(5)?;
    if !recent.is_empty() {
        let mut table = TableBuilder::new().set_headers(vec!["Recent query", "Results", "Time"]);
        for entry in recent {
            table = table.add_row(vec![
                entry.query,
                entry.result_count.to_string(),
                format!("{}ms", entry.execution_time_ms),
            ]);
        }
        println!("{}", table.build());
    }
    Ok(())
}

fn run_cache(settings: &Settings, action: CacheAction) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    match action {
        CacheAction::Clear => {
            let removed = store.clear_response_cache()?;
            println!(
                "{}",
                THEME.status(Status::Done, &format!("Removed {removed} cached responses"))
            );
        }
        CacheAction::Stats => {
            println!("{}", create_cache_table(&store.cache_stats()?));
        }
    }
    Ok(())
}
