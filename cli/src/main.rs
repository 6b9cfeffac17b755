//! restoquery CLI
//!
//! Finds the k nearest restaurants to a point, optionally filtered by cuisine,
//! and keeps a small persistent cache of recent answers.
//!
//! Commands:
//! - restoquery query [--lat 40.7 --lon -73.99] [--cuisine Italian] [-k 5]
//! - restoquery import restaurants.json
//! - restoquery cache list|clear
//! - restoquery cuisines
//! - restoquery status

use std::io::{self, BufRead, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use restoquery_core::config::home_dir;
use restoquery_core::{
    CacheBackend, CacheBackendKind, Config, DocumentStore, FileBackend, GeoPoint, QueryEngine,
    QueryOutcome, ResultCache, SearchRequest, SqliteStore, TableBackend,
};

mod prompt;

use prompt::Prompter;

#[derive(Parser)]
#[command(name = "restoquery")]
#[command(about = "Nearest restaurant lookup with a persistent result cache")]
#[command(version)]
struct Cli {
    /// Data directory (default: ~/.restoquery)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the nearest restaurants (prompts for anything not given)
    Query {
        /// Latitude of the search point
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude of the search point
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Only return this cuisine (case-insensitive)
        #[arg(long)]
        cuisine: Option<String>,

        /// Number of results
        #[arg(short)]
        k: Option<usize>,
    },

    /// Import restaurant documents (JSON array or JSON lines)
    Import {
        /// File to import
        file: PathBuf,
    },

    /// Result cache operations
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// List known cuisines by frequency
    Cuisines {
        /// Maximum cuisines to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show store and cache status
    Status,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List cached queries
    List,

    /// Remove every cached query
    Clear,
}

/// Default filter for a verbosity level.
fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "restoquery=warn",
        1 => "restoquery=info",
        _ => "restoquery=debug",
    }
}

/// `RUST_LOG` wins over `-v` when set.
fn init_logging(verbose: u8) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(default_directive(verbose)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn open_store(config: &Config, home: &Path) -> Result<SqliteStore> {
    let path = config.store_path(home);
    SqliteStore::open(&path).with_context(|| format!("Failed to open store at {:?}", path))
}

fn open_cache(config: &Config, home: &Path) -> Result<ResultCache<Box<dyn CacheBackend>>> {
    let path = config.cache_path(home);
    let backend: Box<dyn CacheBackend> = match config.cache.backend {
        CacheBackendKind::File => Box::new(FileBackend::new(path)),
        CacheBackendKind::Table => Box::new(
            TableBackend::open(&path)
                .with_context(|| format!("Failed to open cache table at {:?}", path))?,
        ),
    };
    Ok(ResultCache::new(backend)
        .with_capacity(config.cache.capacity)
        .with_tolerance(config.cache.tolerance))
}

fn coordinate<R: BufRead, W: Write>(
    given: Option<f64>,
    prompter: &mut Prompter<R, W>,
    question: &str,
    label: &str,
    range: RangeInclusive<f64>,
) -> Result<f64> {
    match given {
        Some(value) if range.contains(&value) => Ok(value),
        Some(value) => bail!(
            "{} {} is outside [{}, {}]",
            label,
            value,
            range.start(),
            range.end()
        ),
        None => prompter.number_in_range(question, label, range),
    }
}

fn print_outcome(outcome: &QueryOutcome) {
    if outcome.results.is_empty() {
        println!("\nNo restaurants found");
    } else {
        println!("\nThe {} nearest restaurants:", outcome.results.len());
        for (i, result) in outcome.results.iter().enumerate() {
            println!(
                "{:>2}. {:<30} - {:>8.2} km | {}",
                i + 1,
                result.name,
                result.distance_km,
                result.cuisine
            );
        }
    }
    println!(
        "\nSource: {} ({:.2} ms)",
        outcome.source.as_str(),
        outcome.elapsed.as_secs_f64() * 1000.0
    );
}

fn run_query(
    config: &Config,
    home: &Path,
    lat: Option<f64>,
    lon: Option<f64>,
    cuisine: Option<String>,
    k: Option<usize>,
) -> Result<()> {
    let input = &config.input;
    let interactive = lat.is_none() || lon.is_none();

    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());

    let latitude = coordinate(
        lat,
        &mut prompter,
        "\n- Enter your latitude (e.g. 40.71): ",
        "latitude",
        input.lat_min..=input.lat_max,
    )?;
    let longitude = coordinate(
        lon,
        &mut prompter,
        "\n- Enter your longitude (e.g. -74.0): ",
        "longitude",
        input.lon_min..=input.lon_max,
    )?;
    let cuisine = match cuisine {
        Some(c) => Some(c),
        None if interactive => prompter
            .optional_text("\n- Enter a cuisine to filter by (leave empty for any): ")?,
        None => None,
    };

    let store = open_store(config, home)?;
    let cache = open_cache(config, home)?;
    let mut engine = QueryEngine::new(store, cache);

    let request = SearchRequest {
        point: GeoPoint::new(latitude, longitude)?,
        k: k.unwrap_or(config.query.k),
        cuisine,
        fallback: config.query.fallback(),
    };
    let requested = request.cuisine.clone();
    let (plan, outcome) = engine.search(request).context("Query failed")?;

    if plan.fell_back {
        println!(
            "\nCuisine '{}' not found; showing all cuisines instead.",
            requested.as_deref().unwrap_or_default()
        );
    }
    print_outcome(&outcome);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let home = cli.home.unwrap_or_else(home_dir);
    let config = Config::load(&home).context("Failed to load configuration")?;

    match cli.command {
        Commands::Query {
            lat,
            lon,
            cuisine,
            k,
        } => run_query(&config, &home, lat, lon, cuisine, k)?,

        Commands::Import { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let mut store = open_store(&config, &home)?;
            let report = restoquery_core::import_str(&mut store, &content).context("Import failed")?;

            println!("Read: {}", report.read);
            println!("Upserted: {}", report.upserted);
            println!("Skipped: {}", report.skipped);
            println!("Store count: {}", report.store_count);
            if report.verified() {
                println!("Verified: record counts match");
            } else {
                println!(
                    "Warning: store holds {} records but the input had {} distinct ids",
                    report.store_count, report.distinct_ids
                );
            }
        }

        Commands::Cache { command } => {
            let mut cache = open_cache(&config, &home)?;
            match command {
                CacheCommands::List => {
                    let entries = cache.entries()?;
                    if entries.is_empty() {
                        println!("Cache is empty");
                    }
                    for entry in entries {
                        let point = entry.params.point();
                        println!(
                            "#{} ({:.4}, {:.4}) k={} cuisine={} -> {} results, {}",
                            entry.seq,
                            point.latitude(),
                            point.longitude(),
                            entry.params.k(),
                            entry.params.cuisine().unwrap_or("-"),
                            entry.results.len(),
                            entry.created_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
                CacheCommands::Clear => {
                    let dropped = cache.clear()?;
                    println!("Removed {} cached queries", dropped);
                }
            }
        }

        Commands::Cuisines { limit } => {
            let store = open_store(&config, &home)?;
            let cuisines = store.cuisines()?;
            if cuisines.is_empty() {
                println!("No cuisines found. Import data with 'restoquery import <file>'.");
            }
            for (cuisine, count) in cuisines.into_iter().take(limit) {
                println!("{:>6}  {}", count, cuisine);
            }
        }

        Commands::Status => {
            println!("restoquery status");
            println!("=================\n");
            println!("Home: {}", home.display());

            let store_path = config.store_path(&home);
            println!("\nStore: {}", store_path.display());
            match open_store(&config, &home).and_then(|s| Ok(s.count()?)) {
                Ok(count) => println!("  Restaurants: {}", count),
                Err(e) => println!("  Status: ✗ {}", e),
            }

            println!("\nCache: {}", config.cache_path(&home).display());
            let backend = match config.cache.backend {
                CacheBackendKind::File => "file",
                CacheBackendKind::Table => "table",
            };
            println!("  Backend: {}", backend);
            match open_cache(&config, &home).and_then(|mut c| Ok(c.len()?)) {
                Ok(len) => println!("  Entries: {} / {}", len, config.cache.capacity),
                Err(e) => println!("  Status: ✗ {}", e),
            }
            println!("  Tolerance: {}°", config.cache.tolerance);
        }
    }

    Ok(())
}
