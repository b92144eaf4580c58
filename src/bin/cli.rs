//! SPIMEX bulletin loader CLI
//!
//! Local execution entry point for bulk loads, single dates and inspection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use spimex_loader::{
    error::{AppError, Result},
    models::{Config, RecordFilter, parse_date},
    pipeline::{self, BulletinIngestor},
    services::{BulletinExtractor, HttpListingSource, PageCache, PaginationLocator},
    storage::{MemoryStorage, PgStorage, TradingStore},
};

/// Loader for SPIMEX oil product trading bulletins
#[derive(Parser, Debug)]
#[command(
    name = "spimex-loader",
    version,
    about = "Locate, parse and store SPIMEX daily trading bulletins"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// PostgreSQL connection URL (overrides the config file)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load every date in a range
    Load {
        /// First date to load (YYYY-MM-DD)
        #[arg(long, value_parser = date_arg)]
        start: NaiveDate,

        /// Last date to load (YYYY-MM-DD, default: today)
        #[arg(long, value_parser = date_arg)]
        end: Option<NaiveDate>,

        /// Dates processed concurrently (default: ingest.max_concurrent)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Keep records in memory instead of writing to the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Load a single date
    Ingest {
        /// Date to load (YYYY-MM-DD)
        #[arg(long, value_parser = date_arg)]
        date: NaiveDate,

        /// Keep records in memory instead of writing to the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the most recent stored dates
    Dates {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Query stored records as JSON
    Records {
        /// First date, inclusive (YYYY-MM-DD)
        #[arg(long, value_parser = date_arg)]
        start: Option<NaiveDate>,

        /// Last date, inclusive (YYYY-MM-DD)
        #[arg(long, value_parser = date_arg)]
        end: Option<NaiveDate>,

        #[arg(long)]
        oil_id: Option<String>,

        #[arg(long)]
        delivery_basis_id: Option<String>,

        #[arg(long)]
        delivery_type_id: Option<String>,

        #[arg(long)]
        exchange_product_id: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration file
    Validate,
}

/// Parse a `YYYY-MM-DD` command line date.
fn date_arg(value: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(value).ok_or_else(|| format!("expected YYYY-MM-DD, got '{value}'"))
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Open the configured store, or an in-memory one for dry runs.
async fn open_store(
    config: &Config,
    database_url: Option<&str>,
    dry_run: bool,
) -> Result<Arc<dyn TradingStore>> {
    if dry_run {
        log::info!("Dry run: records are kept in memory only");
        return Ok(Arc::new(MemoryStorage::new()));
    }

    let url = database_url
        .or(config.database.url.as_deref())
        .ok_or_else(|| AppError::config("no database URL; pass --database-url or set DATABASE_URL"))?;

    Ok(Arc::new(PgStorage::connect(url, &config.database).await?))
}

/// Load the config file, falling back to defaults, and validate it.
fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path);
    config.validate()?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn build_ingestor(config: &Config, store: Arc<dyn TradingStore>) -> Result<BulletinIngestor> {
    let source = Arc::new(HttpListingSource::new(&config.http)?);
    let locator = PaginationLocator::new(&config.source, source, Arc::new(PageCache::new()))?;
    let extractor = BulletinExtractor::new(&config.ingest);
    Ok(BulletinIngestor::new(locator, extractor, store))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let database_url = cli.database_url.as_deref();

    match cli.command {
        Command::Load {
            start,
            end,
            concurrency,
            dry_run,
        } => {
            let config = load_config(&cli.config)?;
            let end = end.unwrap_or_else(|| Local::now().date_naive());
            let concurrency = concurrency.unwrap_or(config.ingest.max_concurrent);

            let store = open_store(&config, database_url, dry_run).await?;
            let ingestor = build_ingestor(&config, store)?;
            let report = pipeline::run_bulk(&ingestor, start, end, concurrency).await?;

            log::info!(
                "Load complete: {} records for {} dates",
                report.summary.records_written,
                report.summary.processed
            );
        }

        Command::Ingest { date, dry_run } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config, database_url, dry_run).await?;
            let ingestor = build_ingestor(&config, store)?;
            let outcome = ingestor.ingest(date).await;

            log::info!("{date}: {outcome}");
        }

        Command::Dates { limit } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config, database_url, false).await?;
            let dates = store.latest_dates(limit).await?;

            if dates.is_empty() {
                log::info!("No bulletins stored yet.");
            }
            for date in dates {
                println!("{date}");
            }
        }

        Command::Records {
            start,
            end,
            oil_id,
            delivery_basis_id,
            delivery_type_id,
            exchange_product_id,
            limit,
            output,
        } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config, database_url, false).await?;
            let filter = RecordFilter {
                start_date: start,
                end_date: end,
                exchange_product_id,
                oil_id,
                delivery_basis_id,
                delivery_type_id,
                limit,
            };

            match output {
                Some(path) => {
                    pipeline::export_records(store.as_ref(), &filter, &path).await?;
                }
                None => {
                    let rows = pipeline::query_records(store.as_ref(), &filter).await?;
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
        }

        Command::Validate => {
            pipeline::run_validate(&cli.config)?;
            log::info!("All validations passed!");
        }
    }

    log::info!("Done!");

    Ok(())
}
