//! newsdesk CLI
//!
//! Runs the crawl-to-notify pipeline against a local storage directory and
//! exposes the queue and published records for inspection.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use newsdesk::{
    error::Result,
    models::{Config, PublishStatus, chrono_seconds},
    pipeline::{self, PublishCoordinator, QueueManager},
    storage::{ArticleStore, Stores},
};

/// newsdesk - Broadcaster News Collector
#[derive(Parser, Debug)]
#[command(
    name = "newsdesk",
    version,
    about = "Collects broadcaster news, publishes it and notifies channels"
)]
struct Cli {
    /// Path to storage directory containing config.toml and the data files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl all sources, then process, publish and notify queued articles
    Run {
        /// Use in-memory stores and log-only channels
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Show queue counts and waiting entries
    Queue,

    /// List published records
    Published {
        /// Filter by status (published, archived, deleted)
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value_t = 0)]
        skip: usize,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Archive a published record
    Archive { id: String },

    /// Soft-delete a published record
    Delete { id: String },

    /// Return stale processing entries to the queue
    Requeue {
        /// Override pipeline.stale_after_secs
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path)?;
    log::debug!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Command::Run { dry_run, json } => {
            let (config, stores) = if dry_run {
                log::info!("Dry run: in-memory stores, log-only channels");
                (pipeline::dry_run_config(&config), Stores::memory())
            } else {
                (config, Stores::local(&cli.storage_dir).await?)
            };

            let orchestrator = pipeline::build_orchestrator(&config, stores)?;

            let cancel = orchestrator.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let report = orchestrator.run().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "Config OK ({} sources, {} channels)",
                config.sources.len(),
                config.channels.len()
            );
        }

        Command::Queue => {
            let stores = Stores::local(&cli.storage_dir).await?;
            log::info!("{:<10} {}", "articles", stores.articles.article_count().await?);
            let queue = QueueManager::new(stores.queue, config.pipeline.max_retries);

            for (status, count) in queue.counts().await? {
                log::info!("{:<10} {}", status, count);
            }
            for entry in queue.waiting().await? {
                println!(
                    "{}\tpriority={}\tretries={}\tenqueued={}",
                    entry.article_id,
                    entry.priority,
                    entry.retry_count,
                    entry.enqueued_at.to_rfc3339()
                );
            }
        }

        Command::Published {
            status,
            skip,
            limit,
        } => {
            let status = status
                .as_deref()
                .map(str::parse::<PublishStatus>)
                .transpose()?;
            let stores = Stores::local(&cli.storage_dir).await?;
            let publisher = PublishCoordinator::new(stores.published);

            for record in publisher.list(status, skip, limit).await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.id,
                    record.status,
                    record.article_id,
                    record.published_at.to_rfc3339()
                );
            }
        }

        Command::Archive { id } => {
            let stores = Stores::local(&cli.storage_dir).await?;
            let record = PublishCoordinator::new(stores.published).archive(&id).await?;
            log::info!("{} is now {}", record.id, record.status);
        }

        Command::Delete { id } => {
            let stores = Stores::local(&cli.storage_dir).await?;
            let record = PublishCoordinator::new(stores.published)
                .soft_delete(&id)
                .await?;
            log::info!("{} is now {}", record.id, record.status);
        }

        Command::Requeue { max_age_secs } => {
            let max_age = match max_age_secs {
                Some(secs) => chrono_seconds(secs)?,
                None => config.pipeline.stale_after()?,
            };
            let stores = Stores::local(&cli.storage_dir).await?;
            let queue = QueueManager::new(stores.queue, config.pipeline.max_retries);

            let sweep = queue.requeue_stale(max_age).await?;
            log::info!(
                "Requeued {} stale entries, failed {} past the retry cap",
                sweep.requeued,
                sweep.expired
            );
        }
    }

    Ok(())
}
