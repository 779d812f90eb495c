mod config;
mod crawler;
mod db;
mod directory;
mod error;
mod fetch;
mod parser;
mod server;

use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::config::Config;
use crate::db::SqliteStore;
use crate::fetch::HttpSource;

#[derive(Parser)]
#[command(name = "omocoro_ingest", about = "Mirror omocoro.jp new posts and writers into SQLite")]
struct Cli {
    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    db: Option<String>,
    /// Site root to scrape (overrides OMOCORO_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Print run summaries as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Refresh writer profiles from the writer directory
    SyncWriters,
    /// Crawl the new-posts feed until it catches up with the store
    Crawl,
    /// Show row counts
    Stats,
    /// Serve the cron trigger endpoints
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let config = Config::from_env()?.with_overrides(cli.db, cli.base_url);

    let result = match cli.command {
        Commands::Init => {
            SqliteStore::open(&config.db_path)?;
            println!("Schema ready at {}", config.db_path);
            Ok(())
        }
        Commands::SyncWriters => {
            let store = SqliteStore::open(&config.db_path)?;
            let source = HttpSource::new()?;
            let pb = spinner("Syncing writer directory...")?;
            let summary = directory::sync_writers(&store, &source, &config.crawl).await;
            pb.finish_and_clear();
            let summary = summary.context("Writer directory sync failed")?;
            if cli.json {
                print_json(&summary)?;
            } else {
                println!("Synced {} writers.", summary.writer_count);
            }
            Ok(())
        }
        Commands::Crawl => {
            let store = SqliteStore::open(&config.db_path)?;
            let source = HttpSource::new()?;
            let pb = spinner("Crawling new posts...")?;
            let summary = crawler::crawl_new_posts(&store, &source, &config.crawl).await;
            pb.finish_and_clear();
            let summary = summary.context("New-post crawl failed")?;
            if cli.json {
                print_json(&summary)?;
            } else {
                println!(
                    "Done: {} articles saved, {} skipped, {} failed. Last page: {}.",
                    summary.articles_processed,
                    summary.articles_skipped,
                    summary.failed_article_count,
                    summary.last_processed_page,
                );
                if let crawler::StopReason::FetchFailed { page, error } = &summary.stop_reason {
                    println!("Stopped at page {}: {}", page, error);
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let store = SqliteStore::open(&config.db_path)?;
            let s = store.counts()?;
            println!("Articles:   {}", s.articles);
            println!("Writers:    {}", s.writers);
            println!("Categories: {}", s.categories);
            Ok(())
        }
        Commands::Serve => server::serve(config).await,
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 && !cli.json {
        println!("\nDone in {}", format_duration(elapsed));
    }

    match result {
        Err(err) if cli.json => {
            println!("{}", failure_json(err)?);
            std::process::exit(1);
        }
        other => other,
    }
}

fn spinner(msg: &'static str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn failure_json(err: anyhow::Error) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&server::Failure::from(err))?)
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
