//! Operator CLI for retention cleanup.
//!
//! Deletes terminal jobs older than the retention window (rows and data
//! folders) and expired scrape-cache rows. `--dry-run` reports the same
//! counts without deleting anything.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use worker_core::store::{self, RetryPolicy};
use worker_core::{
    CleanupOptions, CleanupScope, PgCacheStore, PgJobManager, RetentionCleaner,
};

#[derive(Parser, Debug)]
#[command(name = "cleanup", about = "Delete old report jobs and expired cache entries")]
struct Args {
    /// Delete terminal jobs older than this many days
    #[arg(long, env = "CLEANUP_RETENTION_DAYS", default_value_t = 7)]
    retention_days: i64,

    /// Report what would be deleted without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Only sweep expired cache entries
    #[arg(long, conflicts_with = "jobs_only")]
    cache_only: bool,

    /// Only delete old jobs and their data folders
    #[arg(long, conflicts_with = "cache_only")]
    jobs_only: bool,
}

impl Args {
    fn scope(&self) -> CleanupScope {
        if self.cache_only {
            CleanupScope::CacheOnly
        } else if self.jobs_only {
            CleanupScope::JobsOnly
        } else {
            CleanupScope::All
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cleanup failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let _ = dotenvy::dotenv();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = store::connect(&database_url, &RetryPolicy::default()).await?;

    // Cache TTL only matters for writes; the sweep works off stored
    // expiry timestamps.
    let jobs = Arc::new(PgJobManager::new(pool.clone()));
    let cache = Arc::new(PgCacheStore::new(pool, 0));
    let cleaner = RetentionCleaner::new(jobs, cache);

    let report = cleaner
        .run(&CleanupOptions {
            retention_days: args.retention_days,
            dry_run: args.dry_run,
            scope: args.scope(),
        })
        .await?;

    let prefix = if report.dry_run { "[dry run] " } else { "" };
    println!("{prefix}jobs deleted:          {}", report.jobs_deleted);
    println!("{prefix}data folders removed:  {}", report.folders_deleted);
    println!("{prefix}bytes reclaimed:       {}", report.bytes_reclaimed);
    println!("{prefix}cache entries removed: {}", report.cache_entries_deleted);

    Ok(())
}
