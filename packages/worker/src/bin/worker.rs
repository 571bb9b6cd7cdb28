//! Report worker entry point: connects, migrates, and polls for jobs
//! until interrupted.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use worker_core::orchestrator::{HttpEmailSender, SubprocessAnalyzer, SubprocessScraper};
use worker_core::store::{self, RetryPolicy};
use worker_core::{
    Config, JobOrchestrator, OrchestratorConfig, PgCacheStore, PgJobManager, RetentionCleaner,
    WorkerLoop, WorkerLoopConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = store::connect(&config.database_url, &RetryPolicy::default()).await?;
    store::run_migrations(&pool).await?;

    let jobs = Arc::new(PgJobManager::new(pool.clone()));
    let cache = Arc::new(PgCacheStore::new(pool, config.cache_ttl_days));

    let orchestrator = JobOrchestrator::new(
        jobs.clone(),
        cache.clone(),
        Arc::new(SubprocessScraper::new(&config.scraper_command)),
        Arc::new(SubprocessAnalyzer::new(&config.analysis_command)),
        Arc::new(HttpEmailSender::new(&config.email_endpoint)),
        OrchestratorConfig {
            scraper_max_retries: config.scraper_max_retries,
            email_max_retries: config.email_max_retries,
            ..Default::default()
        },
    );
    let cleaner = RetentionCleaner::new(jobs.clone(), cache);

    let worker = WorkerLoop::new(
        jobs,
        orchestrator,
        cleaner,
        WorkerLoopConfig {
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            retention_days: config.cleanup_retention_days,
            ..Default::default()
        },
    );

    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing in-flight job");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    worker.run().await;
    Ok(())
}
