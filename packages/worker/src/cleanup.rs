//! Retention cleanup: delete old terminal jobs (rows plus their data
//! folders) and expired cache rows.
//!
//! Runs in two places with the same code path: the worker loop invokes it
//! once a day, and the `cleanup` binary exposes it as an operator command
//! with dry-run support.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::jobs::JobManager;

/// What the cleaner touches on a given run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupScope {
    All,
    JobsOnly,
    CacheOnly,
}

#[derive(Debug, Clone)]
pub struct CleanupOptions {
    /// Terminal jobs created more than this many days ago are deleted.
    pub retention_days: i64,
    /// Report what would be deleted without mutating anything.
    pub dry_run: bool,
    pub scope: CleanupScope,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            retention_days: 7,
            dry_run: false,
            scope: CleanupScope::All,
        }
    }
}

/// Counts from one cleanup run. With `dry_run` set, these are the counts
/// that a real run would have produced.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub jobs_deleted: u64,
    pub folders_deleted: u64,
    pub bytes_reclaimed: u64,
    pub cache_entries_deleted: u64,
    pub dry_run: bool,
}

pub struct RetentionCleaner {
    jobs: Arc<dyn JobManager>,
    cache: Arc<dyn CacheStore>,
}

impl RetentionCleaner {
    pub fn new(jobs: Arc<dyn JobManager>, cache: Arc<dyn CacheStore>) -> Self {
        Self { jobs, cache }
    }

    /// Run one cleanup pass. Idempotent: a second run over the same data
    /// finds nothing left to delete.
    pub async fn run(&self, options: &CleanupOptions) -> Result<CleanupReport> {
        let mut report = CleanupReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        if options.scope != CleanupScope::CacheOnly {
            self.clean_jobs(options, &mut report).await?;
        }

        if options.scope != CleanupScope::JobsOnly {
            report.cache_entries_deleted = if options.dry_run {
                self.cache.count_expired().await?
            } else {
                self.cache.sweep_expired().await?
            };
        }

        info!(
            jobs_deleted = report.jobs_deleted,
            folders_deleted = report.folders_deleted,
            bytes_reclaimed = report.bytes_reclaimed,
            cache_entries_deleted = report.cache_entries_deleted,
            dry_run = report.dry_run,
            "cleanup pass finished"
        );
        Ok(report)
    }

    async fn clean_jobs(&self, options: &CleanupOptions, report: &mut CleanupReport) -> Result<()> {
        let cutoff = Utc::now() - Duration::days(options.retention_days);
        let candidates = self.jobs.list_terminal_before(cutoff).await?;

        for job in &candidates {
            let folder = Path::new(&job.data_folder);
            if !tokio::fs::try_exists(folder).await.unwrap_or(false) {
                continue;
            }

            // Size first: after removal there is nothing left to measure.
            match folder_size(folder).await {
                Ok(bytes) => report.bytes_reclaimed += bytes,
                Err(e) => warn!(job_id = %job.job_id, error = %e, "failed to size data folder"),
            }

            if options.dry_run {
                report.folders_deleted += 1;
            } else {
                match tokio::fs::remove_dir_all(folder).await {
                    Ok(()) => report.folders_deleted += 1,
                    Err(e) => {
                        warn!(job_id = %job.job_id, error = %e, "failed to remove data folder")
                    }
                }
            }
        }

        report.jobs_deleted = if options.dry_run {
            candidates.len() as u64
        } else {
            self.jobs.delete_terminal_before(cutoff).await?
        };

        Ok(())
    }
}

/// Total size in bytes of every file under a directory.
async fn folder_size(root: &Path) -> Result<u64> {
    let mut total = 0u64;
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to read {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                total += entry.metadata().await?.len();
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, InMemoryCacheStore, NewCacheEntry, ScrapeStatus};
    use crate::jobs::{InMemoryJobManager, JobStatus, NewCompetitor, NewJob};
    use serde_json::json;

    fn new_job(job_id: &str, data_folder: &str) -> NewJob {
        NewJob {
            job_id: job_id.to_string(),
            client_name: "Acme Motors".to_string(),
            client_email: "reports@acme.example.com".to_string(),
            competitors: vec![NewCompetitor::new("https://dealer.example.com", "Dealer")],
            data_folder: data_folder.to_string(),
            metadata: json!({ "inventory_json": "[]", "tools_json": "[]" }),
        }
    }

    fn expired_cache_row(url: &str) -> CacheEntry {
        CacheEntry {
            id: 7,
            url: url.to_string(),
            dealership_name: "Old Dealer".to_string(),
            last_scraped_at: Utc::now() - Duration::days(30),
            inventory_path: None,
            tools_path: None,
            vehicle_count: 0,
            tools_count: 0,
            status: ScrapeStatus::Success,
            error_message: None,
            cache_valid_until: Utc::now() - Duration::days(23),
        }
    }

    async fn aged_terminal_job(
        manager: &InMemoryJobManager,
        job_id: &str,
        folder: &Path,
        days_old: i64,
    ) {
        manager
            .create(new_job(job_id, &folder.display().to_string()))
            .await
            .unwrap();
        manager
            .set_status(job_id, JobStatus::Completed, None, None)
            .await
            .unwrap();
        manager.set_created_at(job_id, Utc::now() - Duration::days(days_old));
    }

    #[tokio::test]
    async fn old_terminal_job_loses_its_row_and_folder() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("job_old");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("inventory.json"), "[1,2,3]").unwrap();

        let jobs = Arc::new(InMemoryJobManager::new());
        let cache = Arc::new(InMemoryCacheStore::new(7));
        aged_terminal_job(&jobs, "job_old", &folder, 10).await;

        let cleaner = RetentionCleaner::new(jobs.clone(), cache);
        let report = cleaner.run(&CleanupOptions::default()).await.unwrap();

        assert_eq!(report.jobs_deleted, 1);
        assert_eq!(report.folders_deleted, 1);
        assert!(report.bytes_reclaimed > 0);
        assert!(!folder.exists());
        assert!(jobs.get("job_old").await.is_err());
    }

    #[tokio::test]
    async fn recent_and_non_terminal_jobs_survive() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = Arc::new(InMemoryJobManager::new());
        let cache = Arc::new(InMemoryCacheStore::new(7));

        let recent_folder = dir.path().join("job_recent");
        std::fs::create_dir_all(&recent_folder).unwrap();
        aged_terminal_job(&jobs, "job_recent", &recent_folder, 2).await;

        // Old but still queued: retention never touches running work.
        let queued_folder = dir.path().join("job_queued");
        std::fs::create_dir_all(&queued_folder).unwrap();
        jobs.create(new_job("job_queued", &queued_folder.display().to_string()))
            .await
            .unwrap();
        jobs.set_created_at("job_queued", Utc::now() - Duration::days(30));

        let cleaner = RetentionCleaner::new(jobs.clone(), cache);
        let report = cleaner.run(&CleanupOptions::default()).await.unwrap();

        assert_eq!(report.jobs_deleted, 0);
        assert!(recent_folder.exists());
        assert!(queued_folder.exists());
        assert!(jobs.get("job_recent").await.is_ok());
        assert!(jobs.get("job_queued").await.is_ok());
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("job_old");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("report.txt"), "hello").unwrap();

        let jobs = Arc::new(InMemoryJobManager::new());
        let cache = Arc::new(InMemoryCacheStore::new(7));
        aged_terminal_job(&jobs, "job_old", &folder, 10).await;
        cache.insert_raw(expired_cache_row("https://old.example.com"));

        let cleaner = RetentionCleaner::new(jobs.clone(), cache.clone());
        let options = CleanupOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = cleaner.run(&options).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.jobs_deleted, 1);
        assert_eq!(report.folders_deleted, 1);
        assert_eq!(report.bytes_reclaimed, 5);
        assert_eq!(report.cache_entries_deleted, 1);

        // Nothing actually changed.
        assert!(folder.exists());
        assert!(jobs.get("job_old").await.is_ok());
        assert!(cache.peek("https://old.example.com").is_some());
    }

    #[tokio::test]
    async fn cache_only_scope_leaves_jobs_alone() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("job_old");
        std::fs::create_dir_all(&folder).unwrap();

        let jobs = Arc::new(InMemoryJobManager::new());
        let cache = Arc::new(InMemoryCacheStore::new(7));
        aged_terminal_job(&jobs, "job_old", &folder, 10).await;
        cache.insert_raw(expired_cache_row("https://old.example.com"));

        let cleaner = RetentionCleaner::new(jobs.clone(), cache.clone());
        let options = CleanupOptions {
            scope: CleanupScope::CacheOnly,
            ..Default::default()
        };
        let report = cleaner.run(&options).await.unwrap();

        assert_eq!(report.jobs_deleted, 0);
        assert_eq!(report.cache_entries_deleted, 1);
        assert!(folder.exists());
        assert!(jobs.get("job_old").await.is_ok());
        assert!(cache.peek("https://old.example.com").is_none());
    }

    #[tokio::test]
    async fn jobs_only_scope_leaves_cache_alone() {
        let jobs = Arc::new(InMemoryJobManager::new());
        let cache = Arc::new(InMemoryCacheStore::new(7));
        cache.insert_raw(expired_cache_row("https://old.example.com"));

        let cleaner = RetentionCleaner::new(jobs, cache.clone());
        let options = CleanupOptions {
            scope: CleanupScope::JobsOnly,
            ..Default::default()
        };
        let report = cleaner.run(&options).await.unwrap();

        assert_eq!(report.cache_entries_deleted, 0);
        assert!(cache.peek("https://old.example.com").is_some());
    }

    #[tokio::test]
    async fn missing_data_folder_is_not_an_error() {
        let jobs = Arc::new(InMemoryJobManager::new());
        let cache = Arc::new(InMemoryCacheStore::new(7));
        aged_terminal_job(&jobs, "job_old", Path::new("/nonexistent/job_old"), 10).await;

        let cleaner = RetentionCleaner::new(jobs.clone(), cache);
        let report = cleaner.run(&CleanupOptions::default()).await.unwrap();

        assert_eq!(report.jobs_deleted, 1);
        assert_eq!(report.folders_deleted, 0);
        assert!(jobs.get("job_old").await.is_err());
    }
}
