//! Polling worker: claims queued jobs one at a time and drives each
//! through the orchestrator, with a daily retention cleanup pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cleanup::{CleanupOptions, RetentionCleaner};
use crate::jobs::{JobManager, JobStatus};
use crate::orchestrator::JobOrchestrator;

/// Pause after an unexpected loop error before polling again, so a
/// persistent store outage does not spin the loop.
const ERROR_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct WorkerLoopConfig {
    pub poll_interval: Duration,
    pub cleanup_interval: Duration,
    pub retention_days: i64,
}

impl Default for WorkerLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            retention_days: 7,
        }
    }
}

pub struct WorkerLoop {
    jobs: Arc<dyn JobManager>,
    orchestrator: JobOrchestrator,
    cleaner: RetentionCleaner,
    config: WorkerLoopConfig,
    worker_id: String,
    shutdown: Arc<AtomicBool>,
    // Cleanup scheduling is process-local on purpose: the pass is
    // idempotent, so overlapping runs from restarted or concurrent
    // workers only waste a query.
    last_cleanup: Mutex<Option<Instant>>,
}

impl WorkerLoop {
    pub fn new(
        jobs: Arc<dyn JobManager>,
        orchestrator: JobOrchestrator,
        cleaner: RetentionCleaner,
        config: WorkerLoopConfig,
    ) -> Self {
        Self {
            jobs,
            orchestrator,
            cleaner,
            config,
            worker_id: format!("worker_{}", Uuid::new_v4().simple()),
            shutdown: Arc::new(AtomicBool::new(false)),
            last_cleanup: Mutex::new(None),
        }
    }

    /// Flag for signal handlers; setting it stops the loop after the
    /// in-flight job finishes.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Poll until shutdown. Loop errors are logged and backed off, never
    /// propagated; a worker outlives transient store failures.
    pub async fn run(&self) {
        info!(worker_id = %self.worker_id, "worker started");

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.tick().await {
                Ok(true) => {} // keep draining the queue without pausing
                Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "worker loop error");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }

        info!(worker_id = %self.worker_id, "worker stopped");
    }

    /// One poll cycle: run cleanup when due, then claim and process at
    /// most one job. Returns whether a job was processed.
    pub async fn tick(&self) -> Result<bool> {
        if self.cleanup_due() {
            match self.cleaner.run(&self.cleanup_options()).await {
                Ok(report) => info!(
                    jobs_deleted = report.jobs_deleted,
                    cache_entries_deleted = report.cache_entries_deleted,
                    "scheduled cleanup finished"
                ),
                // A failed pass retries on the next due tick.
                Err(e) => warn!(error = %e, "scheduled cleanup failed"),
            }
        }

        let Some(job) = self.jobs.claim_next_queued().await? else {
            return Ok(false);
        };

        info!(worker_id = %self.worker_id, job_id = %job.job_id, "claimed job");

        if let Err(e) = self.orchestrator.run(&job.job_id).await {
            // Infrastructure failure mid-run: make sure the job does not
            // stay stuck in processing.
            error!(job_id = %job.job_id, error = %e, "orchestration error");
            self.jobs
                .set_status(
                    &job.job_id,
                    JobStatus::Failed,
                    None,
                    Some(&format!("Worker error: {e:#}")),
                )
                .await?;
        }

        Ok(true)
    }

    fn cleanup_options(&self) -> CleanupOptions {
        CleanupOptions {
            retention_days: self.config.retention_days,
            ..Default::default()
        }
    }

    /// Due on the first tick after startup and every `cleanup_interval`
    /// thereafter. Marks the pass as done up front so a failing store
    /// cannot turn every tick into a cleanup attempt.
    fn cleanup_due(&self) -> bool {
        let mut last = self.last_cleanup.lock().unwrap_or_else(|e| e.into_inner());
        let due = match *last {
            None => true,
            Some(at) => at.elapsed() >= self.config.cleanup_interval,
        };
        if due {
            *last = Some(Instant::now());
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::jobs::{InMemoryJobManager, NewCompetitor, NewJob};
    use crate::orchestrator::testing::{
        ScrapeOutcome, ScriptedAnalyzer, ScriptedEmailSender, ScriptedScraper,
    };
    use crate::orchestrator::OrchestratorConfig;
    use chrono::Utc;
    use serde_json::json;

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            scrape_retry_pause: Duration::ZERO,
            email_retry_pause: Duration::ZERO,
            ..Default::default()
        }
    }

    struct Harness {
        jobs: Arc<InMemoryJobManager>,
        scraper: Arc<ScriptedScraper>,
        worker: WorkerLoop,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let jobs = Arc::new(InMemoryJobManager::new());
        let cache = Arc::new(InMemoryCacheStore::new(7));
        let scraper = Arc::new(ScriptedScraper::new(dir.path()));
        let analyzer = Arc::new(ScriptedAnalyzer::new(dir.path(), "report body"));
        let email = Arc::new(ScriptedEmailSender::always_succeeding());

        let orchestrator = JobOrchestrator::new(
            jobs.clone(),
            cache.clone(),
            scraper.clone(),
            analyzer,
            email,
            fast_config(),
        );
        let cleaner = RetentionCleaner::new(jobs.clone(), cache);
        let worker = WorkerLoop::new(jobs.clone(), orchestrator, cleaner, WorkerLoopConfig::default());

        Harness {
            jobs,
            scraper,
            worker,
            _dir: dir,
        }
    }

    fn queued_job(dir: &std::path::Path, job_id: &str) -> NewJob {
        NewJob {
            job_id: job_id.to_string(),
            client_name: "Acme Motors".to_string(),
            client_email: "reports@acme.example.com".to_string(),
            competitors: vec![NewCompetitor::new("https://dealer.example.com", "Dealer")],
            data_folder: dir.join(job_id).display().to_string(),
            metadata: json!({ "inventory_json": "[]", "tools_json": "[]" }),
        }
    }

    #[tokio::test]
    async fn tick_is_idle_on_an_empty_queue() {
        let h = harness();
        assert!(!h.worker.tick().await.unwrap());
    }

    #[tokio::test]
    async fn tick_claims_and_completes_a_queued_job() {
        let h = harness();
        h.jobs
            .create(queued_job(h._dir.path(), "job_a"))
            .await
            .unwrap();
        h.scraper.push_outcome(
            "https://dealer.example.com",
            ScrapeOutcome::Success {
                inventory_json: "[{}]".to_string(),
                tools_json: "[]".to_string(),
            },
        );

        assert!(h.worker.tick().await.unwrap());

        let job = h.jobs.get("job_a").await.unwrap().job;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_steps, job.total_steps);
        assert_eq!(job.progress_percentage, Some(100));
    }

    #[tokio::test]
    async fn cleanup_runs_on_the_first_tick_then_waits_for_the_interval() {
        let h = harness();

        // Aged-out terminal job that the first tick's cleanup removes.
        h.jobs
            .create(queued_job(h._dir.path(), "job_old"))
            .await
            .unwrap();
        h.jobs
            .set_status("job_old", JobStatus::Completed, None, None)
            .await
            .unwrap();
        h.jobs
            .set_created_at("job_old", Utc::now() - chrono::Duration::days(10));

        h.worker.tick().await.unwrap();
        assert!(h.jobs.get("job_old").await.is_err());

        // Within the interval the next pass does not run.
        assert!(!h.worker.cleanup_due());
    }

    #[tokio::test]
    async fn failed_jobs_stay_claimed_and_terminal() {
        let h = harness();
        h.jobs
            .create(queued_job(h._dir.path(), "job_a"))
            .await
            .unwrap();
        // No scripted outcome: every scrape attempt fails, and with a
        // single competitor the job ends with nothing to analyze.

        assert!(h.worker.tick().await.unwrap());

        let job = h.jobs.get("job_a").await.unwrap().job;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(!h.worker.tick().await.unwrap(), "job must not be re-claimed");
    }
}
