//! Job manager trait and implementations.
//!
//! The `JobManager` trait abstracts job persistence and state transitions,
//! allowing different implementations for production and testing.
//! - Production: [`PgJobManager`] over an injected `PgPool`
//! - Testing: [`InMemoryJobManager`] for inspection without a database

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{CompetitorStatus, CompetitorTask, CompetitorUpdate, Job, JobError, JobStatus};

/// A job submission: everything needed to create the job row and its
/// pending competitor tasks.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: String,
    pub client_name: String,
    pub client_email: String,
    pub competitors: Vec<NewCompetitor>,
    pub data_folder: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NewCompetitor {
    pub url: String,
    pub name: String,
}

impl NewCompetitor {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }
}

/// A job together with its competitor tasks.
#[derive(Debug, Clone)]
pub struct JobDetails {
    pub job: Job,
    pub competitors: Vec<CompetitorTask>,
}

/// Trait for job persistence and state transitions.
#[async_trait]
pub trait JobManager: Send + Sync {
    /// Insert a job with computed `total_steps` and one pending competitor
    /// task per competitor. A duplicate `job_id` is a conflict.
    async fn create(&self, new_job: NewJob) -> Result<Job, JobError>;

    /// Fetch a job and its competitor tasks.
    async fn get(&self, job_id: &str) -> Result<JobDetails, JobError>;

    /// Transition job status. Always bumps `updated_at`; sets `started_at`
    /// once on the first transition into processing; sets `completed_at`
    /// on a terminal transition.
    async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        current_step: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), JobError>;

    /// Record step progress. The caller keeps `completed_steps` within
    /// `total_steps`; this is not enforced at the storage layer.
    async fn set_progress(&self, job_id: &str, completed_steps: i32) -> Result<(), JobError>;

    /// Update one competitor task. Path fields are preserve-on-null;
    /// `scraped_at` is set only when the status is completed.
    async fn set_competitor_status(
        &self,
        job_id: &str,
        competitor_url: &str,
        status: CompetitorStatus,
        update: CompetitorUpdate,
    ) -> Result<(), JobError>;

    /// Atomically claim the oldest queued job, moving it to processing.
    /// Returns None when the queue is empty. Exactly one worker wins a
    /// given job even with concurrent pollers.
    async fn claim_next_queued(&self) -> Result<Option<Job>, JobError>;

    /// Plain ordered read of queued jobs, oldest first.
    async fn list_queued(&self, limit: i64) -> Result<Vec<Job>, JobError>;

    /// Terminal jobs created before the cutoff (retention candidates).
    async fn list_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Job>, JobError>;

    /// Delete terminal jobs created before the cutoff; competitor rows
    /// go with them. Returns the number of jobs deleted.
    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, JobError>;
}

// ============================================================================
// Postgres implementation
// ============================================================================

const JOB_COLUMNS: &str = "job_id, client_name, client_email, status, total_steps, \
     completed_steps, progress_percentage, current_step, error_message, \
     created_at, updated_at, started_at, completed_at, data_folder, metadata";

/// Production job manager over Postgres.
pub struct PgJobManager {
    pool: PgPool,
}

impl PgJobManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_unique_violation(e: sqlx::Error, job_id: &str) -> JobError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            JobError::Conflict(job_id.to_string())
        }
        _ => JobError::Database(e),
    }
}

#[async_trait]
impl JobManager for PgJobManager {
    async fn create(&self, new_job: NewJob) -> Result<Job, JobError> {
        let total_steps = Job::total_steps_for(new_job.competitors.len());

        // Job row and competitor rows commit together so a job never
        // exists without its tasks.
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO jobs (job_id, client_name, client_email, status, total_steps, data_folder, metadata)
            VALUES ($1, $2, $3, 'queued', $4, $5, $6)
            RETURNING {JOB_COLUMNS}
            "#,
        ))
        .bind(&new_job.job_id)
        .bind(&new_job.client_name)
        .bind(&new_job.client_email)
        .bind(total_steps)
        .bind(&new_job.data_folder)
        .bind(&new_job.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, &new_job.job_id))?;

        for competitor in &new_job.competitors {
            sqlx::query(
                r#"
                INSERT INTO job_competitors (job_id, competitor_url, competitor_name, status)
                VALUES ($1, $2, $3, 'pending')
                "#,
            )
            .bind(&new_job.job_id)
            .bind(&competitor.url)
            .bind(&competitor.name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(job)
    }

    async fn get(&self, job_id: &str) -> Result<JobDetails, JobError> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        let competitors = sqlx::query_as::<_, CompetitorTask>(
            r#"
            SELECT id, job_id, competitor_url, competitor_name, status,
                   inventory_path, tools_path, error_message, scraped_at
            FROM job_competitors
            WHERE job_id = $1
            ORDER BY id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(JobDetails { job, competitors })
    }

    async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        current_step: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), JobError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = $2,
                current_step = COALESCE($3, current_step),
                error_message = COALESCE($4, error_message),
                started_at = CASE WHEN $2 = 'processing'
                                  THEN COALESCE(started_at, NOW())
                                  ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('completed', 'failed')
                                    THEN NOW()
                                    ELSE completed_at END,
                updated_at = NOW()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(current_step)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn set_progress(&self, job_id: &str, completed_steps: i32) -> Result<(), JobError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                completed_steps = $2,
                progress_percentage = ($2 * 100) / NULLIF(total_steps, 0),
                updated_at = NOW()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(completed_steps)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn set_competitor_status(
        &self,
        job_id: &str,
        competitor_url: &str,
        status: CompetitorStatus,
        update: CompetitorUpdate,
    ) -> Result<(), JobError> {
        sqlx::query(
            r#"
            UPDATE job_competitors SET
                status = $3,
                inventory_path = COALESCE($4, inventory_path),
                tools_path = COALESCE($5, tools_path),
                error_message = $6,
                scraped_at = CASE WHEN $3 = 'completed' THEN NOW() ELSE scraped_at END
            WHERE job_id = $1 AND competitor_url = $2
            "#,
        )
        .bind(job_id)
        .bind(competitor_url)
        .bind(status)
        .bind(&update.inventory_path)
        .bind(&update.tools_path)
        .bind(&update.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_next_queued(&self) -> Result<Option<Job>, JobError> {
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            WITH next_job AS (
                SELECT job_id
                FROM jobs
                WHERE status = 'queued'
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs SET
                status = 'processing',
                started_at = COALESCE(started_at, NOW()),
                updated_at = NOW()
            WHERE job_id IN (SELECT job_id FROM next_job)
            RETURNING {JOB_COLUMNS}
            "#,
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn list_queued(&self, limit: i64) -> Result<Vec<Job>, JobError> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status = 'queued'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn list_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Job>, JobError> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status IN ('completed', 'failed') AND created_at < $1
            ORDER BY created_at ASC
            "#,
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, JobError> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed') AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// In-memory implementation (testing)
// ============================================================================

/// Job manager backed by in-memory maps, for tests.
///
/// Mirrors the Postgres semantics: computed step totals, idempotent
/// `started_at`, preserve-on-null competitor paths, oldest-first claim.
pub struct InMemoryJobManager {
    jobs: RwLock<HashMap<String, Job>>,
    competitors: RwLock<Vec<CompetitorTask>>,
    insertion_order: RwLock<Vec<String>>,
    next_competitor_id: AtomicI64,
    progress_log: RwLock<Vec<(String, i32)>>,
}

impl Default for InMemoryJobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobManager {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            competitors: RwLock::new(Vec::new()),
            insertion_order: RwLock::new(Vec::new()),
            next_competitor_id: AtomicI64::new(1),
            progress_log: RwLock::new(Vec::new()),
        }
    }

    /// Every `completed_steps` value persisted for a job, in write order.
    pub fn progress_history(&self, job_id: &str) -> Vec<i32> {
        self.progress_log
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, steps)| *steps)
            .collect()
    }

    /// Rewrite a job's creation time (retention tests).
    pub fn set_created_at(&self, job_id: &str, created_at: DateTime<Utc>) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = jobs.get_mut(job_id) {
            job.created_at = created_at;
        }
    }

    /// Snapshot of all jobs, in insertion order.
    pub fn all_jobs(&self) -> Vec<Job> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let order = self.insertion_order.read().unwrap_or_else(|e| e.into_inner());
        order.iter().filter_map(|id| jobs.get(id).cloned()).collect()
    }
}

#[async_trait]
impl JobManager for InMemoryJobManager {
    async fn create(&self, new_job: NewJob) -> Result<Job, JobError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&new_job.job_id) {
            return Err(JobError::Conflict(new_job.job_id));
        }

        let now = Utc::now();
        let job = Job {
            job_id: new_job.job_id.clone(),
            client_name: new_job.client_name,
            client_email: new_job.client_email,
            status: JobStatus::Queued,
            total_steps: Job::total_steps_for(new_job.competitors.len()),
            completed_steps: 0,
            progress_percentage: None,
            current_step: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            data_folder: new_job.data_folder,
            metadata: new_job.metadata,
        };

        let mut competitors = self.competitors.write().unwrap_or_else(|e| e.into_inner());
        for competitor in &new_job.competitors {
            let id = self.next_competitor_id.fetch_add(1, Ordering::SeqCst);
            competitors.push(CompetitorTask {
                id,
                job_id: new_job.job_id.clone(),
                competitor_url: competitor.url.clone(),
                competitor_name: competitor.name.clone(),
                status: CompetitorStatus::Pending,
                inventory_path: None,
                tools_path: None,
                error_message: None,
                scraped_at: None,
            });
        }

        jobs.insert(new_job.job_id.clone(), job.clone());
        self.insertion_order
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(new_job.job_id);

        Ok(job)
    }

    async fn get(&self, job_id: &str) -> Result<JobDetails, JobError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        let competitors = self
            .competitors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect();

        Ok(JobDetails { job, competitors })
    }

    async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        current_step: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), JobError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        let now = Utc::now();
        job.status = status;
        job.updated_at = now;
        if let Some(step) = current_step {
            job.current_step = Some(step.to_string());
        }
        if let Some(message) = error_message {
            job.error_message = Some(message.to_string());
        }
        if status == JobStatus::Processing && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        if status.is_terminal() {
            job.completed_at = Some(now);
        }

        Ok(())
    }

    async fn set_progress(&self, job_id: &str, completed_steps: i32) -> Result<(), JobError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        job.completed_steps = completed_steps;
        job.progress_percentage = Job::progress(completed_steps, job.total_steps);
        job.updated_at = Utc::now();

        self.progress_log
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((job_id.to_string(), completed_steps));

        Ok(())
    }

    async fn set_competitor_status(
        &self,
        job_id: &str,
        competitor_url: &str,
        status: CompetitorStatus,
        update: CompetitorUpdate,
    ) -> Result<(), JobError> {
        let mut competitors = self.competitors.write().unwrap_or_else(|e| e.into_inner());
        for task in competitors.iter_mut() {
            if task.job_id == job_id && task.competitor_url == competitor_url {
                task.status = status;
                if update.inventory_path.is_some() {
                    task.inventory_path = update.inventory_path.clone();
                }
                if update.tools_path.is_some() {
                    task.tools_path = update.tools_path.clone();
                }
                task.error_message = update.error_message.clone();
                if status == CompetitorStatus::Completed {
                    task.scraped_at = Some(Utc::now());
                }
            }
        }

        Ok(())
    }

    async fn claim_next_queued(&self) -> Result<Option<Job>, JobError> {
        let order = self
            .insertion_order
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());

        for job_id in order {
            if let Some(job) = jobs.get_mut(&job_id) {
                if job.status == JobStatus::Queued {
                    let now = Utc::now();
                    job.status = JobStatus::Processing;
                    job.updated_at = now;
                    if job.started_at.is_none() {
                        job.started_at = Some(now);
                    }
                    return Ok(Some(job.clone()));
                }
            }
        }

        Ok(None)
    }

    async fn list_queued(&self, limit: i64) -> Result<Vec<Job>, JobError> {
        Ok(self
            .all_jobs()
            .into_iter()
            .filter(|j| j.status == JobStatus::Queued)
            .take(limit as usize)
            .collect())
    }

    async fn list_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Job>, JobError> {
        Ok(self
            .all_jobs()
            .into_iter()
            .filter(|j| j.status.is_terminal() && j.created_at < cutoff)
            .collect())
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, JobError> {
        let doomed: Vec<String> = self
            .all_jobs()
            .into_iter()
            .filter(|j| j.status.is_terminal() && j.created_at < cutoff)
            .map(|j| j.job_id)
            .collect();

        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let mut competitors = self.competitors.write().unwrap_or_else(|e| e.into_inner());
        let mut order = self.insertion_order.write().unwrap_or_else(|e| e.into_inner());

        for job_id in &doomed {
            jobs.remove(job_id);
            competitors.retain(|c| &c.job_id != job_id);
            order.retain(|id| id != job_id);
        }

        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_job(job_id: &str, competitor_count: usize) -> NewJob {
        let competitors = (0..competitor_count)
            .map(|i| NewCompetitor::new(format!("https://dealer{i}.example.com"), format!("Dealer {i}")))
            .collect();
        NewJob {
            job_id: job_id.to_string(),
            client_name: "Acme Motors".to_string(),
            client_email: "reports@acme.example.com".to_string(),
            competitors,
            data_folder: format!("data/jobs/{job_id}"),
            metadata: json!({ "inventory_json": "[]", "tools_json": "[]" }),
        }
    }

    #[tokio::test]
    async fn create_computes_total_steps_and_pending_competitors() {
        let manager = InMemoryJobManager::new();
        let job = manager.create(sample_job("job_a", 3)).await.unwrap();

        assert_eq!(job.total_steps, 7);
        assert_eq!(job.status, JobStatus::Queued);

        let details = manager.get("job_a").await.unwrap();
        assert_eq!(details.competitors.len(), 3);
        assert!(details
            .competitors
            .iter()
            .all(|c| c.status == CompetitorStatus::Pending));
    }

    #[tokio::test]
    async fn duplicate_job_id_is_a_conflict() {
        let manager = InMemoryJobManager::new();
        manager.create(sample_job("job_a", 1)).await.unwrap();

        let err = manager.create(sample_job("job_a", 1)).await.unwrap_err();
        assert!(matches!(err, JobError::Conflict(_)));
    }

    #[tokio::test]
    async fn started_at_is_set_once() {
        let manager = InMemoryJobManager::new();
        manager.create(sample_job("job_a", 1)).await.unwrap();

        manager
            .set_status("job_a", JobStatus::Processing, Some("Starting"), None)
            .await
            .unwrap();
        let first = manager.get("job_a").await.unwrap().job.started_at.unwrap();

        manager
            .set_status("job_a", JobStatus::Processing, Some("Scraping"), None)
            .await
            .unwrap();
        let second = manager.get("job_a").await.unwrap().job.started_at.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn terminal_transition_sets_completed_at() {
        let manager = InMemoryJobManager::new();
        manager.create(sample_job("job_a", 1)).await.unwrap();

        manager
            .set_status("job_a", JobStatus::Failed, None, Some("boom"))
            .await
            .unwrap();

        let job = manager.get("job_a").await.unwrap().job;
        assert!(job.completed_at.is_some());
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn claim_takes_oldest_queued_and_marks_processing() {
        let manager = InMemoryJobManager::new();
        manager.create(sample_job("job_first", 1)).await.unwrap();
        manager.create(sample_job("job_second", 1)).await.unwrap();

        let claimed = manager.claim_next_queued().await.unwrap().unwrap();
        assert_eq!(claimed.job_id, "job_first");
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(claimed.started_at.is_some());

        let next = manager.claim_next_queued().await.unwrap().unwrap();
        assert_eq!(next.job_id, "job_second");

        assert!(manager.claim_next_queued().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_queued_is_oldest_first_and_bounded() {
        let manager = InMemoryJobManager::new();
        manager.create(sample_job("job_first", 1)).await.unwrap();
        manager.create(sample_job("job_second", 1)).await.unwrap();
        manager.create(sample_job("job_third", 1)).await.unwrap();

        let queued = manager.list_queued(2).await.unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].job_id, "job_first");
        assert_eq!(queued[1].job_id, "job_second");

        // Claimed jobs drop out of the queue view.
        manager.claim_next_queued().await.unwrap().unwrap();
        let queued = manager.list_queued(10).await.unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].job_id, "job_second");
    }

    #[tokio::test]
    async fn progress_updates_percentage() {
        let manager = InMemoryJobManager::new();
        manager.create(sample_job("job_a", 3)).await.unwrap();

        manager.set_progress("job_a", 3).await.unwrap();
        let job = manager.get("job_a").await.unwrap().job;
        assert_eq!(job.completed_steps, 3);
        assert_eq!(job.progress_percentage, Some(42));
    }

    #[tokio::test]
    async fn competitor_paths_are_preserved_on_null() {
        let manager = InMemoryJobManager::new();
        manager.create(sample_job("job_a", 1)).await.unwrap();
        let url = "https://dealer0.example.com";

        manager
            .set_competitor_status(
                "job_a",
                url,
                CompetitorStatus::Completed,
                CompetitorUpdate::with_paths("inv.json", "tools.json"),
            )
            .await
            .unwrap();

        // A later update without paths must not clear them.
        manager
            .set_competitor_status(
                "job_a",
                url,
                CompetitorStatus::Failed,
                CompetitorUpdate::with_error("late failure"),
            )
            .await
            .unwrap();

        let task = manager.get("job_a").await.unwrap().competitors[0].clone();
        assert_eq!(task.inventory_path.as_deref(), Some("inv.json"));
        assert_eq!(task.tools_path.as_deref(), Some("tools.json"));
        assert_eq!(task.error_message.as_deref(), Some("late failure"));
    }

    #[tokio::test]
    async fn scraped_at_only_set_on_completed() {
        let manager = InMemoryJobManager::new();
        manager.create(sample_job("job_a", 1)).await.unwrap();
        let url = "https://dealer0.example.com";

        manager
            .set_competitor_status(
                "job_a",
                url,
                CompetitorStatus::Failed,
                CompetitorUpdate::with_error("no luck"),
            )
            .await
            .unwrap();
        assert!(manager.get("job_a").await.unwrap().competitors[0]
            .scraped_at
            .is_none());

        manager
            .set_competitor_status(
                "job_a",
                url,
                CompetitorStatus::Completed,
                CompetitorUpdate::with_paths("inv.json", "tools.json"),
            )
            .await
            .unwrap();
        assert!(manager.get("job_a").await.unwrap().competitors[0]
            .scraped_at
            .is_some());
    }

    #[tokio::test]
    async fn retention_listing_ignores_non_terminal_jobs() {
        let manager = InMemoryJobManager::new();
        manager.create(sample_job("job_old_done", 1)).await.unwrap();
        manager.create(sample_job("job_old_queued", 1)).await.unwrap();

        let old = Utc::now() - chrono::Duration::days(10);
        manager.set_created_at("job_old_done", old);
        manager.set_created_at("job_old_queued", old);
        manager
            .set_status("job_old_done", JobStatus::Completed, None, None)
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(7);
        let terminal = manager.list_terminal_before(cutoff).await.unwrap();
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].job_id, "job_old_done");

        let deleted = manager.delete_terminal_before(cutoff).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(manager.get("job_old_done").await.is_err());
        assert!(manager.get("job_old_queued").await.is_ok());
    }
}
