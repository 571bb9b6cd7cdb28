//! The workflow state machine that drives one job from `queued` to a
//! terminal state.
//!
//! Phases, in order: persist client data, resolve each competitor
//! (cache-first, then scrape with a bounded retry budget), run the market
//! analysis, email the report, finalize. Each phase's success increments
//! `completed_steps` and persists progress immediately. Error handling is
//! local and terminal per phase: once a phase's own retry budget is
//! exhausted the job fails, and failed jobs are never resumed — a failed
//! job must be resubmitted under a new job id.

mod analysis;
pub mod collaborators;
mod email;
mod scraper;
pub mod testing;

pub use analysis::SubprocessAnalyzer;
pub use collaborators::{Analyzer, EmailSender, ScrapeOutput, Scraper};
pub use email::HttpEmailSender;
pub use scraper::SubprocessScraper;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cache::{CacheStore, NewCacheEntry, ScrapeStatus};
use crate::jobs::{
    CompetitorStatus, CompetitorTask, CompetitorUpdate, Job, JobInput, JobManager, JobStatus,
};

/// The job fails outright the instant this many competitors have
/// permanently failed. Fixed regardless of competitor count; see the
/// policy discussion in DESIGN.md before changing it.
const COMPETITOR_ABORT_THRESHOLD: u32 = 2;

const ABORTED_TASK_REASON: &str = "job aborted due to multiple failures";

/// Orchestrator tuning. The pauses exist so tests can run the retry
/// paths without sleeping.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub scraper_max_retries: u32,
    pub email_max_retries: u32,
    pub scrape_retry_pause: Duration,
    pub email_retry_pause: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scraper_max_retries: 2,
            email_max_retries: 3,
            scrape_retry_pause: Duration::from_secs(2),
            email_retry_pause: Duration::from_secs(5),
        }
    }
}

/// Terminal result of one orchestration run. A `Failed` outcome is a
/// normal return: the failure has already been recorded on the job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
}

struct ClientArtifacts {
    inventory_path: PathBuf,
    tools_path: PathBuf,
}

struct CompetitorArtifacts {
    inventory_path: PathBuf,
    tools_path: PathBuf,
}

enum Resolution {
    Succeeded(CompetitorArtifacts),
    Failed,
}

pub struct JobOrchestrator {
    jobs: Arc<dyn JobManager>,
    cache: Arc<dyn CacheStore>,
    scraper: Arc<dyn Scraper>,
    analyzer: Arc<dyn Analyzer>,
    email: Arc<dyn EmailSender>,
    config: OrchestratorConfig,
}

impl JobOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobManager>,
        cache: Arc<dyn CacheStore>,
        scraper: Arc<dyn Scraper>,
        analyzer: Arc<dyn Analyzer>,
        email: Arc<dyn EmailSender>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            jobs,
            cache,
            scraper,
            analyzer,
            email,
            config,
        }
    }

    /// Drive the job to `completed` or `failed`.
    ///
    /// Returns `Err` only for infrastructure failures (store
    /// connectivity); every workflow failure is recorded on the job row
    /// and reported as `Ok(JobOutcome::Failed)`.
    pub async fn run(&self, job_id: &str) -> Result<JobOutcome> {
        let details = self.jobs.get(job_id).await?;
        let job = details.job;
        let competitors = details.competitors;

        self.jobs
            .set_status(job_id, JobStatus::Processing, Some("Starting"), None)
            .await?;

        // Phase 1: persist client data.
        self.jobs
            .set_status(job_id, JobStatus::Processing, Some("Saving client data"), None)
            .await?;

        let client = match self.save_client_data(&job).await {
            Ok(client) => client,
            Err(e) => return self.fail(job_id, format!("Client data error: {e:#}")).await,
        };

        let mut completed_steps = 1;
        self.jobs.set_progress(job_id, completed_steps).await?;

        // Phase 2: resolve competitors sequentially, in list order. The
        // scraper writes to fixed paths, so there is no intra-job
        // parallelism here by design.
        self.jobs
            .set_status(job_id, JobStatus::Processing, Some("Scraping competitors"), None)
            .await?;

        let mut successes: Vec<CompetitorArtifacts> = Vec::new();
        let mut failed_competitors: u32 = 0;

        for (index, task) in competitors.iter().enumerate() {
            match self.resolve_competitor(&job, task).await? {
                Resolution::Succeeded(artifacts) => successes.push(artifacts),
                Resolution::Failed => {
                    failed_competitors += 1;

                    if failed_competitors >= COMPETITOR_ABORT_THRESHOLD {
                        for remaining in &competitors[index + 1..] {
                            self.jobs
                                .set_competitor_status(
                                    job_id,
                                    &remaining.competitor_url,
                                    CompetitorStatus::Aborted,
                                    CompetitorUpdate::with_error(ABORTED_TASK_REASON),
                                )
                                .await?;
                        }
                        return self
                            .fail(
                                job_id,
                                format!(
                                    "aborting: {failed_competitors} competitors failed \
                                     (threshold: {COMPETITOR_ABORT_THRESHOLD})"
                                ),
                            )
                            .await;
                    }
                }
            }

            completed_steps += 1;
            self.jobs.set_progress(job_id, completed_steps).await?;
        }

        if successes.is_empty() {
            return self
                .fail(job_id, "no competitors scraped successfully".to_string())
                .await;
        }

        // Phase 3: market analysis over everything that succeeded.
        self.jobs
            .set_status(job_id, JobStatus::Processing, Some("Running analysis"), None)
            .await?;

        let mut inputs = vec![client.inventory_path.clone(), client.tools_path.clone()];
        for artifacts in &successes {
            inputs.push(artifacts.inventory_path.clone());
            inputs.push(artifacts.tools_path.clone());
        }

        let report_path = match self.analyzer.analyze(&inputs).await {
            Ok(output) => {
                let destination = Path::new(&job.data_folder)
                    .join(format!("analysis_{}.txt", Utc::now().timestamp()));
                if let Err(e) = move_file(&output, &destination).await {
                    return self.fail(job_id, format!("Analysis failed: {e:#}")).await;
                }
                destination
            }
            Err(e) => return self.fail(job_id, format!("Analysis failed: {e:#}")).await,
        };

        completed_steps += 1;
        self.jobs.set_progress(job_id, completed_steps).await?;

        // Phase 4: email the report.
        self.jobs
            .set_status(job_id, JobStatus::Processing, Some("Sending email"), None)
            .await?;

        if let Err(message) = self.send_report(&job, &report_path).await {
            return self.fail(job_id, message).await;
        }

        completed_steps += 1;
        self.jobs.set_progress(job_id, completed_steps).await?;

        // Phase 5: finalize. Here and only here the step count reaches
        // the total computed at creation.
        self.jobs
            .set_status(job_id, JobStatus::Completed, Some("Completed"), None)
            .await?;
        completed_steps += 1;
        self.jobs.set_progress(job_id, completed_steps).await?;

        info!(job_id = %job_id, "job completed");
        Ok(JobOutcome::Completed)
    }

    async fn fail(&self, job_id: &str, message: String) -> Result<JobOutcome> {
        warn!(job_id = %job_id, error = %message, "job failed");
        self.jobs
            .set_status(job_id, JobStatus::Failed, None, Some(&message))
            .await?;
        Ok(JobOutcome::Failed(message))
    }

    /// Phase 1: parse the metadata into typed input (migrating the legacy
    /// key shape) and write the client artifact files.
    async fn save_client_data(&self, job: &Job) -> Result<ClientArtifacts> {
        let input = JobInput::from_metadata(&job.metadata)?;

        let data_folder = Path::new(&job.data_folder);
        tokio::fs::create_dir_all(data_folder)
            .await
            .with_context(|| format!("failed to create {}", data_folder.display()))?;

        let timestamp = Utc::now().timestamp();
        let prefix = format!("client_{}_{timestamp}", sanitize_component(&job.client_name));
        let inventory_path = data_folder.join(format!("{prefix}_inventory.json"));
        let tools_path = data_folder.join(format!("{prefix}_tools.json"));

        tokio::fs::write(&inventory_path, &input.inventory_json)
            .await
            .context("failed to write client inventory")?;
        tokio::fs::write(&tools_path, &input.tools_json)
            .await
            .context("failed to write client tools")?;

        // Validate the payloads are well-formed JSON while counting.
        let vehicle_count = count_array_entries(&input.inventory_json)
            .context("client inventory is not valid JSON")?;
        let tools_count =
            count_array_entries(&input.tools_json).context("client tools is not valid JSON")?;
        info!(
            job_id = %job.job_id,
            vehicles = vehicle_count,
            tools = tools_count,
            "client data saved"
        );

        Ok(ClientArtifacts {
            inventory_path,
            tools_path,
        })
    }

    /// Phase 2, one competitor: cache-first, then scrape under the retry
    /// budget. Success updates the cache and the task row.
    async fn resolve_competitor(&self, job: &Job, task: &CompetitorTask) -> Result<Resolution> {
        let url = &task.competitor_url;

        if let Some(cached) = self.cache.get(url).await? {
            // The data folder a cached row points to may have been
            // removed by retention cleanup; verify before trusting it.
            if let (Some(inventory), Some(tools)) = (&cached.inventory_path, &cached.tools_path) {
                let inventory_exists = tokio::fs::try_exists(inventory).await.unwrap_or(false);
                let tools_exists = tokio::fs::try_exists(tools).await.unwrap_or(false);

                if inventory_exists && tools_exists {
                    info!(
                        url = %url,
                        last_scraped_at = %cached.last_scraped_at,
                        "cache hit"
                    );
                    self.jobs
                        .set_competitor_status(
                            &job.job_id,
                            url,
                            CompetitorStatus::Completed,
                            CompetitorUpdate::with_paths(inventory.clone(), tools.clone()),
                        )
                        .await?;
                    return Ok(Resolution::Succeeded(CompetitorArtifacts {
                        inventory_path: PathBuf::from(inventory),
                        tools_path: PathBuf::from(tools),
                    }));
                }
                warn!(url = %url, "cache hit but artifacts missing on disk, rescraping");
            }
        }

        let mut last_error = None;
        for attempt in 1..=self.config.scraper_max_retries {
            match self.scrape_competitor(job, task).await {
                Ok(artifacts) => {
                    self.jobs
                        .set_competitor_status(
                            &job.job_id,
                            url,
                            CompetitorStatus::Completed,
                            CompetitorUpdate::with_paths(
                                artifacts.inventory_path.display().to_string(),
                                artifacts.tools_path.display().to_string(),
                            ),
                        )
                        .await?;
                    return Ok(Resolution::Succeeded(artifacts));
                }
                Err(e) => {
                    warn!(
                        url = %url,
                        attempt,
                        max = self.config.scraper_max_retries,
                        error = %e,
                        "scrape attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < self.config.scraper_max_retries {
                        tokio::time::sleep(self.config.scrape_retry_pause).await;
                    }
                }
            }
        }

        let detail = last_error
            .map(|e| format!(": {e:#}"))
            .unwrap_or_default();
        self.jobs
            .set_competitor_status(
                &job.job_id,
                url,
                CompetitorStatus::Failed,
                CompetitorUpdate::with_error(format!(
                    "scraping failed after {} attempts{detail}",
                    self.config.scraper_max_retries
                )),
            )
            .await?;

        Ok(Resolution::Failed)
    }

    /// One scrape attempt: invoke the scraper, move its fixed-path output
    /// under the job's data folder, count, memoize.
    async fn scrape_competitor(
        &self,
        job: &Job,
        task: &CompetitorTask,
    ) -> Result<CompetitorArtifacts> {
        let output = self.scraper.scrape(&task.competitor_url).await?;

        let data_folder = Path::new(&job.data_folder);
        let prefix = format!(
            "{}_{}",
            sanitize_component(&task.competitor_name),
            Utc::now().timestamp()
        );
        let inventory_path = data_folder.join(format!("{prefix}_inventory.json"));
        let tools_path = data_folder.join(format!("{prefix}_tools.json"));

        move_file(&output.inventory_path, &inventory_path).await?;
        move_file(&output.tools_path, &tools_path).await?;

        let inventory_text = tokio::fs::read_to_string(&inventory_path).await?;
        let vehicle_count =
            count_array_entries(&inventory_text).context("scraped inventory is not valid JSON")?;
        let tools_text = tokio::fs::read_to_string(&tools_path).await?;
        let tools_count =
            count_present_tools(&tools_text).context("scraped tools is not valid JSON")?;

        self.cache
            .save(NewCacheEntry {
                url: task.competitor_url.clone(),
                dealership_name: task.competitor_name.clone(),
                inventory_path: inventory_path.display().to_string(),
                tools_path: tools_path.display().to_string(),
                vehicle_count,
                tools_count,
                status: ScrapeStatus::Success,
                error_message: None,
            })
            .await?;

        Ok(CompetitorArtifacts {
            inventory_path,
            tools_path,
        })
    }

    /// Phase 4: deliver the report, retrying under the email budget.
    /// Returns the failure message on exhaustion.
    async fn send_report(&self, job: &Job, report_path: &Path) -> std::result::Result<(), String> {
        let body = match tokio::fs::read_to_string(report_path).await {
            Ok(text) => text,
            Err(e) => return Err(format!("Email failed: report unreadable: {e}")),
        };
        let subject = format!("Market Analysis Report for {}", job.client_name);

        for attempt in 1..=self.config.email_max_retries {
            match self.email.send(&job.client_email, &subject, &body).await {
                Ok(true) => {
                    info!(job_id = %job.job_id, to = %job.client_email, "report emailed");
                    return Ok(());
                }
                Ok(false) => {
                    warn!(attempt, max = self.config.email_max_retries, "email delivery refused");
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max = self.config.email_max_retries,
                        error = %e,
                        "email attempt failed"
                    );
                }
            }
            if attempt < self.config.email_max_retries {
                tokio::time::sleep(self.config.email_retry_pause).await;
            }
        }

        Err(format!(
            "email delivery failed after {} attempts",
            self.config.email_max_retries
        ))
    }
}

/// Replace path-hostile characters so client/competitor names can be
/// used in artifact file names.
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Number of entries in a JSON array; zero for any other JSON shape.
fn count_array_entries(text: &str) -> Result<i32> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    Ok(value.as_array().map(|a| a.len() as i32).unwrap_or(0))
}

/// Count tools flagged present. Supports both the current `is_present`
/// and the legacy `isPresent` key.
fn count_present_tools(text: &str) -> Result<i32> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let Some(entries) = value.as_array() else {
        return Ok(0);
    };
    Ok(entries
        .iter()
        .filter(|t| {
            t.get("is_present")
                .or_else(|| t.get("isPresent"))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
        })
        .count() as i32)
}

/// Move a file across filesystems: copy, then best-effort remove of the
/// source.
async fn move_file(source: &Path, destination: &Path) -> Result<()> {
    tokio::fs::copy(source, destination)
        .await
        .with_context(|| {
            format!(
                "failed to move {} to {}",
                source.display(),
                destination.display()
            )
        })?;
    let _ = tokio::fs::remove_file(source).await;
    Ok(())
}
