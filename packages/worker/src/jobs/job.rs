//! Job model: one client report request, tracked through a fixed phase
//! sequence to a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Fixed per-job steps besides the competitors: save client data,
/// analysis, email, finalize.
const FIXED_STEPS: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "report_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states admit no further automatic transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub client_name: String,
    pub client_email: String,
    pub status: JobStatus,
    pub total_steps: i32,
    pub completed_steps: i32,
    pub progress_percentage: Option<i32>,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub data_folder: String,
    pub metadata: serde_json::Value,
}

impl Job {
    /// Step count for a job with the given competitor list length:
    /// save-client-data + one per competitor + analysis + email + finalize.
    pub fn total_steps_for(competitor_count: usize) -> i32 {
        FIXED_STEPS + competitor_count as i32
    }

    /// Integer progress percentage, or None when total is zero.
    pub fn progress(completed_steps: i32, total_steps: i32) -> Option<i32> {
        if total_steps == 0 {
            None
        } else {
            Some(completed_steps * 100 / total_steps)
        }
    }
}
