//! Competitor task model: one competitor URL's scrape outcome within a job.
//! Rows are owned by the job and cascade-delete with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "competitor_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CompetitorStatus {
    Pending,
    Completed,
    Failed,
    /// Never attempted: the job hit the abort threshold first.
    Aborted,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorTask {
    pub id: i64,
    pub job_id: String,
    pub competitor_url: String,
    pub competitor_name: String,
    pub status: CompetitorStatus,
    pub inventory_path: Option<String>,
    pub tools_path: Option<String>,
    pub error_message: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
}

/// Status update for a competitor task. Path fields only overwrite the
/// stored values when supplied (preserve-on-null).
#[derive(Debug, Clone, Default)]
pub struct CompetitorUpdate {
    pub inventory_path: Option<String>,
    pub tools_path: Option<String>,
    pub error_message: Option<String>,
}

impl CompetitorUpdate {
    pub fn with_paths(inventory_path: impl Into<String>, tools_path: impl Into<String>) -> Self {
        Self {
            inventory_path: Some(inventory_path.into()),
            tools_path: Some(tools_path.into()),
            error_message: None,
        }
    }

    pub fn with_error(error_message: impl Into<String>) -> Self {
        Self {
            inventory_path: None,
            tools_path: None,
            error_message: Some(error_message.into()),
        }
    }
}
