//! Job infrastructure: the job and competitor-task models, the versioned
//! client input, and the [`JobManager`] persistence trait with its
//! Postgres and in-memory implementations.

mod competitor;
mod input;
mod job;
pub mod manager;

pub use competitor::{CompetitorStatus, CompetitorTask, CompetitorUpdate};
pub use input::JobInput;
pub use job::{Job, JobStatus};
pub use manager::{
    InMemoryJobManager, JobDetails, JobManager, NewCompetitor, NewJob, PgJobManager,
};

use thiserror::Error;

/// Errors surfaced by job persistence and input validation.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job already exists: {0}")]
    Conflict(String),

    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
