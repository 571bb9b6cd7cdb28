//! Competitive-intelligence report worker for car dealerships.
//!
//! The worker drives client report jobs through a fixed phase sequence:
//! persist client data, scrape each competitor site (cached, retried),
//! run the market analysis, email the result. Jobs, their competitor
//! tasks, and the scrape cache live in Postgres; the scraper and the
//! analysis run as external processes.
//!
//! # Architecture
//!
//! ```text
//! WorkerLoop
//!     │
//!     ├─► JobManager.claim_next_queued() (FOR UPDATE SKIP LOCKED)
//!     ├─► JobOrchestrator.run(job)
//!     │       ├─► CacheStore (TTL-bounded scrape memoization)
//!     │       ├─► Scraper / Analyzer subprocesses
//!     │       └─► EmailSender (delivery service)
//!     └─► RetentionCleaner (at most once per day)
//! ```

pub mod cache;
pub mod cleanup;
pub mod config;
pub mod jobs;
pub mod orchestrator;
pub mod store;
pub mod worker;

pub use cache::{CacheEntry, CacheStore, InMemoryCacheStore, NewCacheEntry, PgCacheStore, ScrapeStatus};
pub use cleanup::{CleanupOptions, CleanupReport, CleanupScope, RetentionCleaner};
pub use config::Config;
pub use jobs::{
    CompetitorStatus, CompetitorTask, CompetitorUpdate, InMemoryJobManager, Job, JobDetails,
    JobError, JobInput, JobManager, JobStatus, NewCompetitor, NewJob, PgJobManager,
};
pub use orchestrator::{JobOrchestrator, JobOutcome, OrchestratorConfig};
pub use worker::{WorkerLoop, WorkerLoopConfig};
