//! External collaborator traits.
//!
//! The scraper, the analysis, and the email delivery are opaque external
//! operations: they either produce their artifacts or fail. All retry
//! policy lives in the orchestrator, never here.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

/// Artifacts produced by one successful scrape.
#[derive(Debug, Clone)]
pub struct ScrapeOutput {
    pub inventory_path: PathBuf,
    pub tools_path: PathBuf,
}

/// Scrapes one competitor site, producing inventory and tools artifacts.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapeOutput>;
}

/// Runs the market comparison over client and competitor artifact files,
/// in the order given: client inventory, client tools, then one
/// inventory/tools pair per competitor.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, inputs: &[PathBuf]) -> Result<PathBuf>;
}

/// Delivers the report. `Ok(false)` means the service reported a
/// delivery failure without erroring.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<bool>;
}
