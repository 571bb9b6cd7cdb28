//! Subprocess scraper collaborator.
//!
//! The scraper takes no CLI arguments; the target site is passed through
//! the `SCRAPER_DOMAIN` environment variable. It writes its output to
//! fixed, non-parameterized paths, which is why competitor resolution is
//! strictly sequential: two concurrent invocations would clobber each
//! other's artifacts.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::collaborators::{ScrapeOutput, Scraper};

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(3600);

pub struct SubprocessScraper {
    command: String,
    output_dir: PathBuf,
    timeout: Duration,
}

impl SubprocessScraper {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output_dir: PathBuf::from("output"),
            timeout: SCRAPE_TIMEOUT,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Scraper for SubprocessScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapeOutput> {
        let mut parts = self.command.split_whitespace();
        let program = parts.next().context("scraper command is empty")?;

        let mut command = Command::new(program);
        command.args(parts).env("SCRAPER_DOMAIN", url);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("scraper timed out after {:?}", self.timeout))?
            .context("failed to spawn scraper")?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(stream = "stdout", "scraper: {line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!(stream = "stderr", "scraper: {line}");
        }

        if !output.status.success() {
            bail!("scraper exited with {}", output.status);
        }

        // A zero exit without both artifacts is still a failure; the
        // scraper can die silently after a successful-looking run.
        let inventory_path = self.output_dir.join("inventory.json");
        let tools_path = self.output_dir.join("tools.json");

        if !tokio::fs::try_exists(&inventory_path).await.unwrap_or(false) {
            bail!(
                "scraper exited 0 but produced no inventory file at {}",
                inventory_path.display()
            );
        }
        if !tokio::fs::try_exists(&tools_path).await.unwrap_or(false) {
            bail!(
                "scraper exited 0 but produced no tools file at {}",
                tools_path.display()
            );
        }

        Ok(ScrapeOutput {
            inventory_path,
            tools_path,
        })
    }
}
