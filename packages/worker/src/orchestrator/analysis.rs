//! Subprocess analysis collaborator.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::collaborators::Analyzer;

const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs the market comparison as a subprocess over a flat list of
/// artifact paths and expects a single report file in return.
pub struct SubprocessAnalyzer {
    command: String,
    output_file: PathBuf,
    timeout: Duration,
}

impl SubprocessAnalyzer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output_file: PathBuf::from("email.txt"),
            timeout: ANALYSIS_TIMEOUT,
        }
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Analyzer for SubprocessAnalyzer {
    async fn analyze(&self, inputs: &[PathBuf]) -> Result<PathBuf> {
        let mut parts = self.command.split_whitespace();
        let program = parts.next().context("analysis command is empty")?;

        let mut command = Command::new(program);
        command.args(parts).args(inputs);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("analysis timed out after {:?}", self.timeout))?
            .context("failed to spawn analysis")?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(stream = "stdout", "analysis: {line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!(stream = "stderr", "analysis: {line}");
        }

        if !output.status.success() {
            bail!("analysis exited with {}", output.status);
        }

        if !tokio::fs::try_exists(&self.output_file).await.unwrap_or(false) {
            bail!(
                "analysis produced no report at {}",
                self.output_file.display()
            );
        }

        Ok(self.output_file.clone())
    }
}
