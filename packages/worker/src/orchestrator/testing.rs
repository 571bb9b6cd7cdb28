//! Scripted collaborator fakes for orchestrator tests.
//!
//! Each fake records its invocations for later inspection and plays back
//! outcomes scripted per call.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::collaborators::{Analyzer, EmailSender, ScrapeOutput, Scraper};

/// One scripted scrape result.
pub enum ScrapeOutcome {
    /// Produce artifact files with the given JSON contents.
    Success {
        inventory_json: String,
        tools_json: String,
    },
    Failure(String),
}

/// Scraper that plays back scripted outcomes per URL, writing real
/// artifact files for successes so the orchestrator can move and count
/// them.
pub struct ScriptedScraper {
    dir: PathBuf,
    script: Mutex<HashMap<String, VecDeque<ScrapeOutcome>>>,
    calls: Mutex<Vec<String>>,
    counter: AtomicU64,
}

impl ScriptedScraper {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Queue the next outcome for a URL.
    pub fn push_outcome(&self, url: &str, outcome: ScrapeOutcome) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Scraper for ScriptedScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapeOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        let outcome = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        match outcome {
            Some(ScrapeOutcome::Success {
                inventory_json,
                tools_json,
            }) => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                let inventory_path = self.dir.join(format!("scrape_{n}_inventory.json"));
                let tools_path = self.dir.join(format!("scrape_{n}_tools.json"));
                tokio::fs::write(&inventory_path, inventory_json).await?;
                tokio::fs::write(&tools_path, tools_json).await?;
                Ok(ScrapeOutput {
                    inventory_path,
                    tools_path,
                })
            }
            Some(ScrapeOutcome::Failure(message)) => bail!(message),
            None => bail!("no scripted scrape outcome for {url}"),
        }
    }
}

/// Analyzer that writes a fixed report, or fails on demand.
pub struct ScriptedAnalyzer {
    dir: PathBuf,
    report_text: String,
    should_fail: std::sync::atomic::AtomicBool,
    calls: Mutex<Vec<Vec<PathBuf>>>,
    counter: AtomicU64,
}

impl ScriptedAnalyzer {
    pub fn new(dir: impl Into<PathBuf>, report_text: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            report_text: report_text.into(),
            should_fail: std::sync::atomic::AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Input path lists from every invocation.
    pub fn calls(&self) -> Vec<Vec<PathBuf>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, inputs: &[PathBuf]) -> Result<PathBuf> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(inputs.to_vec());

        if self.should_fail.load(Ordering::SeqCst) {
            bail!("analysis exited with exit status: 1");
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("report_{n}.txt"));
        tokio::fs::write(&path, &self.report_text).await?;
        Ok(path)
    }
}

/// Email sender that fails a configured number of times before
/// succeeding.
pub struct ScriptedEmailSender {
    failures_remaining: AtomicU32,
    attempts: AtomicU32,
    sent: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedEmailSender {
    pub fn always_succeeding() -> Self {
        Self::failing_times(0)
    }

    pub fn failing_times(failures: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// (to, subject, body) tuples for successful deliveries.
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EmailSender for ScriptedEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Ok(false);
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(true)
    }
}
