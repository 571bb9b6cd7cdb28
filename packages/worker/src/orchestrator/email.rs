//! Email delivery via the HTTP delivery service.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::collaborators::EmailSender;

#[derive(Serialize)]
struct EmailRequest<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Posts the report to the configured delivery endpoint. Success is a
/// 2xx response; everything else is a reported delivery failure.
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmailSender {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<bool> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmailRequest { to, subject, body })
            .send()
            .await?;

        Ok(response.status().is_success())
    }
}
