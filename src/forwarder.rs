//! Back-office delivery of completed applications
//!
//! With an endpoint configured, the archive is POSTed as base64 inside a
//! JSON body together with the metadata summary. Without one, the
//! submission is only logged and reported on the simulated channel.

use crate::runtime::{ArchiveHandle, DeliveryChannel, ForwardReceipt, Forwarder, SubmissionSummary};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Endpoint rejected submission with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Failed to read archive: {0}")]
    Archive(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ForwarderConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ForwardPayload<'a> {
    summary: &'a SubmissionSummary,
    archive_name: String,
    archive_size_bytes: u64,
    archive_base64: String,
}

/// Forwarder posting submissions to a webhook
pub struct WebhookForwarder {
    client: Client,
    config: ForwarderConfig,
}

impl WebhookForwarder {
    pub fn new(config: ForwarderConfig) -> Result<Self, ForwardError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn channel(&self) -> DeliveryChannel {
        if self.config.url.is_some() {
            DeliveryChannel::Direct
        } else {
            DeliveryChannel::Simulated
        }
    }

    async fn post(
        &self,
        url: &str,
        archive: &ArchiveHandle,
        summary: &SubmissionSummary,
    ) -> Result<(), ForwardError> {
        let bytes = tokio::fs::read(&archive.path).await?;
        let payload = ForwardPayload {
            summary,
            archive_name: archive_name(&archive.path),
            archive_size_bytes: archive.size_bytes,
            archive_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        };

        let mut request = self.client.post(url).json(&payload);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ForwardError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Forwarder for WebhookForwarder {
    async fn forward(
        &self,
        archive: &ArchiveHandle,
        summary: &SubmissionSummary,
    ) -> Result<ForwardReceipt, String> {
        let Some(url) = self.config.url.as_deref() else {
            tracing::info!(
                session_id = %summary.session_id,
                archive = %archive.path.display(),
                archive_size_bytes = archive.size_bytes,
                summary = %serde_json::to_string(summary).unwrap_or_default(),
                "No forwarding endpoint configured; submission logged only"
            );
            return Ok(ForwardReceipt {
                delivered: true,
                channel: DeliveryChannel::Simulated,
            });
        };

        self.post(url, archive, summary)
            .await
            .map_err(|e| e.to_string())?;
        Ok(ForwardReceipt {
            delivered: true,
            channel: DeliveryChannel::Direct,
        })
    }
}

fn archive_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| "submission.zip".to_string(), |n| n.to_string_lossy().into_owned())
}
