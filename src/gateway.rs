//! Outbound messaging gateway adapters
//!
//! `HttpGateway` speaks a WhatsApp-Cloud-style messaging API: text messages,
//! reply buttons for short option lists, list messages for longer ones, and
//! media downloads by reference. `LoggingGateway` only logs.

mod error;

pub use error::{GatewayError, GatewayErrorKind};

use crate::runtime::{FetchedAttachment, OutboundGateway};
use crate::state_machine::{AttachmentRef, ChoiceOption};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Reply buttons are limited to three per message
const MAX_BUTTONS: usize = 3;
const BUTTON_TITLE_MAX: usize = 20;
const ROW_TITLE_MAX: usize = 24;
const ROW_DESCRIPTION_MAX: usize = 72;
const LIST_BUTTON_LABEL: &str = "Choose";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Gateway backed by the messaging HTTP API
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_message(&self, payload: &Value) -> Result<(), GatewayError> {
        let request = self.client.post(self.url("messages")).json(payload);
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[async_trait]
impl OutboundGateway for HttpGateway {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), GatewayError> {
        self.post_message(&text_payload(recipient, body)).await
    }

    async fn send_choice_prompt(
        &self,
        recipient: &str,
        body: &str,
        options: &[ChoiceOption],
    ) -> Result<(), GatewayError> {
        self.post_message(&choice_payload(recipient, body, options)).await
    }

    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<FetchedAttachment, GatewayError> {
        let request = self
            .client
            .get(self.url(&format!("media/{}", attachment.reference)));
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map_or_else(|| "application/octet-stream".to_string(), |v| v.trim().to_string());
        let bytes = response.bytes().await?;

        Ok(FetchedAttachment {
            bytes: bytes.to_vec(),
            mime_type,
            file_name: attachment.file_name.clone(),
        })
    }
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> GatewayError {
    match status.as_u16() {
        404 | 410 => GatewayError::unavailable(format!("Media not found: {body}")),
        408 | 504 => GatewayError::timeout(format!("HTTP {status}: {body}")),
        500..=599 => GatewayError::network(format!("Server error {status}: {body}")),
        _ => GatewayError::rejected(format!("HTTP {status}: {body}")),
    }
}

fn text_payload(recipient: &str, body: &str) -> Value {
    json!({
        "to": recipient,
        "type": "text",
        "text": { "body": body },
    })
}

/// Buttons when the options fit, a single-section list otherwise
fn choice_payload(recipient: &str, body: &str, options: &[ChoiceOption]) -> Value {
    let interactive = if options.len() <= MAX_BUTTONS {
        let buttons: Vec<Value> = options
            .iter()
            .map(|o| {
                json!({
                    "type": "reply",
                    "reply": { "id": o.key, "title": truncate(&o.label, BUTTON_TITLE_MAX) },
                })
            })
            .collect();
        json!({
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": buttons },
        })
    } else {
        let rows: Vec<Value> = options
            .iter()
            .map(|o| {
                let mut row = json!({
                    "id": o.key,
                    "title": truncate(&o.label, ROW_TITLE_MAX),
                });
                if let Some(description) = &o.description {
                    row["description"] = Value::String(truncate(description, ROW_DESCRIPTION_MAX));
                }
                row
            })
            .collect();
        json!({
            "type": "list",
            "body": { "text": body },
            "action": {
                "button": LIST_BUTTON_LABEL,
                "sections": [{ "title": "Options", "rows": rows }],
            },
        })
    };

    json!({
        "to": recipient,
        "type": "interactive",
        "interactive": interactive,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Gateway used when no messaging API is configured
#[derive(Debug, Default)]
pub struct LoggingGateway;

#[async_trait]
impl OutboundGateway for LoggingGateway {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), GatewayError> {
        tracing::info!(recipient = %recipient, body = %body, "Outbound text (not delivered)");
        Ok(())
    }

    async fn send_choice_prompt(
        &self,
        recipient: &str,
        body: &str,
        options: &[ChoiceOption],
    ) -> Result<(), GatewayError> {
        let keys: Vec<&str> = options.iter().map(|o| o.key.as_str()).collect();
        tracing::info!(
            recipient = %recipient,
            body = %body,
            options = ?keys,
            "Outbound prompt (not delivered)"
        );
        Ok(())
    }

    async fn fetch_attachment(&self, attachment: &AttachmentRef) -> Result<FetchedAttachment, GatewayError> {
        Err(GatewayError::unavailable(format!(
            "cannot fetch media {} without a messaging API",
            attachment.reference
        )))
    }
}
