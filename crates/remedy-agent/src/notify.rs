//! Notification collaborator and the error-details block appended to alerts.

use std::time::Duration;

use async_trait::async_trait;
use remedy_types::{RemedyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const DEFAULT_RECIPIENT: &str = "admin@example.com";

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns `true` only when the message was accepted for delivery.
    async fn send(&self, subject: &str, body: &str, recipients: &[String]) -> bool;
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    /// Endpoint of the HTTP mail relay.
    pub relay_url: String,
    pub sender: String,
    pub password: String,
    pub recipients: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            relay_url: String::new(),
            sender: String::new(),
            password: String::new(),
            recipients: vec![DEFAULT_RECIPIENT.to_string()],
        }
    }
}

// ---------------------------------------------------------------------------
// MailRelayNotifier
// ---------------------------------------------------------------------------

/// Posts `{from, to, subject, body}` to an HTTP mail relay.
#[derive(Debug)]
pub struct MailRelayNotifier {
    config: EmailConfig,
    client: reqwest::Client,
}

impl MailRelayNotifier {
    pub fn new(config: EmailConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemedyError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn deliver(&self, subject: &str, body: &str, recipients: &[String]) -> Result<()> {
        let mut request = self.client.post(&self.config.relay_url).json(&json!({
            "from": self.config.sender,
            "to": recipients,
            "subject": subject,
            "body": body,
        }));
        if !self.config.password.is_empty() {
            request = request.basic_auth(&self.config.sender, Some(&self.config.password));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| RemedyError::Notification(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(RemedyError::Notification(format!("relay returned {status}: {text}")))
        }
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    async fn send(&self, subject: &str, body: &str, recipients: &[String]) -> bool {
        if !self.config.enabled {
            tracing::warn!("Email notifications are disabled");
            return false;
        }
        if recipients.is_empty() {
            tracing::warn!("No recipients for notification");
            return false;
        }

        match self.deliver(subject, body, recipients).await {
            Ok(()) => {
                tracing::info!(recipients = %recipients.join(", "), subject, "Email sent");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, subject, "Email delivery failed");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Message formatting
// ---------------------------------------------------------------------------

/// Appends a titled key/value block to a message body.
pub fn format_error_details(details: &[(&str, &str)]) -> String {
    let mut out = String::from("\n\nDetailed Error Information:\n");
    out.push_str(&"-".repeat(40));
    out.push('\n');
    for (key, value) in details {
        out.push_str(&format!("{key}: {value}\n"));
    }
    out
}
