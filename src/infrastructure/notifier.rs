//! Operator notifications for failed runs
//!
//! Delivery is fire-and-forget: a notifier never reports failure to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::infrastructure::config::NotifierConfig;

pub const SUBJECT_PREFIX: &str = "Manual intervention required for";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, detail: &str);
}

/// Subject line used for a failed run of `source_name`.
pub fn failure_subject(source_name: &str) -> String {
    format!("{SUBJECT_PREFIX} {source_name}")
}

/// Writes notifications to the diagnostic log only
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, detail: &str) {
        error!(subject = %subject, "{}", detail);
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    detail: &'a str,
}

/// Posts `{subject, detail}` JSON to an operator webhook
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, detail: &str) {
        error!(subject = %subject, "{}", detail);

        let payload = WebhookPayload { subject, detail };
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Notification delivered to webhook");
            }
            Ok(response) => warn!("Webhook rejected notification: HTTP {}", response.status()),
            Err(e) => warn!("Failed to deliver notification: {}", e),
        }
    }
}

/// Webhook notifier when a URL is configured, log-only otherwise.
pub fn notifier_from_config(config: &NotifierConfig) -> Arc<dyn Notifier> {
    match config.webhook_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => match WebhookNotifier::new(url) {
            Ok(notifier) => Arc::new(notifier),
            Err(e) => {
                warn!("Webhook notifier unavailable, falling back to log: {}", e);
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    }
}
