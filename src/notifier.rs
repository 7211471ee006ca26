//! Operator notifications
//!
//! Every notification is logged; when a webhook is configured it is also
//! posted as `{"text": ...}`. Delivery failures are logged and otherwise
//! ignored so a dead webhook never stalls a watcher.

use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::NotifierConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
    label: String,
}

impl Notifier {
    pub fn new(config: &NotifierConfig, label: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            webhook_url: config.webhook_url.clone(),
            label: label.into(),
        }
    }

    /// Log-only notifier
    pub fn disabled() -> Self {
        Self::new(&NotifierConfig::default(), "bonder")
    }

    pub async fn info(&self, message: &str) {
        self.notify(Level::Info, message).await
    }

    pub async fn warn(&self, message: &str) {
        self.notify(Level::Warn, message).await
    }

    pub async fn error(&self, message: &str) {
        self.notify(Level::Error, message).await
    }

    pub async fn notify(&self, level: Level, message: &str) {
        match level {
            Level::Info => info!(notify = true, "{}", message),
            Level::Warn => warn!(notify = true, "{}", message),
            Level::Error => error!(notify = true, "{}", message),
        }

        let Some(url) = &self.webhook_url else {
            return;
        };

        let text = format_message(&self.label, level, message);
        let result = self
            .client
            .post(url)
            .json(&WebhookMessage { text: &text })
            .send()
            .await
            .and_then(|r| r.error_for_status());

        if let Err(e) = result {
            warn!(error = %e, "Failed to deliver notification");
        }
    }
}

fn format_message(label: &str, level: Level, message: &str) -> String {
    format!("[{}] {}: {}", label, level.as_str(), message)
}
