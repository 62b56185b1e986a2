//! Notification channel capability and the shipped channel kinds.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::{ArticleRecord, ChannelConfig, ChannelKind};

/// An outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name used in reports.
    fn channel(&self) -> &str;

    /// Render an article into this channel's message format.
    fn format(&self, article: &ArticleRecord) -> String;

    /// Deliver a formatted message. `Ok(false)` means the channel
    /// answered but rejected the message; `Err` is a transport failure.
    async fn send(&self, message: &str) -> Result<bool>;
}

/// Chat/webhook channel posting JSON over HTTP.
pub struct WebhookNotifier {
    name: String,
    kind: ChannelKind,
    url: String,
    template: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: &ChannelConfig, client: Client) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| AppError::config(format!("channel '{}' has no url", config.name)))?;
        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            url,
            template: config.template.clone(),
            client,
        })
    }

    fn payload(&self, message: &str) -> Value {
        match self.kind {
            ChannelKind::Discord => json!({ "content": message }),
            _ => json!({ "text": message }),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &str {
        &self.name
    }

    fn format(&self, article: &ArticleRecord) -> String {
        article.format(&self.template)
    }

    async fn send(&self, message: &str) -> Result<bool> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| AppError::delivery(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("Channel {} rejected message: HTTP {}", self.name, status);
        }
        Ok(status.is_success())
    }
}

/// Channel that writes messages to the log. Useful for dry runs and audits.
pub struct LogNotifier {
    name: String,
    template: String,
}

impl LogNotifier {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &str {
        &self.name
    }

    fn format(&self, article: &ArticleRecord) -> String {
        article.format(&self.template)
    }

    async fn send(&self, message: &str) -> Result<bool> {
        log::info!("[{}] {}", self.name, message.replace('\n', " | "));
        Ok(true)
    }
}

/// Build the notifier for a configured channel.
pub fn build_notifier(config: &ChannelConfig, client: &Client) -> Result<Arc<dyn Notifier>> {
    Ok(match config.kind {
        ChannelKind::Log => Arc::new(LogNotifier::new(&config.name, &config.template)),
        ChannelKind::Slack | ChannelKind::Discord | ChannelKind::Webhook => {
            Arc::new(WebhookNotifier::new(config, client.clone())?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(kind: ChannelKind, url: Option<&str>) -> ChannelConfig {
        ChannelConfig {
            name: "newsroom".to_string(),
            kind,
            url: url.map(str::to_string),
            template: "{title}".to_string(),
        }
    }

    #[test]
    fn test_payload_shape_per_kind() {
        let slack = WebhookNotifier::new(
            &channel(ChannelKind::Slack, Some("https://hooks.example.com/x")),
            Client::new(),
        )
        .unwrap();
        assert_eq!(slack.payload("hi"), json!({ "text": "hi" }));

        let discord = WebhookNotifier::new(
            &channel(ChannelKind::Discord, Some("https://discord.example.com/x")),
            Client::new(),
        )
        .unwrap();
        assert_eq!(discord.payload("hi"), json!({ "content": "hi" }));
    }

    #[test]
    fn test_webhook_requires_url() {
        assert!(WebhookNotifier::new(&channel(ChannelKind::Webhook, None), Client::new()).is_err());
    }

    #[tokio::test]
    async fn test_log_notifier_always_delivers() {
        let notifier = build_notifier(&channel(ChannelKind::Log, None), &Client::new()).unwrap();
        assert_eq!(notifier.channel(), "newsroom");
        assert!(notifier.send("hello").await.unwrap());
    }
}
