//! Fan-out of one published article to every notification channel.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::models::{ArticleRecord, NotificationAttempt};
use crate::services::Notifier;

/// Sends one article to all channels concurrently.
///
/// Channels are independent: a failing, rejecting or slow channel only
/// produces a failed attempt for itself. Nothing here touches the stores.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// One attempt per channel, in channel order.
    pub async fn dispatch(
        &self,
        article: &ArticleRecord,
        notifiers: &[Arc<dyn Notifier>],
    ) -> Vec<NotificationAttempt> {
        let sends = notifiers.iter().map(|notifier| async move {
            let channel = notifier.channel();
            let message = notifier.format(article);

            match tokio::time::timeout(self.timeout, notifier.send(&message)).await {
                Ok(Ok(true)) => NotificationAttempt::delivered(&article.id, channel),
                Ok(Ok(false)) => {
                    NotificationAttempt::failed(&article.id, channel, "rejected by channel")
                }
                Ok(Err(e)) => {
                    log::warn!("Notification to {} failed for {}: {}", channel, article.id, e);
                    NotificationAttempt::failed(&article.id, channel, e.to_string())
                }
                Err(_) => {
                    log::warn!(
                        "Notification to {} timed out after {:?} for {}",
                        channel,
                        self.timeout,
                        article.id
                    );
                    NotificationAttempt::failed(&article.id, channel, "timed out")
                }
            }
        });

        join_all(sends).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    use crate::error::{AppError, Result};
    use crate::models::RawArticle;

    enum Behavior {
        Deliver,
        Reject,
        Error,
        Hang,
    }

    struct FakeChannel {
        name: &'static str,
        behavior: Behavior,
        sent: Mutex<Vec<String>>,
    }

    impl FakeChannel {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Notifier for FakeChannel {
        fn channel(&self) -> &str {
            self.name
        }

        fn format(&self, article: &ArticleRecord) -> String {
            article.format("{title}")
        }

        async fn send(&self, message: &str) -> Result<bool> {
            self.sent.lock().unwrap().push(message.to_string());
            match self.behavior {
                Behavior::Deliver => Ok(true),
                Behavior::Reject => Ok(false),
                Behavior::Error => Err(AppError::delivery(self.name, "connection refused")),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(true)
                }
            }
        }
    }

    fn article() -> ArticleRecord {
        let raw = RawArticle {
            title: "Headline".to_string(),
            url: "https://news.example.com/1001".to_string(),
            native_id: Some("1001".to_string()),
            ..RawArticle::default()
        };
        ArticleRecord::from_raw("kbs", raw, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let broken = FakeChannel::new("slack", Behavior::Error);
        let working = FakeChannel::new("discord", Behavior::Deliver);
        let notifiers: Vec<Arc<dyn Notifier>> = vec![broken.clone(), working.clone()];

        let attempts = NotificationDispatcher::new(Duration::from_secs(1))
            .dispatch(&article(), &notifiers)
            .await;

        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].channel, "slack");
        assert!(!attempts[0].success);
        assert!(attempts[0].error.is_some());
        assert_eq!(attempts[1].channel, "discord");
        assert!(attempts[1].success);
        assert_eq!(working.sent.lock().unwrap().as_slice(), ["Headline"]);
    }

    #[tokio::test]
    async fn test_rejection_and_timeout_are_failures() {
        let notifiers: Vec<Arc<dyn Notifier>> = vec![
            FakeChannel::new("rejecting", Behavior::Reject),
            FakeChannel::new("slow", Behavior::Hang),
        ];

        let attempts = NotificationDispatcher::new(Duration::from_millis(50))
            .dispatch(&article(), &notifiers)
            .await;

        assert!(attempts.iter().all(|a| !a.success));
        assert_eq!(attempts[0].error.as_deref(), Some("rejected by channel"));
        assert_eq!(attempts[1].error.as_deref(), Some("timed out"));
    }

    #[tokio::test]
    async fn test_no_channels() {
        let attempts = NotificationDispatcher::new(Duration::from_secs(1))
            .dispatch(&article(), &[])
            .await;
        assert!(attempts.is_empty());
    }
}
