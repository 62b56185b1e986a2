//! Notification dispatch results.

use serde::{Deserialize, Serialize};

/// Result of delivering one article to one channel. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationAttempt {
    pub article_id: String,
    pub channel: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationAttempt {
    pub fn delivered(article_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            article_id: article_id.into(),
            channel: channel.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(
        article_id: impl Into<String>,
        channel: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            article_id: article_id.into(),
            channel: channel.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}
