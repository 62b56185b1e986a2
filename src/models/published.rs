//! Published record lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::article::derive_id;

/// Published record state. `deleted` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Published,
    Archived,
    Deleted,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Published => "published",
            PublishStatus::Archived => "archived",
            PublishStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PublishStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "published" => Ok(PublishStatus::Published),
            "archived" => Ok(PublishStatus::Archived),
            "deleted" => Ok(PublishStatus::Deleted),
            _ => Err(AppError::validation(format!("unknown publish status '{s}'"))),
        }
    }
}

/// An article that completed processing successfully.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishedRecord {
    pub id: String,

    /// Back-reference to the article store
    pub article_id: String,

    pub status: PublishStatus,

    pub published_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    /// Optimistic concurrency token, bumped on every write
    #[serde(default)]
    pub version: u64,
}

impl PublishedRecord {
    /// Id of the published record for an article. One record per article.
    pub fn id_for(article_id: &str) -> String {
        derive_id(&["published", article_id])
    }

    pub fn new(article_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let article_id = article_id.into();
        Self {
            id: Self::id_for(&article_id),
            article_id,
            status: PublishStatus::Published,
            published_at: now,
            archived_at: None,
            deleted_at: None,
            version: 0,
        }
    }

    /// `published → archived`.
    pub fn archived(&self, now: DateTime<Utc>) -> Result<Self> {
        if self.status != PublishStatus::Published {
            return Err(self.invalid(PublishStatus::Archived));
        }
        Ok(Self {
            status: PublishStatus::Archived,
            archived_at: Some(now),
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// `published | archived → deleted`.
    pub fn deleted(&self, now: DateTime<Utc>) -> Result<Self> {
        if self.status == PublishStatus::Deleted {
            return Err(self.invalid(PublishStatus::Deleted));
        }
        Ok(Self {
            status: PublishStatus::Deleted,
            deleted_at: Some(now),
            version: self.version + 1,
            ..self.clone()
        })
    }

    fn invalid(&self, to: PublishStatus) -> AppError {
        AppError::transition("published record", &self.id, self.status, to)
    }
}
