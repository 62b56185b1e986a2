//! Article processing step.
//!
//! Runs between claiming a queue entry and publishing the article. An `Err`
//! marks the entry failed with the error text as the reason.

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{ArticleRecord, PipelineConfig};

/// The processing step applied to each claimed article.
#[async_trait]
pub trait ArticleProcessor: Send + Sync {
    async fn process(&self, article: &ArticleRecord) -> Result<()>;
}

/// Minimal editorial checks before an article is published.
#[derive(Debug, Clone, Default)]
pub struct ContentCheck {
    /// Minimum content length in characters, when content is required
    pub min_content_chars: Option<usize>,
}

impl ContentCheck {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            min_content_chars: config.min_content_chars,
        }
    }
}

#[async_trait]
impl ArticleProcessor for ContentCheck {
    async fn process(&self, article: &ArticleRecord) -> Result<()> {
        if article.title.trim().is_empty() {
            return Err(AppError::validation("title is empty"));
        }

        let url = url::Url::parse(&article.url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::validation(format!(
                "unsupported url scheme '{}'",
                url.scheme()
            )));
        }

        if let Some(min) = self.min_content_chars {
            let len = article
                .content
                .as_deref()
                .map_or(0, |c| c.trim().chars().count());
            if len < min {
                return Err(AppError::validation(format!(
                    "content too short ({len} < {min} chars)"
                )));
            }
        }
        Ok(())
    }
}
