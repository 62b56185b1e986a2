//! Crawler capability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::RawArticle;

/// A source of raw articles.
///
/// `fetch` retrieves the upstream payload and `parse` turns it into raw
/// records; the two are composed by [`crawl`], not by the implementor.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Retrieve the raw payload (HTML, JSON, feed XML...).
    async fn fetch(&self) -> Result<String>;

    /// Extract article records from a payload.
    fn parse(&self, payload: &str) -> Result<Vec<RawArticle>>;
}

/// Fetch and parse one source under a deadline.
///
/// Every failure, including the deadline expiring, is reported as a
/// `SourceFetch` error naming the source.
pub async fn crawl(
    source: &str,
    crawler: &dyn Crawler,
    timeout: Duration,
) -> Result<Vec<RawArticle>> {
    let payload = tokio::time::timeout(timeout, crawler.fetch())
        .await
        .map_err(|_| AppError::fetch(source, format!("timed out after {timeout:?}")))?
        .map_err(|e| as_fetch_error(source, e))?;

    crawler
        .parse(&payload)
        .map_err(|e| as_fetch_error(source, e))
}

fn as_fetch_error(source: &str, error: AppError) -> AppError {
    match error {
        AppError::SourceFetch { .. } => error,
        other => AppError::fetch(source, other),
    }
}
