//! Source tag to crawler mapping.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::Crawler;

/// Registered crawlers, kept in registration order.
///
/// Registering a tag that already exists replaces its crawler (last write
/// wins) but keeps the tag's original position, so iteration order only
/// depends on the first registration of each tag.
#[derive(Default, Clone)]
pub struct CrawlerRegistry {
    entries: Vec<(String, Arc<dyn Crawler>)>,
}

impl CrawlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `source` with a crawler, replacing any previous one.
    pub fn register(&mut self, source: impl Into<String>, crawler: Arc<dyn Crawler>) {
        let source = source.into();
        match self.entries.iter_mut().find(|(tag, _)| *tag == source) {
            Some(entry) => {
                log::debug!("Replacing crawler for source {}", source);
                entry.1 = crawler;
            }
            None => self.entries.push((source, crawler)),
        }
    }

    /// Look up the crawler for a source.
    pub fn get(&self, source: &str) -> Result<Arc<dyn Crawler>> {
        self.entries
            .iter()
            .find(|(tag, _)| tag == source)
            .map(|(_, crawler)| Arc::clone(crawler))
            .ok_or_else(|| AppError::UnknownSource(source.to_string()))
    }

    /// Source tags in registration order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(tag, _)| tag.as_str())
    }

    /// `(source, crawler)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Crawler>)> {
        self.entries.iter().map(|(tag, crawler)| (tag.as_str(), crawler))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
