//! Deduplication of freshly crawled records against the article store.
//!
//! A record's identity is derived from its source and native key (see
//! `RawArticle::native_key`), so re-crawling the same article always maps
//! to the same id. The filter is pure: persisting accepted records is the
//! caller's job.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ArticleRecord, RawArticle};
use crate::storage::ArticleStore;

/// Result of filtering one source's batch.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Records not yet known to the article store, in crawl order
    pub fresh: Vec<ArticleRecord>,
    /// Records already stored, or repeated within the batch
    pub duplicates: usize,
    /// Records with neither a native id nor a URL
    pub rejected: usize,
}

/// Filters raw records down to unseen articles.
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn ArticleStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    /// Keep only records whose derived id is unknown.
    ///
    /// A store lookup failure fails the whole batch; it is never read as
    /// "not seen".
    pub async fn filter_new(
        &self,
        source: &str,
        records: Vec<RawArticle>,
        collected_at: DateTime<Utc>,
    ) -> Result<DedupOutcome> {
        let mut outcome = DedupOutcome::default();
        let mut seen = HashSet::new();

        for raw in records {
            let Some(record) = ArticleRecord::from_raw(source, raw, collected_at) else {
                outcome.rejected += 1;
                continue;
            };

            if !seen.insert(record.id.clone()) || self.store.contains_article(&record.id).await? {
                outcome.duplicates += 1;
                continue;
            }
            outcome.fresh.push(record);
        }

        if outcome.rejected > 0 {
            log::warn!(
                "Source {}: {} records without native id or url skipped",
                source,
                outcome.rejected
            );
        }
        Ok(outcome)
    }
}
