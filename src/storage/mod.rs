//! Storage abstractions for articles, queue entries and published records.
//!
//! Three logical collections, each keyed by an opaque string id:
//!
//! ```text
//! articles   id          -> ArticleRecord
//! queue      article_id  -> QueueEntry
//! published  id          -> PublishedRecord
//! ```
//!
//! Queue entries and published records carry a `version`. Writes go through
//! `swap_entry` / `swap_published`, which store the new value only when the current
//! version matches the expected one (`None` meaning "absent"), inside a
//! single exclusive critical section. This is the only primitive the
//! pipeline needs for atomic claims and create-if-absent.

pub mod local;
pub mod memory;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ArticleRecord, PublishStatus, PublishedRecord, QueueEntry, QueueStatus};

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;

/// Article persistence.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn contains_article(&self, id: &str) -> Result<bool>;

    async fn get_article(&self, id: &str) -> Result<Option<ArticleRecord>>;

    /// Create if absent. Returns `false` when a record with the same id exists.
    async fn insert_article(&self, record: &ArticleRecord) -> Result<bool>;

    /// Returns `false` when nothing was stored under `id`.
    async fn remove_article(&self, id: &str) -> Result<bool>;

    async fn article_count(&self) -> Result<usize>;
}

/// Queue entry persistence.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn get_entry(&self, article_id: &str) -> Result<Option<QueueEntry>>;

    /// All entries, optionally filtered by status.
    async fn list_entries(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>>;

    /// Store `entry` only if the stored version equals `expected`.
    async fn swap_entry(&self, expected: Option<u64>, entry: &QueueEntry) -> Result<bool>;
}

/// Published record persistence.
#[async_trait]
pub trait PublishedStore: Send + Sync {
    async fn get_published(&self, id: &str) -> Result<Option<PublishedRecord>>;

    /// Records in stable id order, filtered by status, then paginated.
    async fn list_published(
        &self,
        status: Option<PublishStatus>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<PublishedRecord>>;

    /// Store `record` only if the stored version equals `expected`.
    async fn swap_published(&self, expected: Option<u64>, record: &PublishedRecord)
    -> Result<bool>;
}

/// Handles to the three stores used by the pipeline.
#[derive(Clone)]
pub struct Stores {
    pub articles: Arc<dyn ArticleStore>,
    pub queue: Arc<dyn QueueStore>,
    pub published: Arc<dyn PublishedStore>,
}

impl Stores {
    /// Use one backend for all three collections.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ArticleStore + QueueStore + PublishedStore + 'static,
    {
        Self {
            articles: store.clone(),
            queue: store.clone(),
            published: store,
        }
    }

    /// Volatile in-memory stores.
    pub fn memory() -> Self {
        Self::shared(Arc::new(MemoryStore::new()))
    }

    /// File-backed stores rooted at `root`.
    pub async fn local(root: impl AsRef<Path>) -> Result<Self> {
        let store = LocalStore::open(root).await?;
        log::debug!("Opened local store at {}", store.root_dir().display());
        Ok(Self::shared(Arc::new(store)))
    }
}

/// A record that lives in a keyed, versioned collection.
pub(crate) trait Keyed: Clone {
    fn key(&self) -> &str;
    fn version(&self) -> u64;
}

impl Keyed for ArticleRecord {
    fn key(&self) -> &str {
        &self.id
    }
    fn version(&self) -> u64 {
        0
    }
}

impl Keyed for QueueEntry {
    fn key(&self) -> &str {
        &self.article_id
    }
    fn version(&self) -> u64 {
        self.version
    }
}

impl Keyed for PublishedRecord {
    fn key(&self) -> &str {
        &self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
}

/// Apply a compare-and-swap to a collection. Caller holds the collection lock.
pub(crate) fn swap_in<T: Keyed>(
    records: &mut BTreeMap<String, T>,
    expected: Option<u64>,
    value: &T,
) -> bool {
    let current = records.get(value.key()).map(Keyed::version);
    if current != expected {
        return false;
    }
    records.insert(value.key().to_string(), value.clone());
    true
}

/// Filter and paginate published records.
pub(crate) fn page_published(
    records: &BTreeMap<String, PublishedRecord>,
    status: Option<PublishStatus>,
    skip: usize,
    limit: usize,
) -> Vec<PublishedRecord> {
    records
        .values()
        .filter(|r| status.is_none_or(|s| r.status == s))
        .skip(skip)
        .take(limit)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_swap_in_create_if_absent() {
        let mut records = BTreeMap::new();
        let entry = QueueEntry::new("a1", 0, Utc::now());
        assert!(swap_in(&mut records, None, &entry));
        assert!(!swap_in(&mut records, None, &entry));
    }

    #[test]
    fn test_swap_in_version_mismatch() {
        let now = Utc::now();
        let mut records = BTreeMap::new();
        let entry = QueueEntry::new("a1", 0, now);
        swap_in(&mut records, None, &entry);

        let claimed = entry.claimed(now).unwrap();
        assert!(!swap_in(&mut records, Some(7), &claimed));
        assert!(swap_in(&mut records, Some(0), &claimed));
        assert_eq!(records["a1"].status, QueueStatus::Processing);
    }

    #[test]
    fn test_page_published() {
        let now = Utc::now();
        let mut records = BTreeMap::new();
        for i in 0..5 {
            let mut record = PublishedRecord::new(format!("a{i}"), now);
            if i % 2 == 0 {
                record = record.archived(now).unwrap();
            }
            records.insert(record.id.clone(), record);
        }

        assert_eq!(page_published(&records, None, 0, 10).len(), 5);
        assert_eq!(
            page_published(&records, Some(PublishStatus::Archived), 0, 10).len(),
            3
        );
        assert_eq!(page_published(&records, None, 4, 10).len(), 1);
        assert_eq!(page_published(&records, None, 1, 2).len(), 2);
    }
}
