//! In-memory storage implementation.
//!
//! Volatile and process-local. Used by tests and dry runs; it honours the
//! same compare-and-swap contract as `LocalStore`. Availability can be
//! toggled to simulate an unreachable backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{ArticleRecord, PublishStatus, PublishedRecord, QueueEntry, QueueStatus};
use crate::storage::{ArticleStore, PublishedStore, QueueStore, page_published, swap_in};

/// In-memory backend for all three collections.
#[derive(Debug)]
pub struct MemoryStore {
    articles: Mutex<BTreeMap<String, ArticleRecord>>,
    queue: Mutex<BTreeMap<String, QueueEntry>>,
    published: Mutex<BTreeMap<String, PublishedRecord>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            articles: Mutex::new(BTreeMap::new()),
            queue: Mutex::new(BTreeMap::new()),
            published: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn lock<'a, T>(&self, name: &str, m: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AppError::store(format!("{name} store is offline")));
        }
        m.lock()
            .map_err(|_| AppError::store(format!("{name} store lock poisoned")))
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn contains_article(&self, id: &str) -> Result<bool> {
        Ok(self.lock("article", &self.articles)?.contains_key(id))
    }

    async fn get_article(&self, id: &str) -> Result<Option<ArticleRecord>> {
        Ok(self.lock("article", &self.articles)?.get(id).cloned())
    }

    async fn insert_article(&self, record: &ArticleRecord) -> Result<bool> {
        let mut articles = self.lock("article", &self.articles)?;
        Ok(swap_in(&mut *articles, None, record))
    }

    async fn remove_article(&self, id: &str) -> Result<bool> {
        Ok(self.lock("article", &self.articles)?.remove(id).is_some())
    }

    async fn article_count(&self) -> Result<usize> {
        Ok(self.lock("article", &self.articles)?.len())
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn get_entry(&self, article_id: &str) -> Result<Option<QueueEntry>> {
        Ok(self.lock("queue", &self.queue)?.get(article_id).cloned())
    }

    async fn list_entries(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>> {
        Ok(self
            .lock("queue", &self.queue)?
            .values()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .cloned()
            .collect())
    }

    async fn swap_entry(&self, expected: Option<u64>, entry: &QueueEntry) -> Result<bool> {
        let mut queue = self.lock("queue", &self.queue)?;
        Ok(swap_in(&mut *queue, expected, entry))
    }
}

#[async_trait]
impl PublishedStore for MemoryStore {
    async fn get_published(&self, id: &str) -> Result<Option<PublishedRecord>> {
        Ok(self.lock("published", &self.published)?.get(id).cloned())
    }

    async fn list_published(
        &self,
        status: Option<PublishStatus>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<PublishedRecord>> {
        let records = self.lock("published", &self.published)?;
        Ok(page_published(&records, status, skip, limit))
    }

    async fn swap_published(
        &self,
        expected: Option<u64>,
        record: &PublishedRecord,
    ) -> Result<bool> {
        let mut published = self.lock("published", &self.published)?;
        Ok(swap_in(&mut *published, expected, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::RawArticle;

    fn article(native_id: &str) -> ArticleRecord {
        let raw = RawArticle {
            title: "t".into(),
            url: "https://example.com/1".into(),
            native_id: Some(native_id.into()),
            ..RawArticle::default()
        };
        ArticleRecord::from_raw("test", raw, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_insert_article_is_create_if_absent() {
        let store = MemoryStore::new();
        let record = article("1");
        assert!(store.insert_article(&record).await.unwrap());
        assert!(!store.insert_article(&record).await.unwrap());
        assert!(store.contains_article(&record.id).await.unwrap());
        assert_eq!(store.article_count().await.unwrap(), 1);

        assert!(store.remove_article(&record.id).await.unwrap());
        assert!(!store.contains_article(&record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_store_fails_loudly() {
        let store = MemoryStore::new();
        store.set_available(false);
        let err = store.contains_article("x").await.unwrap_err();
        assert!(err.is_store_unavailable());

        store.set_available(true);
        assert!(!store.contains_article("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_entries_filters_status() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = QueueEntry::new("a", 0, now);
        let b = QueueEntry::new("b", 0, now);
        store.swap_entry(None, &a).await.unwrap();
        store.swap_entry(None, &b).await.unwrap();
        store
            .swap_entry(Some(0), &b.claimed(now).unwrap())
            .await
            .unwrap();

        assert_eq!(store.list_entries(None).await.unwrap().len(), 2);
        let waiting = store.list_entries(Some(QueueStatus::Waiting)).await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].article_id, "a");
    }
}
