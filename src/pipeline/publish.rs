//! Published record lifecycle: at most one record per article.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{PublishStatus, PublishedRecord};
use crate::storage::PublishedStore;

#[derive(Clone)]
pub struct PublishCoordinator {
    store: Arc<dyn PublishedStore>,
}

impl PublishCoordinator {
    pub fn new(store: Arc<dyn PublishedStore>) -> Self {
        Self { store }
    }

    /// Create the published record for an article.
    ///
    /// The record id is derived from the article id and written with a
    /// create-if-absent swap, so concurrent callers yield exactly one record
    /// and everyone else gets `AlreadyPublished`.
    pub async fn publish(&self, article_id: &str) -> Result<PublishedRecord> {
        let record = PublishedRecord::new(article_id, Utc::now());
        if !self.store.swap_published(None, &record).await? {
            return Err(AppError::AlreadyPublished {
                article_id: article_id.to_string(),
            });
        }
        log::info!("Published {} as {}", article_id, record.id);
        Ok(record)
    }

    /// `published → archived`.
    pub async fn archive(&self, id: &str) -> Result<PublishedRecord> {
        let current = self.require(id).await?;
        let next = current.archived(Utc::now())?;
        self.commit(&current, next).await
    }

    /// `published | archived → deleted`. The record stays queryable.
    pub async fn soft_delete(&self, id: &str) -> Result<PublishedRecord> {
        let current = self.require(id).await?;
        let next = current.deleted(Utc::now())?;
        self.commit(&current, next).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<PublishedRecord>> {
        self.store.get_published(id).await
    }

    pub async fn find_by_article(&self, article_id: &str) -> Result<Option<PublishedRecord>> {
        self.get(&PublishedRecord::id_for(article_id)).await
    }

    pub async fn list(
        &self,
        status: Option<PublishStatus>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<PublishedRecord>> {
        self.store.list_published(status, skip, limit).await
    }

    async fn require(&self, id: &str) -> Result<PublishedRecord> {
        self.store
            .get_published(id)
            .await?
            .ok_or_else(|| AppError::not_found("published record", id))
    }

    async fn commit(
        &self,
        current: &PublishedRecord,
        next: PublishedRecord,
    ) -> Result<PublishedRecord> {
        if self.store.swap_published(Some(current.version), &next).await? {
            log::info!("Published record {}: {} -> {}", next.id, current.status, next.status);
            return Ok(next);
        }
        let now = self.require(&current.id).await?;
        Err(AppError::transition(
            "published record",
            &current.id,
            now.status,
            next.status,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn coordinator() -> PublishCoordinator {
        PublishCoordinator::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_publish_once_per_article() {
        let publish = coordinator();
        let record = publish.publish("a1").await.unwrap();
        assert_eq!(record.status, PublishStatus::Published);

        let err = publish.publish("a1").await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyPublished { ref article_id } if article_id == "a1"));
        assert_eq!(publish.find_by_article("a1").await.unwrap(), Some(record));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish_single_record() {
        let publish = coordinator();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let publish = publish.clone();
                tokio::spawn(async move { publish.publish("a1").await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, AppError::AlreadyPublished { .. })),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(publish.list(None, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_archive_and_delete() {
        let publish = coordinator();
        let record = publish.publish("a1").await.unwrap();

        let archived = publish.archive(&record.id).await.unwrap();
        assert_eq!(archived.status, PublishStatus::Archived);
        assert!(publish.archive(&record.id).await.is_err());

        let deleted = publish.soft_delete(&record.id).await.unwrap();
        assert_eq!(deleted.status, PublishStatus::Deleted);
        assert_eq!(
            publish.get(&record.id).await.unwrap().map(|r| r.status),
            Some(PublishStatus::Deleted)
        );
    }

    #[tokio::test]
    async fn test_deleted_is_terminal() {
        let publish = coordinator();
        let record = publish.publish("a1").await.unwrap();
        publish.soft_delete(&record.id).await.unwrap();

        assert!(matches!(
            publish.archive(&record.id).await,
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(matches!(
            publish.soft_delete(&record.id).await,
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(matches!(
            publish.publish("a1").await,
            Err(AppError::AlreadyPublished { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_record() {
        let publish = coordinator();
        assert!(matches!(
            publish.archive("nope").await,
            Err(AppError::NotFound { .. })
        ));
        assert!(publish.find_by_article("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let publish = coordinator();
        for id in ["a1", "a2", "a3"] {
            publish.publish(id).await.unwrap();
        }
        let a2 = PublishedRecord::id_for("a2");
        publish.archive(&a2).await.unwrap();

        let archived = publish
            .list(Some(PublishStatus::Archived), 0, 10)
            .await
            .unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].article_id, "a2");
        assert_eq!(
            publish
                .list(Some(PublishStatus::Published), 0, 10)
                .await
                .unwrap()
                .len(),
            2
        );
    }
}
