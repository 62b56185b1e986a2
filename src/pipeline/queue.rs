//! Queue manager: the only writer of queue entries.
//!
//! Every transition is a read followed by a version-checked swap. A lost
//! race (another writer bumped the version first) is either retried
//! (`claim_next`, `requeue_stale`) or reported as the transition error it
//! now is.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{QueueEntry, QueueStatus};
use crate::storage::QueueStore;

/// Outcome of a stale sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StaleSweep {
    /// Entries returned to `waiting`
    pub requeued: usize,
    /// Entries failed for exceeding the retry cap
    pub expired: usize,
}

/// Reason recorded on entries that exhausted their retries.
pub const MAX_RETRIES_EXCEEDED: &str = "max retries exceeded";

/// Owns the queue store and enforces the entry lifecycle.
#[derive(Clone)]
pub struct QueueManager {
    store: Arc<dyn QueueStore>,
    max_retries: u32,
}

impl QueueManager {
    pub fn new(store: Arc<dyn QueueStore>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    /// Create a `waiting` entry.
    ///
    /// Fails with `DuplicateEntry` while an active entry exists. A terminal
    /// entry for the same article is replaced.
    pub async fn enqueue(&self, article_id: &str, priority: i32) -> Result<QueueEntry> {
        self.enqueue_at(article_id, priority, Utc::now()).await
    }

    pub async fn enqueue_at(
        &self,
        article_id: &str,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Result<QueueEntry> {
        let current = self.store.get_entry(article_id).await?;
        let (expected, entry) = match &current {
            None => (None, QueueEntry::new(article_id, priority, now)),
            Some(existing) => (Some(existing.version), existing.reenqueued(priority, now)?),
        };

        if !self.store.swap_entry(expected, &entry).await? {
            // Someone else wrote this article's entry in between.
            return Err(AppError::DuplicateEntry {
                article_id: article_id.to_string(),
            });
        }
        log::debug!("Enqueued {} (priority {})", article_id, priority);
        Ok(entry)
    }

    /// Claim the most urgent `waiting` entry.
    ///
    /// Returns `None` when nothing is waiting. Two callers never receive the
    /// same entry: the `waiting → processing` write only succeeds against
    /// the version that was selected.
    pub async fn claim_next(&self) -> Result<Option<QueueEntry>> {
        loop {
            let mut waiting = self.store.list_entries(Some(QueueStatus::Waiting)).await?;
            waiting.sort_by(QueueEntry::claim_order);

            let Some(candidate) = waiting.into_iter().next() else {
                return Ok(None);
            };

            let claimed = candidate.claimed(Utc::now())?;
            if self.store.swap_entry(Some(candidate.version), &claimed).await? {
                return Ok(Some(claimed));
            }
            log::debug!("Lost claim race for {}, retrying", candidate.article_id);
        }
    }

    /// `processing → done`.
    pub async fn mark_done(&self, article_id: &str) -> Result<QueueEntry> {
        let current = self.require(article_id).await?;
        let next = current.completed(Utc::now())?;
        self.commit(&current, next).await
    }

    /// `processing → failed`.
    pub async fn mark_failed(&self, article_id: &str, reason: &str) -> Result<QueueEntry> {
        let current = self.require(article_id).await?;
        let next = current.failed(reason, Utc::now())?;
        self.commit(&current, next).await
    }

    /// Recover entries held in `processing` for longer than `max_age`.
    ///
    /// Entries under the retry cap go back to `waiting` with the retry count
    /// bumped; entries at the cap are failed with "max retries exceeded".
    pub async fn requeue_stale(&self, max_age: chrono::Duration) -> Result<StaleSweep> {
        self.requeue_stale_at(max_age, Utc::now()).await
    }

    pub async fn requeue_stale_at(
        &self,
        max_age: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<StaleSweep> {
        let mut sweep = StaleSweep::default();
        let processing = self
            .store
            .list_entries(Some(QueueStatus::Processing))
            .await?;

        for entry in processing.iter().filter(|e| e.is_stale(max_age, now)) {
            let expired = entry.retry_count >= self.max_retries;
            let next = if expired {
                entry.failed(MAX_RETRIES_EXCEEDED, now)?
            } else {
                entry.requeued()?
            };

            // A worker finishing the entry meanwhile wins; skip it.
            if !self.store.swap_entry(Some(entry.version), &next).await? {
                continue;
            }

            if expired {
                log::warn!(
                    "Queue entry {} failed after {} retries",
                    entry.article_id,
                    entry.retry_count
                );
                sweep.expired += 1;
            } else {
                log::info!(
                    "Requeued stale entry {} (retry {})",
                    entry.article_id,
                    next.retry_count
                );
                sweep.requeued += 1;
            }
        }
        Ok(sweep)
    }

    pub async fn get(&self, article_id: &str) -> Result<Option<QueueEntry>> {
        self.store.get_entry(article_id).await
    }

    /// Waiting entries in claim order.
    pub async fn waiting(&self) -> Result<Vec<QueueEntry>> {
        let mut waiting = self.store.list_entries(Some(QueueStatus::Waiting)).await?;
        waiting.sort_by(QueueEntry::claim_order);
        Ok(waiting)
    }

    /// Entry count per status.
    pub async fn counts(&self) -> Result<BTreeMap<&'static str, usize>> {
        let mut counts: BTreeMap<&'static str, usize> =
            QueueStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
        for entry in self.store.list_entries(None).await? {
            *counts.entry(entry.status.as_str()).or_default() += 1;
        }
        Ok(counts)
    }

    async fn require(&self, article_id: &str) -> Result<QueueEntry> {
        self.store
            .get_entry(article_id)
            .await?
            .ok_or_else(|| AppError::not_found("queue entry", article_id))
    }

    async fn commit(&self, current: &QueueEntry, next: QueueEntry) -> Result<QueueEntry> {
        if self.store.swap_entry(Some(current.version), &next).await? {
            return Ok(next);
        }
        // Re-read to report what the entry turned into.
        let now = self.require(&current.article_id).await?;
        Err(AppError::transition(
            "queue entry",
            &current.article_id,
            now.status,
            next.status,
        ))
    }
}
