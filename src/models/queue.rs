//! Queue entry lifecycle.
//!
//! ```text
//! waiting ──claim──▶ processing ──complete──▶ done
//!    ▲                   │
//!    └────requeue────────┤
//!                        └────fail──────────▶ failed
//! ```
//!
//! `done` and `failed` are terminal. `processed_at` is set exactly when the
//! entry is terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Queue entry state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Waiting,
    Processing,
    Done,
    Failed,
}

impl QueueStatus {
    /// All states, in lifecycle order.
    pub const ALL: [QueueStatus; 4] = [
        QueueStatus::Waiting,
        QueueStatus::Processing,
        QueueStatus::Done,
        QueueStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::Processing => "processing",
            QueueStatus::Done => "done",
            QueueStatus::Failed => "failed",
        }
    }

    /// No further transition is permitted from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Done | QueueStatus::Failed)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        QueueStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.to_lowercase())
            .ok_or_else(|| AppError::validation(format!("unknown queue status '{s}'")))
    }
}

/// One pending unit of work for an article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntry {
    pub article_id: String,

    pub status: QueueStatus,

    /// Higher is more urgent
    pub priority: i32,

    pub enqueued_at: DateTime<Utc>,

    /// When the current processing attempt started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,

    /// Number of times a stale attempt was returned to `waiting`
    #[serde(default)]
    pub retry_count: u32,

    /// Optimistic concurrency token, bumped on every write
    #[serde(default)]
    pub version: u64,
}

impl QueueEntry {
    /// Create a fresh `waiting` entry.
    pub fn new(article_id: impl Into<String>, priority: i32, now: DateTime<Utc>) -> Self {
        Self {
            article_id: article_id.into(),
            status: QueueStatus::Waiting,
            priority,
            enqueued_at: now,
            claimed_at: None,
            processed_at: None,
            failed_reason: None,
            retry_count: 0,
            version: 0,
        }
    }

    fn check(&self, expected: QueueStatus, to: QueueStatus) -> Result<()> {
        if self.status != expected {
            return Err(AppError::transition(
                "queue entry",
                &self.article_id,
                self.status,
                to,
            ));
        }
        Ok(())
    }

    /// The next revision of this entry, with the version bumped.
    fn next(&self) -> Self {
        Self {
            version: self.version + 1,
            ..self.clone()
        }
    }

    /// `waiting → processing`.
    pub fn claimed(&self, now: DateTime<Utc>) -> Result<Self> {
        self.check(QueueStatus::Waiting, QueueStatus::Processing)?;
        let mut next = self.next();
        next.status = QueueStatus::Processing;
        next.claimed_at = Some(now);
        next.processed_at = None;
        Ok(next)
    }

    /// `processing → done`.
    pub fn completed(&self, now: DateTime<Utc>) -> Result<Self> {
        self.check(QueueStatus::Processing, QueueStatus::Done)?;
        let mut next = self.next();
        next.status = QueueStatus::Done;
        next.processed_at = Some(now);
        next.failed_reason = None;
        Ok(next)
    }

    /// `processing → failed`.
    pub fn failed(&self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<Self> {
        self.check(QueueStatus::Processing, QueueStatus::Failed)?;
        let mut next = self.next();
        next.status = QueueStatus::Failed;
        next.processed_at = Some(now);
        next.failed_reason = Some(reason.into());
        Ok(next)
    }

    /// `processing → waiting` for another attempt. Clears any stale failure text.
    pub fn requeued(&self) -> Result<Self> {
        self.check(QueueStatus::Processing, QueueStatus::Waiting)?;
        let mut next = self.next();
        next.status = QueueStatus::Waiting;
        next.claimed_at = None;
        next.processed_at = None;
        next.failed_reason = None;
        next.retry_count += 1;
        Ok(next)
    }

    /// Replace a terminal entry with a fresh `waiting` one for the same article.
    pub fn reenqueued(&self, priority: i32, now: DateTime<Utc>) -> Result<Self> {
        if !self.status.is_terminal() {
            return Err(AppError::DuplicateEntry {
                article_id: self.article_id.clone(),
            });
        }
        Ok(Self {
            version: self.version + 1,
            ..Self::new(self.article_id.clone(), priority, now)
        })
    }

    /// Whether a `processing` entry has been held longer than `max_age`.
    pub fn is_stale(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Processing
            && self
                .claimed_at
                .is_some_and(|claimed| now.signed_duration_since(claimed) > max_age)
    }

    /// Claim order: priority descending, then enqueue time ascending.
    pub fn claim_order(a: &QueueEntry, b: &QueueEntry) -> std::cmp::Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
            .then_with(|| a.article_id.cmp(&b.article_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invariant_holds(entry: &QueueEntry) -> bool {
        entry.processed_at.is_some() == entry.status.is_terminal()
    }

    #[test]
    fn test_happy_path_keeps_processed_at_invariant() {
        let now = Utc::now();
        let entry = QueueEntry::new("a1", 0, now);
        assert!(invariant_holds(&entry));

        let claimed = entry.claimed(now).unwrap();
        assert_eq!(claimed.status, QueueStatus::Processing);
        assert_eq!(claimed.version, 1);
        assert!(invariant_holds(&claimed));

        let done = claimed.completed(now).unwrap();
        assert_eq!(done.status, QueueStatus::Done);
        assert!(invariant_holds(&done));
    }

    #[test]
    fn test_failed_sets_reason() {
        let now = Utc::now();
        let failed = QueueEntry::new("a1", 0, now)
            .claimed(now)
            .unwrap()
            .failed("parse error", now)
            .unwrap();
        assert_eq!(failed.failed_reason.as_deref(), Some("parse error"));
        assert!(invariant_holds(&failed));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let now = Utc::now();
        let done = QueueEntry::new("a1", 0, now)
            .claimed(now)
            .unwrap()
            .completed(now)
            .unwrap();

        assert!(matches!(
            done.completed(now),
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(done.failed("x", now).is_err());
        assert!(done.claimed(now).is_err());
        assert!(done.requeued().is_err());
    }

    #[test]
    fn test_requeue_clears_reason_and_counts_retry() {
        let now = Utc::now();
        let mut processing = QueueEntry::new("a1", 0, now).claimed(now).unwrap();
        processing.failed_reason = Some("left over".into());

        let waiting = processing.requeued().unwrap();
        assert_eq!(waiting.status, QueueStatus::Waiting);
        assert_eq!(waiting.retry_count, 1);
        assert!(waiting.failed_reason.is_none());
        assert!(waiting.claimed_at.is_none());
    }

    #[test]
    fn test_reenqueue_only_from_terminal() {
        let now = Utc::now();
        let waiting = QueueEntry::new("a1", 0, now);
        assert!(matches!(
            waiting.reenqueued(5, now),
            Err(AppError::DuplicateEntry { .. })
        ));

        let failed = waiting.claimed(now).unwrap().failed("x", now).unwrap();
        let fresh = failed.reenqueued(5, now).unwrap();
        assert_eq!(fresh.status, QueueStatus::Waiting);
        assert_eq!(fresh.priority, 5);
        assert_eq!(fresh.version, failed.version + 1);
        assert!(fresh.failed_reason.is_none());
    }

    #[test]
    fn test_is_stale() {
        let now = Utc::now();
        let claimed = QueueEntry::new("a1", 0, now)
            .claimed(now - chrono::Duration::minutes(10))
            .unwrap();
        assert!(claimed.is_stale(chrono::Duration::minutes(5), now));
        assert!(!claimed.is_stale(chrono::Duration::minutes(15), now));
        assert!(!QueueEntry::new("a2", 0, now).is_stale(chrono::Duration::zero(), now));
    }

    #[test]
    fn test_claim_order() {
        let now = Utc::now();
        let mut entries = vec![
            QueueEntry::new("low", 1, now),
            QueueEntry::new("late", 5, now + chrono::Duration::seconds(1)),
            QueueEntry::new("early", 5, now),
        ];
        entries.sort_by(QueueEntry::claim_order);
        let ids: Vec<_> = entries.iter().map(|e| e.article_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "low"]);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Failed".parse::<QueueStatus>().unwrap(), QueueStatus::Failed);
        assert!("stuck".parse::<QueueStatus>().is_err());
    }
}
