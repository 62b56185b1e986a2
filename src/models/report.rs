//! Run-level reporting.
//!
//! The report is the only user-visible surface of a run: per-source and
//! per-article failures end up here instead of aborting the batch.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::NotificationAttempt;

/// Stage of a source batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchStage {
    Fetching,
    Deduping,
    Enqueuing,
    Processing,
    Publishing,
    Notifying,
    Done,
    Failed,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStage::Fetching => "FETCHING",
            BatchStage::Deduping => "DEDUPING",
            BatchStage::Enqueuing => "ENQUEUING",
            BatchStage::Processing => "PROCESSING",
            BatchStage::Publishing => "PUBLISHING",
            BatchStage::Notifying => "NOTIFYING",
            BatchStage::Done => "DONE",
            BatchStage::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Outcome of one source within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub stage: BatchStage,
    /// Stage the source was in when it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<BatchStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Records returned by the crawler
    pub fetched: usize,
    /// Records dropped as already known
    pub deduplicated: usize,
    /// Records dropped for lacking any identity
    pub rejected: usize,
    /// New records persisted and enqueued
    pub enqueued: usize,
    /// Articles from this source published during the run
    #[serde(default)]
    pub published: usize,
    /// Published articles that reached at least one channel
    #[serde(default)]
    pub notified: usize,
}

impl SourceReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            stage: BatchStage::Fetching,
            failed_at: None,
            error: None,
            fetched: 0,
            deduplicated: 0,
            rejected: 0,
            enqueued: 0,
            published: 0,
            notified: 0,
        }
    }

    pub fn advance(&mut self, stage: BatchStage) {
        log::debug!("Source {}: {} -> {}", self.source, self.stage, stage);
        self.stage = stage;
    }

    /// Walk a surviving source through the draining stages it took part in.
    pub fn finish(&mut self, published: usize, notified: usize) {
        self.published = published;
        self.notified = notified;
        if published > 0 {
            self.advance(BatchStage::Publishing);
        }
        if notified > 0 {
            self.advance(BatchStage::Notifying);
        }
        self.advance(BatchStage::Done);
    }

    pub fn fail(&mut self, error: impl fmt::Display) {
        log::warn!("Source {} failed during {}: {}", self.source, self.stage, error);
        self.failed_at = Some(self.stage);
        self.stage = BatchStage::Failed;
        self.error = Some(error.to_string());
    }

    pub fn is_failed(&self) -> bool {
        self.stage == BatchStage::Failed
    }
}

/// A per-article failure recorded during ingestion or processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleFailure {
    pub article_id: String,
    pub stage: BatchStage,
    pub reason: String,
}

/// Delivery counts for one channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChannelStats {
    pub succeeded: usize,
    pub failed: usize,
}

/// Aggregated results of one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Per-source outcomes in registration order
    pub sources: Vec<SourceReport>,

    /// Stale entries returned to `waiting` by the opening sweep
    pub requeued: usize,
    /// Stale entries failed by the opening sweep for exceeding the retry cap
    pub expired: usize,

    /// Entries claimed from the queue
    pub claimed: usize,
    pub published: usize,
    pub processing_failures: usize,

    pub failures: Vec<ArticleFailure>,

    pub notifications: BTreeMap<String, ChannelStats>,

    /// Whether the run stopped admitting claims because of cancellation
    pub cancelled: bool,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            sources: Vec::new(),
            requeued: 0,
            expired: 0,
            claimed: 0,
            published: 0,
            processing_failures: 0,
            failures: Vec::new(),
            notifications: BTreeMap::new(),
            cancelled: false,
        }
    }

    pub fn sources_attempted(&self) -> usize {
        self.sources.len()
    }

    pub fn sources_failed(&self) -> usize {
        self.sources.iter().filter(|s| s.is_failed()).count()
    }

    pub fn articles_fetched(&self) -> usize {
        self.sources.iter().map(|s| s.fetched).sum()
    }

    pub fn articles_deduplicated(&self) -> usize {
        self.sources.iter().map(|s| s.deduplicated).sum()
    }

    pub fn articles_enqueued(&self) -> usize {
        self.sources.iter().map(|s| s.enqueued).sum()
    }

    pub fn notifications_succeeded(&self) -> usize {
        self.notifications.values().map(|c| c.succeeded).sum()
    }

    pub fn notifications_failed(&self) -> usize {
        self.notifications.values().map(|c| c.failed).sum()
    }

    pub fn record_failure(
        &mut self,
        article_id: impl Into<String>,
        stage: BatchStage,
        reason: impl fmt::Display,
    ) {
        self.failures.push(ArticleFailure {
            article_id: article_id.into(),
            stage,
            reason: reason.to_string(),
        });
    }

    pub fn record_attempts(&mut self, attempts: &[NotificationAttempt]) {
        for attempt in attempts {
            let stats = self.notifications.entry(attempt.channel.clone()).or_default();
            if attempt.success {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
        }
    }

    /// Key/value lines for a human-readable summary.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let mut items = vec![
            (
                "Sources",
                format!(
                    "{} attempted, {} failed",
                    self.sources_attempted(),
                    self.sources_failed()
                ),
            ),
            (
                "Articles",
                format!(
                    "{} fetched, {} already known, {} enqueued",
                    self.articles_fetched(),
                    self.articles_deduplicated(),
                    self.articles_enqueued()
                ),
            ),
            (
                "Queue",
                format!(
                    "{} claimed, {} published, {} failed, {} requeued, {} expired",
                    self.claimed,
                    self.published,
                    self.processing_failures,
                    self.requeued,
                    self.expired
                ),
            ),
        ];

        for (channel, stats) in &self.notifications {
            items.push((
                "Channel",
                format!("{channel}: {} sent, {} failed", stats.succeeded, stats.failed),
            ));
        }

        if self.cancelled {
            items.push(("Cancelled", "true".to_string()));
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_failure_records_stage() {
        let mut source = SourceReport::new("kbs");
        source.advance(BatchStage::Deduping);
        source.fail("store down");
        assert!(source.is_failed());
        assert_eq!(source.failed_at, Some(BatchStage::Deduping));
        assert_eq!(source.error.as_deref(), Some("store down"));
    }

    #[test]
    fn test_finish_counts_draining_work() {
        let mut idle = SourceReport::new("kbs");
        idle.advance(BatchStage::Processing);
        idle.finish(0, 0);
        assert_eq!(idle.stage, BatchStage::Done);
        assert_eq!(idle.published, 0);

        let mut busy = SourceReport::new("mbc");
        busy.advance(BatchStage::Processing);
        busy.finish(3, 2);
        assert_eq!(busy.stage, BatchStage::Done);
        assert_eq!((busy.published, busy.notified), (3, 2));
    }

    #[test]
    fn test_aggregates() {
        let mut report = RunReport::new(Utc::now());
        let mut a = SourceReport::new("a");
        a.fetched = 3;
        a.deduplicated = 1;
        a.enqueued = 2;
        let mut b = SourceReport::new("b");
        b.fail("timeout");
        report.sources = vec![a, b];

        assert_eq!(report.sources_attempted(), 2);
        assert_eq!(report.sources_failed(), 1);
        assert_eq!(report.articles_fetched(), 3);
        assert_eq!(report.articles_deduplicated(), 1);
        assert_eq!(report.articles_enqueued(), 2);
    }

    #[test]
    fn test_record_attempts_per_channel() {
        let mut report = RunReport::new(Utc::now());
        report.record_attempts(&[
            NotificationAttempt::failed("a1", "slack", "503"),
            NotificationAttempt::delivered("a1", "discord"),
            NotificationAttempt::delivered("a2", "discord"),
        ]);

        assert_eq!(report.notifications["slack"].failed, 1);
        assert_eq!(report.notifications["discord"].succeeded, 2);
        assert_eq!(report.notifications_succeeded(), 2);
        assert_eq!(report.notifications_failed(), 1);
    }
}
