//! Run orchestration: crawl, dedupe, enqueue, drain, publish, notify.
//!
//! A run has two phases:
//!
//! 1. Ingestion. Sources are crawled concurrently (bounded by
//!    `max_concurrent`); each one moves `FETCHING → DEDUPING → ENQUEUING`
//!    and fails on its own without touching the others.
//! 2. Draining. A fixed pool of workers loops on `claim_next`; each claimed
//!    entry is processed, marked done, published and dispatched to every
//!    channel, or marked failed with the processing error.
//!
//! Per-source and per-article problems end up in the `RunReport`. Only a
//! broken shared store (`StoreUnavailable`) stops the run with an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;

use crate::error::{AppError, Result};
use crate::models::{
    ArticleFailure, ArticleRecord, BatchStage, Config, NotificationAttempt, QueueEntry, RunReport,
    SourceReport,
};
use crate::pipeline::{
    CrawlerRegistry, Deduplicator, NotificationDispatcher, PublishCoordinator, QueueManager,
};
use crate::services::{ArticleProcessor, Crawler, Notifier, crawl};
use crate::storage::{ArticleStore, Stores};

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Sources crawled at the same time
    pub max_concurrent: usize,
    pub fetch_timeout: Duration,
    /// Size of the draining pool
    pub processing_workers: usize,
    /// Age after which a `processing` entry counts as abandoned
    pub stale_after: chrono::Duration,
    pub max_retries: u32,
    /// Priority for sources without one of their own
    pub default_priority: i32,
    pub notify_timeout: Duration,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            max_concurrent: config.crawler.max_concurrent,
            fetch_timeout: config.crawler.timeout(),
            processing_workers: config.pipeline.processing_workers,
            stale_after: config.pipeline.stale_after()?,
            max_retries: config.pipeline.max_retries,
            default_priority: config.pipeline.default_priority,
            notify_timeout: config.notify.timeout(),
        })
    }
}

/// Stops a running orchestrator from claiming further entries.
///
/// Entries already being processed finish normally; anything interrupted
/// harder than that is recovered by the next run's stale sweep.
#[derive(Clone)]
pub struct CancelHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        log::info!("Cancellation requested, no new entries will be claimed");
        self.signal.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }
}

/// What one source's ingestion produced.
struct SourceOutcome {
    report: SourceReport,
    failures: Vec<ArticleFailure>,
    escalation: Option<AppError>,
}

/// What one draining worker did.
#[derive(Default)]
struct WorkerTally {
    claimed: usize,
    published: usize,
    processing_failures: usize,
    failures: Vec<ArticleFailure>,
    attempts: Vec<NotificationAttempt>,
    /// Published and notified article counts per source
    by_source: HashMap<String, (usize, usize)>,
    cancelled: bool,
    escalation: Option<AppError>,
}

impl WorkerTally {
    fn fail(&mut self, article_id: &str, stage: BatchStage, reason: impl ToString) {
        self.failures.push(ArticleFailure {
            article_id: article_id.to_string(),
            stage,
            reason: reason.to_string(),
        });
    }

    /// Record a non-fatal error and carry on; store failures propagate.
    fn absorb<T>(
        &mut self,
        result: Result<T>,
        article_id: &str,
        stage: BatchStage,
    ) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_store_unavailable() => Err(e),
            Err(e) => {
                log::warn!("Article {} failed during {}: {}", article_id, stage, e);
                self.fail(article_id, stage, &e);
                Ok(None)
            }
        }
    }
}

pub struct Orchestrator {
    registry: CrawlerRegistry,
    articles: Arc<dyn ArticleStore>,
    dedup: Deduplicator,
    queue: QueueManager,
    publisher: PublishCoordinator,
    dispatcher: NotificationDispatcher,
    notifiers: Vec<Arc<dyn Notifier>>,
    processor: Arc<dyn ArticleProcessor>,
    priorities: HashMap<String, i32>,
    settings: RunSettings,
    cancel: Arc<watch::Sender<bool>>,
}

impl Orchestrator {
    pub fn new(
        registry: CrawlerRegistry,
        stores: Stores,
        processor: Arc<dyn ArticleProcessor>,
        notifiers: Vec<Arc<dyn Notifier>>,
        settings: RunSettings,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            registry,
            dedup: Deduplicator::new(Arc::clone(&stores.articles)),
            articles: stores.articles,
            queue: QueueManager::new(stores.queue, settings.max_retries),
            publisher: PublishCoordinator::new(stores.published),
            dispatcher: NotificationDispatcher::new(settings.notify_timeout),
            notifiers,
            processor,
            priorities: HashMap::new(),
            settings,
            cancel: Arc::new(cancel),
        }
    }

    /// Queue priority for articles from `source`.
    pub fn set_priority(&mut self, source: impl Into<String>, priority: i32) {
        self.priorities.insert(source.into(), priority);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            signal: Arc::clone(&self.cancel),
        }
    }

    pub fn registry(&self) -> &CrawlerRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn publisher(&self) -> &PublishCoordinator {
        &self.publisher
    }

    /// Execute one full run.
    pub async fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::new(Utc::now());
        log::info!(
            "Run starting: {} sources, {} channels, {} workers",
            self.registry.len(),
            self.notifiers.len(),
            self.settings.processing_workers
        );

        let sweep = self.queue.requeue_stale(self.settings.stale_after).await?;
        report.requeued = sweep.requeued;
        report.expired = sweep.expired;

        // Phase 1: ingestion
        let mut outcomes: Vec<(usize, SourceOutcome)> =
            stream::iter(self.registry.iter().enumerate())
                .map(|(index, (source, crawler))| async move {
                    (index, self.ingest_source(source, crawler.as_ref()).await)
                })
                .buffer_unordered(self.settings.max_concurrent.max(1))
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut escalation = None;
        for (_, outcome) in outcomes {
            report.sources.push(outcome.report);
            report.failures.extend(outcome.failures);
            if escalation.is_none() {
                escalation = outcome.escalation;
            }
        }
        if let Some(e) = escalation {
            return Err(self.halt(report, e));
        }

        // Phase 2: draining
        for source in report.sources.iter_mut().filter(|s| !s.is_failed()) {
            source.advance(BatchStage::Processing);
        }

        let halted = AtomicBool::new(false);
        let workers = self.settings.processing_workers.max(1);
        let tallies = join_all((0..workers).map(|n| self.worker(n, &halted))).await;

        let mut escalation = None;
        let mut by_source: HashMap<String, (usize, usize)> = HashMap::new();
        for tally in tallies {
            for (source, (published, notified)) in tally.by_source {
                let counts = by_source.entry(source).or_default();
                counts.0 += published;
                counts.1 += notified;
            }
            report.claimed += tally.claimed;
            report.published += tally.published;
            report.processing_failures += tally.processing_failures;
            report.failures.extend(tally.failures);
            report.record_attempts(&tally.attempts);
            report.cancelled |= tally.cancelled;
            if escalation.is_none() {
                escalation = tally.escalation;
            }
        }
        if let Some(e) = escalation {
            return Err(self.halt(report, e));
        }

        for source in report.sources.iter_mut().filter(|s| !s.is_failed()) {
            let (published, notified) = by_source.get(&source.source).copied().unwrap_or_default();
            source.finish(published, notified);
        }
        report.finished_at = Some(Utc::now());

        log::info!("Run finished");
        for (key, value) in report.summary() {
            log::info!("    {}: {}", key, value);
        }
        Ok(report)
    }

    fn halt(&self, report: RunReport, error: AppError) -> AppError {
        log::error!("Run halted: {}", error);
        for (key, value) in report.summary() {
            log::error!("    {}: {}", key, value);
        }
        error
    }

    fn priority_for(&self, source: &str) -> i32 {
        self.priorities
            .get(source)
            .copied()
            .unwrap_or(self.settings.default_priority)
    }

    async fn ingest_source(&self, source: &str, crawler: &dyn Crawler) -> SourceOutcome {
        let mut outcome = SourceOutcome {
            report: SourceReport::new(source),
            failures: Vec::new(),
            escalation: None,
        };
        let report = &mut outcome.report;

        let raw = match crawl(source, crawler, self.settings.fetch_timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                report.fail(&e);
                return outcome;
            }
        };
        report.fetched = raw.len();

        report.advance(BatchStage::Deduping);
        let filtered = match self.dedup.filter_new(source, raw, Utc::now()).await {
            Ok(filtered) => filtered,
            Err(e) => {
                report.fail(&e);
                outcome.escalation = e.is_store_unavailable().then_some(e);
                return outcome;
            }
        };
        report.deduplicated = filtered.duplicates;
        report.rejected = filtered.rejected;

        report.advance(BatchStage::Enqueuing);
        let priority = self.priority_for(source);
        for record in &filtered.fresh {
            match self.ingest(record, priority).await {
                Ok(true) => report.enqueued += 1,
                Ok(false) => report.deduplicated += 1,
                Err(e) if e.is_store_unavailable() => {
                    report.fail(&e);
                    outcome.escalation = Some(e);
                    return outcome;
                }
                Err(e) => {
                    log::warn!("Source {}: article {} not enqueued: {}", source, record.id, e);
                    outcome.failures.push(ArticleFailure {
                        article_id: record.id.clone(),
                        stage: BatchStage::Enqueuing,
                        reason: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Source {}: {} fetched, {} known, {} enqueued",
            source,
            report.fetched,
            report.deduplicated,
            report.enqueued
        );
        outcome
    }

    /// Store the article and enqueue it; neither half survives alone.
    ///
    /// Returns `false` when the article was stored by someone else first.
    async fn ingest(&self, record: &ArticleRecord, priority: i32) -> Result<bool> {
        if !self.articles.insert_article(record).await? {
            return Ok(false);
        }

        if let Err(e) = self.queue.enqueue(&record.id, priority).await {
            if let Err(undo) = self.articles.remove_article(&record.id).await {
                return Err(AppError::store(format!(
                    "article {} stored without queue entry ({e}); rollback failed: {undo}",
                    record.id
                )));
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn worker(&self, n: usize, halted: &AtomicBool) -> WorkerTally {
        let mut tally = WorkerTally::default();
        loop {
            if *self.cancel.borrow() {
                tally.cancelled = true;
                break;
            }
            if halted.load(Ordering::SeqCst) {
                break;
            }

            let entry = match self.queue.claim_next().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    halted.store(true, Ordering::SeqCst);
                    tally.escalation = Some(e);
                    break;
                }
            };
            tally.claimed += 1;
            log::debug!("Worker {} claimed {}", n, entry.article_id);

            if let Err(e) = self.handle(&entry, &mut tally).await {
                halted.store(true, Ordering::SeqCst);
                tally.escalation = Some(e);
                break;
            }
        }
        tally
    }

    /// Process one claimed entry. Only store failures come back as `Err`.
    async fn handle(&self, entry: &QueueEntry, tally: &mut WorkerTally) -> Result<()> {
        let id = entry.article_id.as_str();

        let Some(article) = self.articles.get_article(id).await? else {
            let reason = "article record missing";
            tally.processing_failures += 1;
            tally.fail(id, BatchStage::Processing, reason);
            tally.absorb(
                self.queue.mark_failed(id, reason).await,
                id,
                BatchStage::Processing,
            )?;
            return Ok(());
        };

        if let Err(e) = self.processor.process(&article).await {
            let reason = e.to_string();
            log::warn!("Processing {} failed: {}", id, reason);
            tally.processing_failures += 1;
            tally.fail(id, BatchStage::Processing, &reason);
            tally.absorb(
                self.queue.mark_failed(id, &reason).await,
                id,
                BatchStage::Processing,
            )?;
            return Ok(());
        }

        if tally
            .absorb(self.queue.mark_done(id).await, id, BatchStage::Processing)?
            .is_none()
        {
            return Ok(());
        }

        if tally
            .absorb(self.publisher.publish(id).await, id, BatchStage::Publishing)?
            .is_none()
        {
            return Ok(());
        }
        tally.published += 1;
        let counts = tally.by_source.entry(article.source.clone()).or_default();
        counts.0 += 1;

        let attempts = self.dispatcher.dispatch(&article, &self.notifiers).await;
        if attempts.iter().any(|a| a.success) {
            counts.1 += 1;
        }
        tally.attempts.extend(attempts);
        Ok(())
    }
}
