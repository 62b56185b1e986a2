// src/models/mod.rs

//! Domain models for the pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod article;
mod config;
mod notification;
mod published;
mod queue;
mod report;

// Re-export all public types
pub use article::{ArticleRecord, RawArticle, derive_id};
pub use config::{
    ChannelConfig, ChannelKind, CleaningConfig, Config, CrawlerConfig, MAX_STALE_AFTER_SECS,
    NotifyConfig, PipelineConfig, SourceConfig, SourceSelectors, chrono_seconds,
};
pub use notification::NotificationAttempt;
pub use published::{PublishStatus, PublishedRecord};
pub use queue::{QueueEntry, QueueStatus};
pub use report::{ArticleFailure, BatchStage, ChannelStats, RunReport, SourceReport};
