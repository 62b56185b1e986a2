//! Pipeline components and the orchestrator that drives them.
//!
//! - `CrawlerRegistry`: source tag to crawler mapping
//! - `Deduplicator`: drops records already in the article store
//! - `QueueManager`: queue entry lifecycle and atomic claims
//! - `PublishCoordinator`: published record lifecycle
//! - `NotificationDispatcher`: per-article channel fan-out
//! - `Orchestrator`: one run over all of the above

mod dedup;
mod dispatch;
mod orchestrator;
mod publish;
mod queue;
mod registry;
mod setup;

pub use dedup::{DedupOutcome, Deduplicator};
pub use dispatch::NotificationDispatcher;
pub use orchestrator::{CancelHandle, Orchestrator, RunSettings};
pub use publish::PublishCoordinator;
pub use queue::{MAX_RETRIES_EXCEEDED, QueueManager, StaleSweep};
pub use registry::CrawlerRegistry;
pub use setup::{build_orchestrator, dry_run_config};
