//! External capabilities consumed by the pipeline.
//!
//! - `Crawler` / `SelectorCrawler`: fetch and parse a source's listing
//! - `Notifier` / `WebhookNotifier` / `LogNotifier`: outbound channels
//! - `ArticleProcessor` / `ContentCheck`: processing step before publish

mod crawler;
mod notifier;
mod processor;
mod selector;

pub use crawler::{Crawler, crawl};
pub use notifier::{LogNotifier, Notifier, WebhookNotifier, build_notifier};
pub use processor::{ArticleProcessor, ContentCheck};
pub use selector::SelectorCrawler;
