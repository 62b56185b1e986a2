//! Builds an orchestrator from configuration.

use std::sync::Arc;

use crate::error::Result;
use crate::models::{ChannelKind, Config};
use crate::pipeline::{CrawlerRegistry, Orchestrator, RunSettings};
use crate::services::{ContentCheck, SelectorCrawler, build_notifier};
use crate::storage::Stores;
use crate::utils::http::create_async_client;

/// Wire crawlers, channels and stores described by `config`.
///
/// Sources are registered in file order, which is also the order they
/// appear in the run report.
pub fn build_orchestrator(config: &Config, stores: Stores) -> Result<Orchestrator> {
    config.validate()?;

    let client = create_async_client(&config.crawler)?;
    let cleaning = Arc::new(config.cleaning.clone());

    let mut registry = CrawlerRegistry::new();
    for source in &config.sources {
        let crawler =
            SelectorCrawler::new(source.clone(), Arc::clone(&cleaning), client.clone())?;
        registry.register(&source.id, Arc::new(crawler));
    }

    let notifiers = config
        .channels
        .iter()
        .map(|channel| build_notifier(channel, &client))
        .collect::<Result<Vec<_>>>()?;

    let mut orchestrator = Orchestrator::new(
        registry,
        stores,
        Arc::new(ContentCheck::from_config(&config.pipeline)),
        notifiers,
        RunSettings::from_config(config)?,
    );
    for source in &config.sources {
        if let Some(priority) = source.priority {
            orchestrator.set_priority(&source.id, priority);
        }
    }

    log::info!(
        "Configured {} sources and {} channels",
        config.sources.len(),
        config.channels.len()
    );
    Ok(orchestrator)
}

/// Copy of `config` whose channels only log, for runs that must not send.
pub fn dry_run_config(config: &Config) -> Config {
    let mut config = config.clone();
    for channel in &mut config.channels {
        channel.kind = ChannelKind::Log;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    const CONFIG: &str = r#"
[[sources]]
id = "kbs"
url = "https://news.kbs.example/list"
priority = 5

[sources.selectors]
row_selector = "ul.list li"
title_selector = "a.title"

[[sources]]
id = "mbc"
url = "https://imnews.mbc.example/list"

[[channels]]
name = "newsroom"
kind = "slack"
url = "https://hooks.example.com/T000/B000"
"#;

    #[test]
    fn test_builds_registry_in_file_order() {
        let config: Config = toml::from_str(CONFIG).unwrap();
        let orchestrator = build_orchestrator(&config, Stores::memory()).unwrap();
        assert_eq!(
            orchestrator.registry().sources().collect::<Vec<_>>(),
            vec!["kbs", "mbc"]
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config: Config = toml::from_str(CONFIG).unwrap();
        config.channels[0].url = None;
        assert!(matches!(
            build_orchestrator(&config, Stores::memory()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_out_of_range_stale_window_is_rejected() {
        let mut config: Config = toml::from_str(CONFIG).unwrap();
        config.pipeline.stale_after_secs = u64::MAX;
        assert!(matches!(
            build_orchestrator(&config, Stores::memory()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_dry_run_config_only_logs() {
        let config: Config = toml::from_str(CONFIG).unwrap();
        let dry = dry_run_config(&config);
        assert!(dry.channels.iter().all(|c| c.kind == ChannelKind::Log));
        assert_eq!(config.channels[0].kind, ChannelKind::Slack);
    }
}
