//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Longest accepted stale window (30 days).
pub const MAX_STALE_AFTER_SECS: u64 = 30 * 24 * 60 * 60;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Queue draining and recovery settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Notification delivery settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Text preprocessing settings
    #[serde(default)]
    pub cleaning: CleaningConfig,

    /// Registered sources, crawled in this order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Notification channels
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, or return the default if the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Err(AppError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                log::warn!("No config at {:?}. Using defaults.", path);
                Ok(Self::default())
            }
            result => result,
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.pipeline.processing_workers == 0 {
            return Err(AppError::validation(
                "pipeline.processing_workers must be > 0",
            ));
        }
        if self.pipeline.stale_after_secs == 0 {
            return Err(AppError::validation("pipeline.stale_after_secs must be > 0"));
        }
        if self.pipeline.stale_after_secs > MAX_STALE_AFTER_SECS {
            return Err(AppError::validation(format!(
                "pipeline.stale_after_secs must be <= {MAX_STALE_AFTER_SECS}"
            )));
        }
        if self.notify.timeout_secs == 0 {
            return Err(AppError::validation("notify.timeout_secs must be > 0"));
        }

        let mut source_ids = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(AppError::validation("source id is empty"));
            }
            if !source_ids.insert(source.id.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
            url::Url::parse(&source.url).map_err(|e| {
                AppError::validation(format!("source '{}' has invalid url: {e}", source.id))
            })?;
        }

        let mut channel_names = HashSet::new();
        for channel in &self.channels {
            if !channel_names.insert(channel.name.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate channel name '{}'",
                    channel.name
                )));
            }
            if channel.kind != ChannelKind::Log && channel.url.is_none() {
                return Err(AppError::validation(format!(
                    "channel '{}' requires a url",
                    channel.name
                )));
            }
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds, applied to each fetch+parse
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Number of sources crawled concurrently
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Queue draining and recovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of workers draining the queue
    #[serde(default = "defaults::processing_workers")]
    pub processing_workers: usize,

    /// Age after which a `processing` entry is considered abandoned
    #[serde(default = "defaults::stale_after")]
    pub stale_after_secs: u64,

    /// Stale requeues allowed before an entry is failed
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Priority for sources that do not set one
    #[serde(default)]
    pub default_priority: i32,

    /// Articles with less body text than this fail processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_content_chars: Option<usize>,
}

impl PipelineConfig {
    pub fn stale_after(&self) -> Result<chrono::Duration> {
        chrono_seconds(self.stale_after_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            processing_workers: defaults::processing_workers(),
            stale_after_secs: defaults::stale_after(),
            max_retries: defaults::max_retries(),
            default_priority: 0,
            min_content_chars: None,
        }
    }
}

/// Seconds as a `chrono::Duration`, or a validation error if chrono cannot hold them.
pub fn chrono_seconds(secs: u64) -> Result<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| AppError::validation(format!("{secs} seconds is out of range")))
}

/// Notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Per-channel send timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Text cleaning/preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleaningConfig {
    /// Patterns to remove from titles
    #[serde(default)]
    pub title_remove_patterns: Vec<String>,
}

impl CleaningConfig {
    /// Clean a title string.
    pub fn clean_title(&self, text: &str) -> String {
        let mut result = crate::utils::normalize_whitespace(text);
        for pattern in &self.title_remove_patterns {
            result = result.replace(pattern, "");
        }
        result.trim().to_string()
    }
}

/// A crawled source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source tag (e.g. "kbs")
    pub id: String,

    /// Listing page URL
    pub url: String,

    /// Queue priority for this source's articles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    #[serde(default)]
    pub selectors: SourceSelectors,
}

/// CSS selectors for scraping a listing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSelectors {
    /// Selector for each article item in the listing
    #[serde(default = "defaults::row_selector")]
    pub row_selector: String,

    /// Selector for the headline element within an item
    #[serde(default = "defaults::title_selector")]
    pub title_selector: String,

    /// Optional selector for the link element (if different from title)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_selector: Option<String>,

    /// Selector for a summary/body snippet within an item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_selector: Option<String>,

    /// HTML attribute name for extracting links (usually "href")
    #[serde(default = "defaults::attr_name")]
    pub attr_name: String,

    /// chrono format for the date text, e.g. "%Y.%m.%d %H:%M"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
}

impl Default for SourceSelectors {
    fn default() -> Self {
        Self {
            row_selector: defaults::row_selector(),
            title_selector: defaults::title_selector(),
            link_selector: None,
            date_selector: None,
            author_selector: None,
            content_selector: None,
            attr_name: defaults::attr_name(),
            date_format: None,
        }
    }
}

/// Kind of notification channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Slack,
    Discord,
    Webhook,
    Log,
}

/// A notification channel and its credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,

    pub kind: ChannelKind,

    /// Webhook URL; the credential for chat channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Message template (see `ArticleRecord::format`)
    #[serde(default = "defaults::template")]
    pub template: String,
}

mod defaults {
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; newsdesk/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        4
    }

    pub fn processing_workers() -> usize {
        4
    }
    pub fn stale_after() -> u64 {
        15 * 60
    }
    pub fn max_retries() -> u32 {
        3
    }

    pub fn row_selector() -> String {
        "li".into()
    }
    pub fn title_selector() -> String {
        "a".into()
    }
    pub fn attr_name() -> String {
        "href".into()
    }

    pub fn template() -> String {
        "[{source}] {title}\n{url}".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [crawler]
        max_concurrent = 2

        [pipeline]
        processing_workers = 3
        max_retries = 5

        [[sources]]
        id = "kbs"
        url = "https://news.kbs.co.kr/news/pc/main/main.html"
        priority = 10

        [sources.selectors]
        row_selector = "ul.box-contents li"
        title_selector = "p.title"
        link_selector = "a"
        date_format = "%Y.%m.%d %H:%M"

        [[channels]]
        name = "newsroom"
        kind = "slack"
        url = "https://hooks.slack.com/services/T/B/X"

        [[channels]]
        name = "audit"
        kind = "log"
    "#;

    #[test]
    fn parse_sample_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.crawler.max_concurrent, 2);
        assert_eq!(config.crawler.timeout_secs, 30);
        assert_eq!(config.pipeline.processing_workers, 3);
        assert_eq!(config.pipeline.max_retries, 5);
        assert_eq!(config.sources[0].priority, Some(10));
        assert_eq!(config.sources[0].selectors.attr_name, "href");
        assert_eq!(config.channels[0].kind, ChannelKind::Slack);
        assert_eq!(config.channels[1].template, "[{source}] {title}\n{url}");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.pipeline.processing_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn huge_stale_window_is_an_error_not_a_panic() {
        let config: Config =
            toml::from_str("[pipeline]\nstale_after_secs = 10000000000000000").unwrap();
        assert!(config.validate().is_err());
        assert!(config.pipeline.stale_after().is_err());
        assert!(chrono_seconds(u64::MAX).is_err());
    }

    #[test]
    fn stale_window_upper_bound_is_accepted() {
        let mut config = Config::default();
        config.pipeline.stale_after_secs = MAX_STALE_AFTER_SECS;
        assert!(config.validate().is_ok());
        assert_eq!(
            config.pipeline.stale_after().unwrap(),
            chrono::Duration::days(30)
        );
    }

    #[test]
    fn load_or_default_only_falls_back_when_missing() {
        let dir = tempfile::tempdir().unwrap();

        let missing = Config::load_or_default(dir.path().join("config.toml")).unwrap();
        assert!(missing.sources.is_empty());

        let path = dir.path().join("broken.toml");
        fs::write(&path, "[[sources]\nid = \"kbs\"").unwrap();
        assert!(matches!(
            Config::load_or_default(&path),
            Err(AppError::Toml(_))
        ));

        fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Config::load_or_default(&path).unwrap().sources.len(), 1);
    }

    #[test]
    fn validate_rejects_duplicate_sources() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.sources.push(config.sources[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_webhook_without_url() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.channels[0].url = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn clean_title_collapses_whitespace_and_patterns() {
        let cleaning = CleaningConfig {
            title_remove_patterns: vec!["[속보]".to_string()],
        };
        assert_eq!(cleaning.clean_title("  [속보]  Storm \n warning "), "Storm warning");
    }
}
