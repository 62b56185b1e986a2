// src/services/selector.rs

//! Selector-driven listing page crawler.
//!
//! Fetches a source's listing page and extracts articles using the CSS
//! selectors configured for that source.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{CleaningConfig, RawArticle, SourceConfig, SourceSelectors};
use crate::services::Crawler;
use crate::utils::url::extract_native_id;
use crate::utils::{normalize_whitespace, resolve_url};

/// Parsed selectors for one source.
struct CompiledSelectors {
    row: Selector,
    title: Selector,
    link: Option<Selector>,
    date: Option<Selector>,
    author: Option<Selector>,
    content: Option<Selector>,
}

impl CompiledSelectors {
    fn compile(selectors: &SourceSelectors) -> Result<Self> {
        let optional = |s: &Option<String>| s.as_deref().map(parse_selector).transpose();
        Ok(Self {
            row: parse_selector(&selectors.row_selector)?,
            title: parse_selector(&selectors.title_selector)?,
            link: optional(&selectors.link_selector)?,
            date: optional(&selectors.date_selector)?,
            author: optional(&selectors.author_selector)?,
            content: optional(&selectors.content_selector)?,
        })
    }
}

/// Crawler for one configured source.
pub struct SelectorCrawler {
    source: SourceConfig,
    base_url: url::Url,
    selectors: CompiledSelectors,
    cleaning: Arc<CleaningConfig>,
    client: Client,
}

impl SelectorCrawler {
    /// Create a crawler, validating the source URL and selectors up front.
    pub fn new(
        source: SourceConfig,
        cleaning: Arc<CleaningConfig>,
        client: Client,
    ) -> Result<Self> {
        let base_url = url::Url::parse(&source.url)?;
        let selectors = CompiledSelectors::compile(&source.selectors)?;
        Ok(Self {
            source,
            base_url,
            selectors,
            cleaning,
            client,
        })
    }

    fn parse_row(&self, row: &ElementRef) -> Option<RawArticle> {
        let title_elem = row.select(&self.selectors.title).next()?;
        let title = self.cleaning.clean_title(&element_text(&title_elem));
        if title.is_empty() {
            return None;
        }

        // The row itself may be the anchor.
        let link_elem = self
            .selectors
            .link
            .as_ref()
            .and_then(|sel| row.select(sel).next())
            .unwrap_or(title_elem);
        let raw_link = link_elem
            .value()
            .attr(&self.source.selectors.attr_name)
            .or_else(|| row.value().attr(&self.source.selectors.attr_name))
            .unwrap_or("");
        if raw_link.trim().is_empty() {
            return None;
        }
        let url = resolve_url(&self.base_url, raw_link.trim());

        let text_of = |sel: &Option<Selector>| {
            sel.as_ref()
                .and_then(|s| row.select(s).next())
                .map(|e| element_text(&e))
                .filter(|t| !t.is_empty())
        };

        let published_at = match (
            text_of(&self.selectors.date),
            self.source.selectors.date_format.as_deref(),
        ) {
            (Some(text), Some(format)) => {
                let parsed = parse_date(&text, format);
                if parsed.is_none() {
                    log::debug!(
                        "Source {}: unparseable date '{}' (format {})",
                        self.source.id,
                        text,
                        format
                    );
                }
                parsed
            }
            _ => None,
        };

        Some(RawArticle {
            native_id: extract_native_id(&url),
            title,
            url,
            author: text_of(&self.selectors.author),
            content: text_of(&self.selectors.content),
            published_at,
        })
    }
}

#[async_trait]
impl Crawler for SelectorCrawler {
    async fn fetch(&self) -> Result<String> {
        crate::utils::http::fetch_text(&self.client, &self.source.url).await
    }

    fn parse(&self, payload: &str) -> Result<Vec<RawArticle>> {
        let document = Html::parse_document(payload);
        let articles: Vec<RawArticle> = document
            .select(&self.selectors.row)
            .filter_map(|row| self.parse_row(&row))
            .collect();

        log::debug!(
            "Source {}: parsed {} articles",
            self.source.id,
            articles.len()
        );
        Ok(articles)
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn element_text(elem: &ElementRef) -> String {
    normalize_whitespace(&elem.text().collect::<String>())
}

/// Parse a listing date with a chrono format. Naive times are taken as UTC;
/// date-only formats resolve to midnight.
fn parse_date(text: &str, format: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_str(text, format) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
