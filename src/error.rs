// src/error.rs

//! Unified error handling for the newsdesk pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// No crawler is registered under the requested source tag
    #[error("Unknown source '{0}'")]
    UnknownSource(String),

    /// An active queue entry already exists for the article
    #[error("Article {article_id} already has an active queue entry")]
    DuplicateEntry { article_id: String },

    /// Illegal lifecycle transition (programming error, do not retry)
    #[error("Invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// A published record already exists for the article
    #[error("Article {article_id} is already published")]
    AlreadyPublished { article_id: String },

    /// Crawler fetch or parse failed
    #[error("Fetch failed for source {source_tag}: {message}")]
    SourceFetch { source_tag: String, message: String },

    /// Notification channel failed to deliver
    #[error("Delivery failed on channel {channel}: {message}")]
    NotificationDelivery { channel: String, message: String },

    /// A shared store cannot be reached or written
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Lookup by id found nothing
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a source fetch error.
    pub fn fetch(source: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SourceFetch {
            source_tag: source.into(),
            message: message.to_string(),
        }
    }

    /// Create a notification delivery error.
    pub fn delivery(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::NotificationDelivery {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Create a store unavailability error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::StoreUnavailable(message.to_string())
    }

    /// Create an invalid transition error.
    pub fn transition(
        entity: &'static str,
        id: impl Into<String>,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether this error means a shared store is broken and the run must halt.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
