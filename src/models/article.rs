//! Article data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::utils::url::normalize_url;

/// An article as reported by a crawler, before identity is assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RawArticle {
    /// Headline
    pub title: String,

    /// Absolute URL to the article
    pub url: String,

    /// Identifier the source itself uses, if exposed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_id: Option<String>,

    /// Byline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Body or summary text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Publication time reported by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl RawArticle {
    /// Key used to identify this article within its source.
    ///
    /// An explicit native id wins; otherwise the normalized URL is used.
    /// Returns `None` when the crawler reported neither.
    pub fn native_key(&self) -> Option<String> {
        if let Some(native) = self.native_id.as_deref().map(str::trim) {
            if !native.is_empty() {
                return Some(format!("id:{native}"));
            }
        }

        let url = self.url.trim();
        if url.is_empty() {
            return None;
        }
        let normalized = normalize_url(url).unwrap_or_else(|| url.to_string());
        Some(format!("url:{normalized}"))
    }
}

/// A crawled article owned by the article store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleRecord {
    /// Stable identifier derived from `source` and the native key
    pub id: String,

    /// Source tag (e.g. broadcaster name)
    pub source: String,

    /// Native key the id was derived from (`id:...` or `url:...`)
    pub native_key: String,

    pub title: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    /// Time of ingestion
    pub collected_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// Build a record from a raw crawler item.
    ///
    /// Returns `None` when the item carries no usable native key.
    pub fn from_raw(source: &str, raw: RawArticle, collected_at: DateTime<Utc>) -> Option<Self> {
        let native_key = raw.native_key()?;
        Some(Self {
            id: derive_id(&[source, &native_key]),
            source: source.to_string(),
            native_key,
            title: raw.title,
            url: raw.url,
            author: raw.author,
            content: raw.content,
            published_at: raw.published_at,
            collected_at,
        })
    }

    /// Format the article for display using a template.
    ///
    /// Supported placeholders:
    /// - `{id}`, `{source}`, `{title}`, `{url}`
    /// - `{author}`, `{published_at}` (empty when unknown)
    ///
    /// Placeholders are substituted in one pass, so braces inside field
    /// values are copied as they are. Unknown placeholders stay literal.
    pub fn format(&self, template: &str) -> String {
        let published = self
            .published_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            let Some(close) = tail.find('}') else {
                rest = tail;
                break;
            };

            let value = match &tail[1..close] {
                "id" => Some(self.id.as_str()),
                "source" => Some(self.source.as_str()),
                "title" => Some(self.title.as_str()),
                "url" => Some(self.url.as_str()),
                "author" => Some(self.author.as_deref().unwrap_or("")),
                "published_at" => Some(published.as_str()),
                _ => None,
            };
            match value {
                Some(value) => {
                    out.push_str(value);
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Derive an opaque identifier from ordered parts.
///
/// Parts are joined with the ASCII unit separator so that
/// `("ab", "c")` and `("a", "bc")` never collide.
pub fn derive_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(&hasher.finalize()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(url: &str, native_id: Option<&str>) -> RawArticle {
        RawArticle {
            title: "Breaking".to_string(),
            url: url.to_string(),
            native_id: native_id.map(str::to_string),
            ..RawArticle::default()
        }
    }

    #[test]
    fn test_native_key_prefers_native_id() {
        let item = raw("https://example.com/a?utm_source=x", Some(" 991 "));
        assert_eq!(item.native_key().as_deref(), Some("id:991"));
    }

    #[test]
    fn test_native_key_falls_back_to_normalized_url() {
        let item = raw("https://Example.com/a/?utm_source=x", None);
        assert_eq!(item.native_key().as_deref(), Some("url:https://example.com/a"));
    }

    #[test]
    fn test_native_key_missing() {
        assert_eq!(raw("  ", Some("")).native_key(), None);
    }

    #[test]
    fn test_id_is_stable_across_recrawls() {
        let now = Utc::now();
        let first = ArticleRecord::from_raw("kbs", raw("https://a.com/1?fbclid=1", None), now);
        let second = ArticleRecord::from_raw("kbs", raw("https://A.com/1/", None), now);
        assert_eq!(first.unwrap().id, second.unwrap().id);
    }

    #[test]
    fn test_id_depends_on_source() {
        let now = Utc::now();
        let a = ArticleRecord::from_raw("kbs", raw("", Some("7")), now).unwrap();
        let b = ArticleRecord::from_raw("mbc", raw("", Some("7")), now).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_derive_id_separator() {
        assert_ne!(derive_id(&["ab", "c"]), derive_id(&["a", "bc"]));
        assert_eq!(derive_id(&["x"]).len(), 32);
    }

    #[test]
    fn test_format() {
        let record = ArticleRecord::from_raw(
            "sbs",
            raw("https://news.sbs.co.kr/1", Some("1")),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            record.format("[{source}] {title} <{url}>{author}"),
            "[sbs] Breaking <https://news.sbs.co.kr/1>"
        );
    }

    #[test]
    fn test_format_does_not_expand_placeholders_in_values() {
        let mut item = raw("https://news.sbs.co.kr/2", Some("2"));
        item.title = "Why {url} and {author} matter".to_string();
        item.author = Some("Kim {title}".to_string());
        let record = ArticleRecord::from_raw("sbs", item, Utc::now()).unwrap();

        assert_eq!(
            record.format("{title} / {author} / {url}"),
            "Why {url} and {author} matter / Kim {title} / https://news.sbs.co.kr/2"
        );
    }

    #[test]
    fn test_format_keeps_unknown_and_unclosed_braces() {
        let record =
            ArticleRecord::from_raw("sbs", raw("https://e.com/3", Some("3")), Utc::now()).unwrap();
        assert_eq!(record.format("{{title}} {nope} {source"), "{Breaking} {nope} {source");
    }
}
