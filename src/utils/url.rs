// src/utils/url.rs

//! URL manipulation utilities.

use url::{Url, form_urlencoded};

/// Query parameters that only carry campaign/referral tracking.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "yclid", "igshid", "mc_cid", "mc_eid", "_ga", "ref",
    "ref_src", "cmpid", "spm",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Normalize an article URL into a stable comparison key.
///
/// Tracking parameters and the fragment are dropped, the host is
/// case-folded and trailing slashes are stripped from the path. The
/// remaining query parameters keep their original order.
///
/// # Examples
/// ```
/// use newsdesk::utils::url::normalize_url;
///
/// assert_eq!(
///     normalize_url("https://News.Example.COM/world/123/?utm_source=x&page=2").unwrap(),
///     "https://news.example.com/world/123?page=2"
/// );
/// ```
pub fn normalize_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();

    let mut normalized = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        normalized.push_str(&format!(":{port}"));
    }
    normalized.push_str(parsed.path().trim_end_matches('/'));

    // Segments are kept as written so escaped `&` and `=` stay escaped.
    let kept: Vec<&str> = parsed
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| {
            form_urlencoded::parse(segment.as_bytes())
                .next()
                .is_none_or(|(key, _)| !is_tracking_param(&key))
        })
        .collect();

    if !kept.is_empty() {
        normalized.push('?');
        normalized.push_str(&kept.join("&"));
    }

    Some(normalized)
}

/// Extract a stable article identifier from a URL.
///
/// Well-known article keys in the query string win, then any key that
/// looks like an id, then the trailing digit run of the last path segment.
pub fn extract_native_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut fallback_keyed: Option<String> = None;

    for (key, value) in parsed.query_pairs() {
        if value.is_empty() {
            continue;
        }

        let key_lower = key.to_lowercase();
        let value_string = value.to_string();

        if matches!(
            key_lower.as_str(),
            "articleid"
                | "article_id"
                | "articleno"
                | "article_no"
                | "newsid"
                | "news_id"
                | "ncd"
                | "idx"
                | "seq"
                | "no"
                | "id"
        ) {
            return Some(value_string);
        }

        if fallback_keyed.is_none()
            && !is_tracking_param(&key_lower)
            && (key_lower.ends_with("id")
                || key_lower.ends_with("no")
                || key_lower.contains("seq")
                || key_lower.contains("article"))
        {
            fallback_keyed = Some(value_string);
        }
    }

    if fallback_keyed.is_some() {
        return fallback_keyed;
    }

    // Trailing digit run of the last path segment, e.g. /view/8012345 or /a/art123456.html
    let pattern = regex::Regex::new(r"(\d{4,})[^/\d]*/?$").ok()?;
    pattern
        .captures(parsed.path())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_tracking_and_slash() {
        assert_eq!(
            normalize_url("https://NEWS.kbs.co.kr/news/view/?utm_source=tw&utm_medium=social")
                .as_deref(),
            Some("https://news.kbs.co.kr/news/view")
        );
    }

    #[test]
    fn test_normalize_keeps_meaningful_params() {
        assert_eq!(
            normalize_url("https://imnews.imbc.com/read.html?fbclid=zz&idx=6553&page=1#top")
                .as_deref(),
            Some("https://imnews.imbc.com/read.html?idx=6553&page=1")
        );
    }

    #[test]
    fn test_normalize_root_and_port() {
        assert_eq!(
            normalize_url("http://Example.com:8080/").as_deref(),
            Some("http://example.com:8080")
        );
    }

    #[test]
    fn test_normalize_equivalent_urls_match() {
        let a = normalize_url("https://example.com/a/b/?gclid=1");
        let b = normalize_url("https://EXAMPLE.com/a/b");
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_keeps_escaped_separators() {
        let escaped = normalize_url("https://ex.com/search?q=a%26b%3Dc&utm_medium=x");
        let split = normalize_url("https://ex.com/search?q=a&b=c");
        assert_eq!(escaped.as_deref(), Some("https://ex.com/search?q=a%26b%3Dc"));
        assert_eq!(split.as_deref(), Some("https://ex.com/search?q=a&b=c"));
        assert_ne!(escaped, split);
    }

    #[test]
    fn test_normalize_drops_encoded_tracking_key() {
        assert_eq!(
            normalize_url("https://ex.com/a?utm%5Fsource=x&id=7").as_deref(),
            Some("https://ex.com/a?id=7")
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(normalize_url("not a url"), None);
    }

    #[test]
    fn test_extract_native_id_query_key() {
        let url = "https://news.sbs.co.kr/news/endPage.do?news_id=N1007512345&plink=ORI";
        assert_eq!(extract_native_id(url), Some("N1007512345".to_string()));
    }

    #[test]
    fn test_extract_native_id_keyed_fallback() {
        let url = "https://example.com/view?storyNo=778&mode=view";
        assert_eq!(extract_native_id(url), Some("778".to_string()));
    }

    #[test]
    fn test_extract_native_id_path_digits() {
        let url = "https://news.kbs.co.kr/news/pc/view/view.do/8012345";
        assert_eq!(extract_native_id(url), Some("8012345".to_string()));
    }

    #[test]
    fn test_extract_native_id_none_for_short_paths() {
        assert_eq!(extract_native_id("https://example.com/world/"), None);
        assert_eq!(extract_native_id("https://example.com/page2"), None);
    }

    #[test]
    fn test_extract_native_id_path_with_suffix() {
        let url = "https://imnews.example.com/2024/society/article/art6612345_36515.html";
        assert_eq!(extract_native_id(url), Some("36515".to_string()));
        let url = "https://news.example.com/a/art6612345.html";
        assert_eq!(extract_native_id(url), Some("6612345".to_string()));
    }
}
