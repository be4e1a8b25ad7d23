use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Longest description kept on write; anything beyond is cut and suffixed with `...`.
pub const MAX_DESCRIPTION_LENGTH: usize = 10_000;

/// Shortest tag returned by storage reads.
pub const MIN_TAG_LENGTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Assigned by the storage backend on first insert.
    pub id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub domain: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub screenshot: Option<Screenshot>,
    pub parsed: Option<ArticleParsed>,
    pub source: String,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let url = url.into();
        let domain = host_of(&url);
        Self {
            id: None,
            timestamp,
            title: title.into(),
            description: None,
            url,
            domain,
            tags: Vec::new(),
            screenshot: None,
            parsed: None,
            source: source.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// The stored domain, or the host of `url` when none was set.
    pub fn domain(&self) -> Option<String> {
        self.domain.clone().or_else(|| host_of(&self.url))
    }

    pub fn has_screenshot(&self) -> bool {
        self.screenshot.as_ref().map_or(false, Screenshot::has_data)
    }

    pub fn has_parsed(&self) -> bool {
        self.parsed.as_ref().map_or(false, ArticleParsed::has_body)
    }

    /// Drops blank tags and duplicates, keeping first-seen order.
    pub fn normalize_tags(&mut self) {
        let mut seen = BTreeSet::new();
        self.tags.retain(|tag| {
            let trimmed = tag.trim();
            !trimmed.is_empty() && seen.insert(trimmed.to_string())
        });
    }

    /// Whole days between `now` and the article timestamp, in either direction.
    pub fn age_in_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_days().abs()
    }

    /// Not newer than `now`.
    pub fn is_recent(&self, now: DateTime<Utc>) -> bool {
        self.timestamp <= now
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    /// Standard base64 image bytes.
    pub data: Option<String>,
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub mime_type: Option<String>,
}

impl Screenshot {
    pub fn has_data(&self) -> bool {
        self.data.as_deref().map_or(false, |d| !d.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleParsed {
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub published: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub videos: BTreeSet<String>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    pub description: Option<String>,
    pub body: String,
}

impl ArticleParsed {
    pub fn has_body(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Storage form of a tag: trimmed, lower-cased, whitespace runs as `-`, `#`-prefixed.
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    if tag.starts_with('#') {
        tag
    } else {
        format!("#{}", tag)
    }
}

pub fn truncate_description(description: &str) -> String {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        let mut cut: String = description.chars().take(MAX_DESCRIPTION_LENGTH).collect();
        cut.push_str("...");
        cut
    } else {
        description.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_domain_derived_from_url() {
        let mut article = Article::new("T", "https://blog.example.com/a/b?c=d", "test", Utc::now());
        assert_eq!(article.domain(), Some("blog.example.com".to_string()));

        article.domain = None;
        assert_eq!(article.domain(), Some("blog.example.com".to_string()));

        let article = Article::new("T", "not a url", "test", Utc::now());
        assert_eq!(article.domain(), None);
    }

    #[test]
    fn test_normalize_tags() {
        let mut article = Article::new("T", "http://x/1", "test", Utc::now())
            .with_tags(["rust", "", "  ", "async", "rust"]);
        article.normalize_tags();
        assert_eq!(article.tags, vec!["rust", "async"]);
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  Machine   Learning "), "#machine-learning");
        assert_eq!(normalize_tag("#Rust"), "#rust");
    }

    #[test]
    fn test_age_in_days() {
        let now = Utc::now();
        let old = Article::new("T", "http://x/1", "test", now - Duration::days(400));
        assert_eq!(old.age_in_days(now), 400);
        assert!(old.is_recent(now));

        let future = Article::new("T", "http://x/2", "test", now + Duration::days(3));
        assert_eq!(future.age_in_days(now), 3);
        assert!(!future.is_recent(now));
    }

    #[test]
    fn test_enrichment_presence() {
        let mut article = Article::new("T", "http://x/1", "test", Utc::now());
        assert!(!article.has_screenshot());
        assert!(!article.has_parsed());

        article.screenshot = Some(Screenshot { data: Some("   ".into()), ..Default::default() });
        assert!(!article.has_screenshot());
        article.screenshot = Some(Screenshot { data: Some("aGVsbG8=".into()), ..Default::default() });
        assert!(article.has_screenshot());

        article.parsed = Some(ArticleParsed { url: article.url.clone(), body: "text".into(), ..Default::default() });
        assert!(article.has_parsed());
    }

    #[test]
    fn test_truncate_description() {
        let long = "a".repeat(MAX_DESCRIPTION_LENGTH + 5);
        let cut = truncate_description(&long);
        assert_eq!(cut.len(), MAX_DESCRIPTION_LENGTH + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_description("short"), "short");
    }

    #[test]
    fn test_timestamp_serializes_as_millis() {
        let ts = DateTime::from_timestamp_millis(1_600_000_000_123).unwrap();
        let article = Article::new("T", "http://x/1", "test", ts);
        let json = serde_json::to_value(&article).unwrap();
        assert_eq!(json["timestamp"], 1_600_000_000_123i64);
    }
}
