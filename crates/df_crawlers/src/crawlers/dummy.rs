use async_trait::async_trait;
use chrono::{DateTime, Utc};
use df_core::{Article, Crawler, Result};
use tracing::debug;

use crate::fanout::{fetch_all, DEFAULT_FANOUT};

pub const NAME: &str = "dummy";

/// Serves three fixed articles, stamped with the current time, one per
/// simulated page.
#[derive(Debug, Clone)]
pub struct DummyCrawler {
    fanout: usize,
}

impl Default for DummyCrawler {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyCrawler {
    const BASE_URL: &'static str = "https://dev-feed.example.com";

    pub fn new() -> Self {
        Self::with_fanout(DEFAULT_FANOUT)
    }

    pub fn with_fanout(fanout: usize) -> Self {
        Self { fanout }
    }

    fn page(i: u32, now: DateTime<Utc>) -> Article {
        Article::new(
            format!("Article {}", i),
            format!("{}/article{}", Self::BASE_URL, i),
            Self::BASE_URL,
            now,
        )
        .with_description(format!("Dummy article number {}", i))
        .with_tags([format!("tag{}", i), "dev feed".to_string()])
    }
}

#[async_trait]
impl Crawler for DummyCrawler {
    fn name(&self) -> &str {
        NAME
    }

    fn source(&self) -> &str {
        Self::BASE_URL
    }

    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        let now = Utc::now();
        let mut articles = fetch_all(1..=3u32, self.fanout, |i| async move { Ok(vec![Self::page(i, now)]) }).await;
        articles.sort_by(|a, b| a.url.cmp(&b.url));
        debug!("🦗 {} produced {} articles", NAME, articles.len());
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dummy_articles() {
        let articles = DummyCrawler::with_fanout(1).fetch_articles().await.unwrap();
        assert_eq!(articles.len(), 3);
        assert_eq!(articles[0].url, "https://dev-feed.example.com/article1");
        for article in &articles {
            assert!(article.id.is_none());
            assert_eq!(article.domain.as_deref(), Some("dev-feed.example.com"));
            assert_eq!(article.tags.len(), 2);
            assert_eq!(article.timestamp, articles[0].timestamp);
        }
    }
}
