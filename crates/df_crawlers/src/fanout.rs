//! Bounded sub-fetches for crawlers that pull from several pages or feeds.

use std::future::Future;

use df_core::{Article, Result};
use futures::stream::{self, StreamExt};
use tracing::warn;

pub const DEFAULT_FANOUT: usize = 5;

/// Runs `fetch` for each input with at most `limit` in flight and flattens the
/// results. A failing sub-fetch is logged and contributes nothing.
pub async fn fetch_all<I, T, F, Fut>(inputs: I, limit: usize, fetch: F) -> Vec<Article>
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display + Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<Vec<Article>>>,
{
    let results: Vec<(T, Result<Vec<Article>>)> = stream::iter(inputs)
        .map(|input| {
            let label = input.clone();
            let fut = fetch(input);
            async move { (label, fut.await) }
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    let mut articles = Vec::new();
    for (input, result) in results {
        match result {
            Ok(batch) => articles.extend(batch),
            Err(e) => warn!("⚠️ Sub-fetch {} failed: {}", input, e),
        }
    }
    articles
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use df_core::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failed_sub_fetch_is_skipped() {
        let articles = fetch_all(1..=4, DEFAULT_FANOUT, |page: u32| async move {
            if page == 3 {
                return Err(Error::Crawler(format!("page {} is down", page)));
            }
            Ok(vec![Article::new(
                format!("Page {}", page),
                format!("https://example.com/{}", page),
                "test",
                Utc::now(),
            )])
        })
        .await;

        assert_eq!(articles.len(), 3);
        assert!(articles.iter().all(|a| a.url != "https://example.com/3"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        fetch_all(0..12, 2, |_: u32| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
