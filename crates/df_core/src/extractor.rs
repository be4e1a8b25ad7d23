use async_trait::async_trait;
use crate::types::{Article, ArticleParsed, Screenshot};

/// Best-effort screenshot provider.
///
/// Never fails: errors are logged inside the implementation and reported as
/// `None`, which leaves the article eligible for the next screenshot sweep.
#[async_trait]
pub trait ScreenshotExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract_screenshot(&self, article: &Article) -> Option<Screenshot>;
}

/// Best-effort full-text provider, same failure contract as [`ScreenshotExtractor`].
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract_content(&self, article: &Article) -> Option<ArticleParsed>;
}
