use async_trait::async_trait;
use crate::types::Article;
use crate::Result;

#[async_trait]
pub trait Crawler: Send + Sync {
    /// Registry name, also used in config enable flags
    fn name(&self) -> &str;

    /// Where the articles come from, e.g. the site root
    fn source(&self) -> &str;

    /// Returns the articles currently published by the source.
    ///
    /// Articles come back without an identifier. Calling this repeatedly is
    /// fine: detecting articles that were already stored is up to the caller.
    async fn fetch_articles(&self) -> Result<Vec<Article>>;
}
