use async_trait::async_trait;
use crate::types::Article;
use crate::Result;

/// The pipeline's only durable-state dependency.
///
/// Implementations must tolerate concurrent reads and concurrent inserts of
/// distinct urls, and must never store two articles with the same url: a
/// second insert for a stored url fails with [`crate::Error::DuplicateArticle`].
#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    async fn exists_by_title_and_url(&self, title: &str, url: &str) -> Result<bool>;

    async fn exists_by_url(&self, url: &str) -> Result<bool>;

    /// Whether parsed content with a non-blank body is stored for `url`
    async fn exists_parsed(&self, url: &str) -> Result<bool>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Article>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>>;

    /// Store a new article and return its generated identifier
    async fn insert_article(&self, article: &Article) -> Result<String>;

    /// True unless a non-blank screenshot is already stored for `(title, url)`
    async fn should_request_screenshot(&self, title: &str, url: &str) -> Result<bool>;

    /// Overwrite the screenshot of the stored article with `article.id`
    async fn update_screenshot(&self, article: &Article) -> Result<()>;

    /// Store `article.parsed` for the stored article with `article.id`
    async fn update_parsed(&self, article: &Article) -> Result<()>;

    async fn articles_with_no_screenshot(&self) -> Result<Vec<Article>>;

    /// Articles sharing the most recent timestamp, at most `limit` of them
    async fn recent_articles(&self, limit: usize) -> Result<Vec<Article>>;

    async fn count_articles(&self) -> Result<usize>;

    /// Fails when the backend cannot be read
    async fn check_health(&self) -> Result<()>;
}
