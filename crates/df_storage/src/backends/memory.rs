use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use df_core::types::{normalize_tag, truncate_description, MIN_TAG_LENGTH};
use df_core::{Article, ArticleStorage, Error, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{StorageBackend, StorageConfig};

#[derive(Default)]
pub struct MemoryStore {
    articles: HashMap<String, Article>,
    ids_by_url: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, article: &Article) -> Result<String> {
        if self.ids_by_url.contains_key(&article.url) {
            return Err(Error::DuplicateArticle(article.url.clone()));
        }
        let id = Uuid::new_v4().to_string();
        let mut stored = article.clone();
        stored.id = Some(id.clone());
        stored.domain = article.domain();
        stored.description = article.description.as_deref().map(truncate_description);
        stored.tags = normalized_tags(&article.tags);
        if let Some(parsed) = stored.parsed.as_mut() {
            parsed.description = parsed.description.as_deref().map(truncate_description);
        }
        self.ids_by_url.insert(stored.url.clone(), id.clone());
        self.articles.insert(id.clone(), stored);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<Article> {
        self.articles.get(id).map(readable)
    }

    pub fn get_by_url(&self, url: &str) -> Option<Article> {
        self.ids_by_url.get(url).and_then(|id| self.get(id))
    }

    fn stored_mut(&mut self, article: &Article) -> Result<&mut Article> {
        let id = article.id.as_deref().ok_or_else(|| {
            Error::Storage(format!("Cannot update {} without an identifier", article.url))
        })?;
        self.articles
            .get_mut(id)
            .ok_or_else(|| Error::Storage(format!("No article stored with id {}", id)))
    }

    pub fn set_screenshot(&mut self, article: &Article) -> Result<()> {
        self.stored_mut(article)?.screenshot = article.screenshot.clone();
        Ok(())
    }

    pub fn set_parsed(&mut self, article: &Article) -> Result<()> {
        let Some(parsed) = article.parsed.clone() else {
            return Ok(());
        };
        self.stored_mut(article)?.parsed = Some(parsed);
        Ok(())
    }

    pub fn all(&self) -> impl Iterator<Item = &Article> {
        self.articles.values()
    }
}

fn normalized_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags.iter().filter(|t| !t.trim().is_empty()).map(|t| normalize_tag(t)) {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

fn readable(article: &Article) -> Article {
    let mut article = article.clone();
    article.tags.retain(|t| t.chars().count() >= MIN_TAG_LENGTH);
    article
}

fn newest_first(mut articles: Vec<Article>) -> Vec<Article> {
    articles.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.url.cmp(&b.url)));
    articles
}

/// Process-local gateway; contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn connect(_config: &StorageConfig) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn exists_by_title_and_url(&self, title: &str, url: &str) -> Result<bool> {
        let store = self.store.read().await;
        Ok(store.get_by_url(url).map_or(false, |a| a.title == title))
    }

    async fn exists_by_url(&self, url: &str) -> Result<bool> {
        Ok(self.store.read().await.ids_by_url.contains_key(url))
    }

    async fn exists_parsed(&self, url: &str) -> Result<bool> {
        let store = self.store.read().await;
        Ok(store.get_by_url(url).map_or(false, |a| a.has_parsed()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Article>> {
        Ok(self.store.read().await.get(id))
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>> {
        Ok(self.store.read().await.get_by_url(url))
    }

    async fn insert_article(&self, article: &Article) -> Result<String> {
        self.store.write().await.insert(article)
    }

    async fn should_request_screenshot(&self, title: &str, url: &str) -> Result<bool> {
        let store = self.store.read().await;
        Ok(!store
            .get_by_url(url)
            .map_or(false, |a| a.title == title && a.has_screenshot()))
    }

    async fn update_screenshot(&self, article: &Article) -> Result<()> {
        self.store.write().await.set_screenshot(article)
    }

    async fn update_parsed(&self, article: &Article) -> Result<()> {
        self.store.write().await.set_parsed(article)
    }

    async fn articles_with_no_screenshot(&self) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        Ok(newest_first(
            store.all().filter(|a| !a.has_screenshot()).map(readable).collect(),
        ))
    }

    async fn recent_articles(&self, limit: usize) -> Result<Vec<Article>> {
        let now = Utc::now();
        let store = self.store.read().await;
        let Some(latest) = store.all().filter(|a| a.is_recent(now)).map(|a| a.timestamp).max() else {
            return Ok(Vec::new());
        };
        let recent = store
            .all()
            .filter(|a| a.timestamp == latest)
            .map(readable)
            .collect();
        Ok(newest_first(recent).into_iter().take(limit).collect())
    }

    async fn count_articles(&self) -> Result<usize> {
        Ok(self.store.read().await.articles.len())
    }

    async fn check_health(&self) -> Result<()> {
        let _store = self.store.read().await;
        Ok(())
    }
}
