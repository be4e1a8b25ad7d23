use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use df_core::types::{normalize_tag, truncate_description, MIN_TAG_LENGTH};
use df_core::{Article, ArticleParsed, ArticleStorage, Error, Result, Screenshot};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{StorageBackend, StorageConfig};

/// Ordered schema migrations; entry `n` is schema version `n + 1`.
const MIGRATIONS: &[&[&str]] = &[
    &[
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            link TEXT NOT NULL,
            hostname TEXT,
            screenshot_data TEXT,
            screenshot_width INTEGER,
            screenshot_height INTEGER,
            screenshot_mime_type TEXT,
            source TEXT NOT NULL
        )
        "#,
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_articles_link ON articles(link)",
        "CREATE INDEX IF NOT EXISTS idx_articles_timestamp ON articles(timestamp DESC)",
        "CREATE TABLE IF NOT EXISTS tags (name TEXT PRIMARY KEY)",
        r#"
        CREATE TABLE IF NOT EXISTS articles_tags (
            article_id TEXT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
            tag_name TEXT NOT NULL REFERENCES tags(name),
            PRIMARY KEY (article_id, tag_name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS articles_parsed (
            article_link TEXT PRIMARY KEY,
            title TEXT,
            author TEXT,
            published TEXT,
            image TEXT,
            videos TEXT,
            keywords TEXT,
            description TEXT,
            body TEXT NOT NULL
        )
        "#,
    ],
    &[
        "CREATE INDEX IF NOT EXISTS idx_articles_tags_tag_name ON articles_tags(tag_name)",
        "CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source)",
    ],
    // Add future migrations here
];

const ARTICLE_COLUMNS: &str = "id, timestamp, title, description, link, hostname, \
    screenshot_data, screenshot_width, screenshot_height, screenshot_mime_type, source";

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(format!("{}: {}", context, e))
}

pub struct SQLiteStorage {
    pool: SqlitePool,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be available at the configured path"
    }

    async fn connect(config: &StorageConfig) -> Result<Self> {
        Self::new_with_path(&config.path, config.pool_size).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path, pool_size: u32) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size.max(1))
            .connect_with(options)
            .await
            .map_err(db_err("Failed to connect to database"))?;

        info!("💾 Database located at: '{}'", db_path.display());
        run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn schema_version(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to read schema version"))
    }

    async fn hydrate(&self, row: SqliteRow) -> Result<Article> {
        let id: String = row.get("id");
        let url: String = row.get("link");
        let millis: i64 = row.get("timestamp");
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| Error::Database(format!("Invalid timestamp {} for {}", millis, url)))?;

        let screenshot_data: Option<String> = row.get("screenshot_data");
        let screenshot_width: Option<i64> = row.get("screenshot_width");
        let screenshot_height: Option<i64> = row.get("screenshot_height");
        let screenshot_mime_type: Option<String> = row.get("screenshot_mime_type");
        let screenshot = if screenshot_data.is_none()
            && screenshot_width.is_none()
            && screenshot_height.is_none()
            && screenshot_mime_type.is_none()
        {
            None
        } else {
            Some(Screenshot {
                data: screenshot_data,
                width: screenshot_width.and_then(|w| u32::try_from(w).ok()),
                height: screenshot_height.and_then(|h| u32::try_from(h).ok()),
                mime_type: screenshot_mime_type,
            })
        };

        let tags: Vec<String> = sqlx::query_scalar(
            "SELECT tag_name FROM articles_tags WHERE article_id = ? ORDER BY tag_name",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to load tags"))?;

        let parsed = self.load_parsed(&url).await?;

        Ok(Article {
            id: Some(id),
            timestamp,
            title: row.get("title"),
            description: row.get("description"),
            domain: row.get("hostname"),
            url,
            tags: tags
                .into_iter()
                .filter(|t| t.chars().count() >= MIN_TAG_LENGTH)
                .collect(),
            screenshot,
            parsed,
            source: row.get("source"),
        })
    }

    async fn load_parsed(&self, url: &str) -> Result<Option<ArticleParsed>> {
        let row = sqlx::query(
            "SELECT title, author, published, image, videos, keywords, description, body \
             FROM articles_parsed WHERE article_link = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to load parsed content"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let videos: Option<String> = row.get("videos");
        let keywords: Option<String> = row.get("keywords");
        let image: Option<String> = row.get("image");
        Ok(Some(ArticleParsed {
            url: url.to_string(),
            title: row.get("title"),
            author: row.get("author"),
            published: row.get("published"),
            image: image.filter(|i| !i.trim().is_empty()),
            videos: decode_set(videos.as_deref())?,
            keywords: decode_set(keywords.as_deref())?,
            description: row.get("description"),
            body: row.get("body"),
        }))
    }

    async fn hydrate_all(&self, rows: Vec<SqliteRow>) -> Result<Vec<Article>> {
        let mut articles = Vec::with_capacity(rows.len());
        for row in rows {
            articles.push(self.hydrate(row).await?);
        }
        Ok(articles)
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(db_err("Failed to create schema_migrations"))?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
        .fetch_one(pool)
        .await
        .map_err(db_err("Failed to read schema version"))?;

    for (i, statements) in MIGRATIONS.iter().enumerate() {
        let version = i as i64 + 1;
        if version <= current {
            continue;
        }
        let mut tx = pool.begin().await.map_err(db_err("Failed to start migration"))?;
        for statement in statements.iter() {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", version, e)))?;
        }
        sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to record migration"))?;
        tx.commit().await.map_err(db_err("Failed to commit migration"))?;
        info!("📐 Applied schema migration {}", version);
    }
    Ok(())
}

fn encode_set(values: &BTreeSet<String>) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

fn decode_set(raw: Option<&str>) -> Result<BTreeSet<String>> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(raw)?),
        _ => Ok(BTreeSet::new()),
    }
}

async fn upsert_parsed<'c, E>(executor: E, parsed: &ArticleParsed) -> Result<()>
where
    E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO articles_parsed
            (article_link, title, author, published, image, videos, keywords, description, body)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(article_link) DO UPDATE SET
            title = excluded.title,
            author = excluded.author,
            published = excluded.published,
            image = excluded.image,
            videos = excluded.videos,
            keywords = excluded.keywords,
            description = excluded.description,
            body = excluded.body
        "#,
    )
    .bind(&parsed.url)
    .bind(&parsed.title)
    .bind(&parsed.author)
    .bind(&parsed.published)
    .bind(parsed.image.as_deref().filter(|i| !i.trim().is_empty()))
    .bind(encode_set(&parsed.videos)?)
    .bind(encode_set(&parsed.keywords)?)
    .bind(parsed.description.as_deref().map(truncate_description))
    .bind(&parsed.body)
    .execute(executor)
    .await
    .map_err(db_err("Failed to store parsed content"))?;
    Ok(())
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn exists_by_title_and_url(&self, title: &str, url: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE title = ? AND link = ?")
            .bind(title)
            .bind(url)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to check article existence"))?;
        Ok(count > 0)
    }

    async fn exists_by_url(&self, url: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE link = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to check article existence"))?;
        Ok(count > 0)
    }

    async fn exists_parsed(&self, url: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM articles_parsed WHERE article_link = ? AND TRIM(body) != ''",
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Failed to check parsed content"))?;
        Ok(count > 0)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Article>> {
        let row = sqlx::query(&format!("SELECT {} FROM articles WHERE id = ? LIMIT 1", ARTICLE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to find article by id"))?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>> {
        let row = sqlx::query(&format!("SELECT {} FROM articles WHERE link = ? LIMIT 1", ARTICLE_COLUMNS))
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to find article by url"))?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn insert_article(&self, article: &Article) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let screenshot = article.screenshot.clone().unwrap_or_default();
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to start transaction"))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO articles
                (id, timestamp, title, description, link, hostname,
                 screenshot_data, screenshot_width, screenshot_height, screenshot_mime_type, source)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(article.timestamp.timestamp_millis())
        .bind(&article.title)
        .bind(article.description.as_deref().map(truncate_description))
        .bind(&article.url)
        .bind(article.domain())
        .bind(&screenshot.data)
        .bind(screenshot.width.map(i64::from))
        .bind(screenshot.height.map(i64::from))
        .bind(&screenshot.mime_type)
        .bind(&article.source)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    Error::DuplicateArticle(article.url.clone())
                }
                other => Error::Database(format!("Failed to store article: {}", other)),
            });
        }

        if let Some(parsed) = &article.parsed {
            upsert_parsed(&mut *tx, parsed).await?;
        }

        let tags: BTreeSet<String> = article
            .tags
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| normalize_tag(t))
            .collect();
        for tag in tags {
            sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
                .bind(&tag)
                .execute(&mut *tx)
                .await
                .map_err(db_err("Failed to store tag"))?;
            sqlx::query("INSERT OR IGNORE INTO articles_tags (article_id, tag_name) VALUES (?, ?)")
                .bind(&id)
                .bind(&tag)
                .execute(&mut *tx)
                .await
                .map_err(db_err("Failed to link tag"))?;
        }

        tx.commit().await.map_err(db_err("Failed to commit article"))?;
        debug!("Stored article {} as {}", article.url, id);
        Ok(id)
    }

    async fn should_request_screenshot(&self, title: &str, url: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM articles WHERE title = ? AND link = ? \
             AND screenshot_data IS NOT NULL AND TRIM(screenshot_data) != ''",
        )
        .bind(title)
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Failed to check screenshot"))?;
        Ok(count == 0)
    }

    async fn update_screenshot(&self, article: &Article) -> Result<()> {
        let id = article.id.as_deref().ok_or_else(|| {
            Error::Storage(format!("Cannot update {} without an identifier", article.url))
        })?;
        let screenshot = article.screenshot.clone().unwrap_or_default();
        let updated = sqlx::query(
            "UPDATE articles SET screenshot_data = ?, screenshot_mime_type = ?, \
             screenshot_width = ?, screenshot_height = ? WHERE id = ?",
        )
        .bind(&screenshot.data)
        .bind(&screenshot.mime_type)
        .bind(screenshot.width.map(i64::from))
        .bind(screenshot.height.map(i64::from))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to update screenshot"))?;
        if updated.rows_affected() == 0 {
            return Err(Error::Storage(format!("No article stored with id {}", id)));
        }
        Ok(())
    }

    async fn update_parsed(&self, article: &Article) -> Result<()> {
        let Some(parsed) = &article.parsed else {
            return Ok(());
        };
        let id = article.id.as_deref().ok_or_else(|| {
            Error::Storage(format!("Cannot update {} without an identifier", article.url))
        })?;
        if self.find_by_id(id).await?.is_none() {
            return Err(Error::Storage(format!("No article stored with id {}", id)));
        }
        upsert_parsed(&self.pool, parsed).await
    }

    async fn articles_with_no_screenshot(&self) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM articles WHERE screenshot_data IS NULL OR TRIM(screenshot_data) = '' \
             ORDER BY timestamp DESC, link",
            ARTICLE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list articles with no screenshot"))?;
        self.hydrate_all(rows).await
    }

    async fn recent_articles(&self, limit: usize) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM articles WHERE timestamp <= ?1 AND timestamp = \
             (SELECT MAX(timestamp) FROM articles WHERE timestamp <= ?1) \
             ORDER BY link LIMIT ?2",
            ARTICLE_COLUMNS
        ))
        // Future-dated articles are not recent.
        .bind(Utc::now().timestamp_millis())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list recent articles"))?;
        self.hydrate_all(rows).await
    }

    async fn count_articles(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to count articles"))?;
        Ok(count as usize)
    }

    async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT name FROM tags LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Health check failed"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    async fn open(dir: &tempfile::TempDir) -> SQLiteStorage {
        SQLiteStorage::new_with_path(&dir.path().join("test.db"), 4).await.unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let temp_dir = tempdir().unwrap();
        let storage = open(&temp_dir).await;

        let mut article = Article::new("Test Article", "http://example.com/post", "test", Utc::now())
            .with_description("Lorem ipsum")
            .with_tags(["Rust", "Async IO", ""]);
        article.parsed = Some(ArticleParsed {
            url: article.url.clone(),
            title: Some("Parsed".into()),
            keywords: ["a".to_string(), "b".to_string()].into_iter().collect(),
            image: Some("".into()),
            body: "Body".into(),
            ..Default::default()
        });

        let id = storage.insert_article(&article).await.unwrap();
        let stored = storage.find_by_url("http://example.com/post").await.unwrap().unwrap();

        assert_eq!(stored.id.as_deref(), Some(id.as_str()));
        assert_eq!(stored.title, "Test Article");
        assert_eq!(stored.url, "http://example.com/post");
        assert_eq!(stored.domain.as_deref(), Some("example.com"));
        assert_eq!(stored.timestamp.timestamp_millis(), article.timestamp.timestamp_millis());
        assert_eq!(stored.tags, vec!["#async-io", "#rust"]);
        let parsed = stored.parsed.unwrap();
        assert_eq!(parsed.keywords.len(), 2);
        assert_eq!(parsed.image, None);
        assert!(storage.exists_parsed("http://example.com/post").await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_unique_url() {
        let temp_dir = tempdir().unwrap();
        let storage = open(&temp_dir).await;

        storage
            .insert_article(&Article::new("One", "http://example.com/a", "test", Utc::now()))
            .await
            .unwrap();
        let err = storage
            .insert_article(&Article::new("Two", "http://example.com/a", "test", Utc::now()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateArticle(_)));
        assert_eq!(storage.count_articles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_screenshot_updates() {
        let temp_dir = tempdir().unwrap();
        let storage = open(&temp_dir).await;

        let id = storage
            .insert_article(&Article::new("T", "http://example.com/a", "test", Utc::now()))
            .await
            .unwrap();
        assert!(storage.should_request_screenshot("T", "http://example.com/a").await.unwrap());
        assert_eq!(storage.articles_with_no_screenshot().await.unwrap().len(), 1);

        let mut stored = storage.find_by_id(&id).await.unwrap().unwrap();
        stored.screenshot = Some(Screenshot {
            data: Some("aGVsbG8=".into()),
            width: Some(412),
            height: Some(823),
            mime_type: Some("image/jpeg".into()),
        });
        storage.update_screenshot(&stored).await.unwrap();

        let reloaded = storage.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(reloaded.screenshot, stored.screenshot);
        assert!(!storage.should_request_screenshot("T", "http://example.com/a").await.unwrap());
        assert!(storage.articles_with_no_screenshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_migrations_are_idempotent() {
        let temp_dir = tempdir().unwrap();
        let version = open(&temp_dir).await.schema_version().await.unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);

        let reopened = open(&temp_dir).await;
        assert_eq!(reopened.schema_version().await.unwrap(), version);
        reopened.check_health().await.unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_recent_articles() {
        let temp_dir = tempdir().unwrap();
        let storage = open(&temp_dir).await;
        let now = Utc::now();

        storage
            .insert_article(&Article::new("Old", "http://example.com/old", "test", now - Duration::days(1)))
            .await
            .unwrap();
        storage
            .insert_article(&Article::new("New", "http://example.com/new", "test", now))
            .await
            .unwrap();

        let recent = storage.recent_articles(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "New");
    }

    #[tokio::test]
    async fn test_sqlite_recent_articles_ignore_future_timestamps() {
        let temp_dir = tempdir().unwrap();
        let storage = open(&temp_dir).await;
        let now = Utc::now();

        storage
            .insert_article(&Article::new("Future", "http://example.com/future", "test", now + Duration::days(365)))
            .await
            .unwrap();
        assert!(storage.recent_articles(5).await.unwrap().is_empty());

        storage
            .insert_article(&Article::new("Now", "http://example.com/now", "test", now))
            .await
            .unwrap();
        let recent = storage.recent_articles(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "Now");
    }
}
