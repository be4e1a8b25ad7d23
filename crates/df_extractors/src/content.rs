use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use df_core::{Article, ArticleParsed, ArticleStorage, ContentExtractor, Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const DOCUMENT_PARSER_URL: &str = "https://document-parser-api.lateral.io/";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Document parser subscription key; blank disables content extraction
    pub api_key: String,
    pub timeout_secs: u64,
    pub base_url: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            timeout_secs: 30,
            base_url: DOCUMENT_PARSER_URL.to_string(),
        }
    }
}

pub struct DocumentParserExtractor {
    client: Client,
    storage: Arc<dyn ArticleStorage>,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for DocumentParserExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentParserExtractor")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl DocumentParserExtractor {
    pub fn new(config: &ContentConfig, storage: Arc<dyn ArticleStorage>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            storage,
            api_key: config.api_key.trim().to_string(),
            base_url: config.base_url.clone(),
        })
    }

    async fn request(&self, url: &str) -> Result<ArticleParsed> {
        let body: Value = self
            .client
            .get(&self.base_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("subscription-key", &self.api_key)
            .query(&[("url", url)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_document(url, body)
    }
}

#[derive(Debug, Deserialize)]
struct ParsedDocument {
    title: Option<String>,
    author: Option<String>,
    published: Option<String>,
    image: Option<String>,
    description: Option<String>,
    body: Option<String>,
    #[serde(default)]
    videos: Option<Vec<Value>>,
    #[serde(default)]
    keywords: Option<Vec<Value>>,
}

fn string_set(values: Option<Vec<Value>>) -> BTreeSet<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .filter(|v| !v.is_null())
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}

/// Maps a document parser response onto [`ArticleParsed`] for `url`.
pub fn parse_document(url: &str, body: Value) -> Result<ArticleParsed> {
    let doc: ParsedDocument = serde_json::from_value(body)
        .map_err(|e| Error::Extraction(format!("Unexpected document parser payload: {}", e)))?;
    let body = doc
        .body
        .ok_or_else(|| Error::Extraction(format!("No body parsed for {}", url)))?;

    Ok(ArticleParsed {
        url: url.to_string(),
        title: doc.title,
        author: doc.author,
        published: doc.published,
        image: doc.image.filter(|i| !i.trim().is_empty()),
        videos: string_set(doc.videos),
        keywords: string_set(doc.keywords),
        description: doc.description,
        body,
    })
}

#[async_trait]
impl ContentExtractor for DocumentParserExtractor {
    fn name(&self) -> &str {
        "document-parser"
    }

    async fn extract_content(&self, article: &Article) -> Option<ArticleParsed> {
        if self.api_key.is_empty() {
            return None;
        }
        match self.storage.exists_parsed(&article.url).await {
            Ok(false) => {}
            Ok(true) => return None,
            Err(e) => {
                warn!("⚠️ Could not check parsed state for {}: {}", article.url, e);
                return None;
            }
        }

        debug!("📄 Getting article extraction data for {}", article.url);
        match self.request(&article.url).await {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("⚠️ Could not fetch article extraction data for {}: {}", article.url, e);
                None
            }
        }
    }
}
