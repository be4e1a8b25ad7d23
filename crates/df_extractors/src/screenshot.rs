use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use df_core::{Article, ArticleStorage, Error, Result, Screenshot, ScreenshotExtractor};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const PAGESPEED_URL: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    /// Optional PageSpeed Online key; anonymous calls are heavily rate limited
    pub api_key: String,
    pub timeout_secs: u64,
    pub base_url: String,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            timeout_secs: 60,
            base_url: PAGESPEED_URL.to_string(),
        }
    }
}

/// Captures page screenshots through Google PageSpeed Online.
pub struct PageSpeedScreenshotExtractor {
    client: Client,
    storage: Arc<dyn ArticleStorage>,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for PageSpeedScreenshotExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSpeedScreenshotExtractor")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PageSpeedScreenshotExtractor {
    pub fn new(config: &ScreenshotConfig, storage: Arc<dyn ArticleStorage>) -> Result<Self> {
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

    async fn request(&self, url: &str) -> Result<Option<Screenshot>> {
        let mut query = vec![("url", url), ("screenshot", "true")];
        if !self.api_key.is_empty() {
            query.push(("key", self.api_key.as_str()));
        }
        let body: Value = self
            .client
            .get(&self.base_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_pagespeed_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct ScreenshotDetails {
    data: Option<String>,
    mime_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Pulls `final-screenshot` out of a PageSpeed report.
///
/// PageSpeed serves URL-safe base64 (`_` for `/`, `-` for `+`), optionally as
/// a `data:` URI; the result is plain standard base64.
pub fn parse_pagespeed_response(body: &Value) -> Result<Option<Screenshot>> {
    let Some(details) = body.pointer("/lighthouseResult/audits/final-screenshot/details") else {
        return Ok(None);
    };
    let details: ScreenshotDetails = serde_json::from_value(details.clone())
        .map_err(|e| Error::Extraction(format!("Unexpected screenshot payload: {}", e)))?;

    let Some(raw) = details.data.filter(|d| !d.trim().is_empty()) else {
        return Ok(None);
    };
    let (uri_mime, encoded) = split_data_uri(&raw);
    if encoded.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(Screenshot {
        data: Some(encoded.replace('_', "/").replace('-', "+")),
        mime_type: details.mime_type.or(uri_mime),
        width: details.width,
        height: details.height,
    }))
}

fn split_data_uri(raw: &str) -> (Option<String>, &str) {
    let Some(rest) = raw.strip_prefix("data:") else {
        return (None, raw);
    };
    match rest.split_once(',') {
        Some((header, data)) => {
            let mime = header.trim_end_matches(";base64");
            let mime = (!mime.is_empty()).then(|| mime.to_string());
            (mime, data)
        }
        None => (None, raw),
    }
}

#[async_trait]
impl ScreenshotExtractor for PageSpeedScreenshotExtractor {
    fn name(&self) -> &str {
        "pagespeed"
    }

    async fn extract_screenshot(&self, article: &Article) -> Option<Screenshot> {
        match self.storage.should_request_screenshot(&article.title, &article.url).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Screenshot already stored for {}", article.url);
                return None;
            }
            Err(e) => {
                warn!("⚠️ Could not check screenshot state for {}: {}", article.url, e);
                return None;
            }
        }

        match self.request(&article.url).await {
            Ok(Some(screenshot)) => {
                debug!("📸 Got screenshot for {}", article.url);
                Some(screenshot)
            }
            Ok(None) => {
                debug!("No screenshot in PageSpeed report for {}", article.url);
                None
            }
            Err(e) => {
                warn!("⚠️ Could not fetch screenshot data for {}: {}", article.url, e);
                None
            }
        }
    }
}
