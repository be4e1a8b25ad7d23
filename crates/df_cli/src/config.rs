use std::path::Path;

use anyhow::Context;
use df_crawlers::CrawlersConfig;
use df_extractors::{ContentConfig, ScreenshotConfig};
use df_pipeline::{PipelineConfig, ScheduleConfig};
use df_storage::StorageConfig;
use df_web::WebConfig;
use serde::Deserialize;
use tracing::info;

/// Every section is optional; missing ones take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub crawlers: CrawlersConfig,
    pub pipeline: PipelineConfig,
    pub schedule: ScheduleConfig,
    pub screenshot: ScreenshotConfig,
    pub content: ContentConfig,
    pub web: WebConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("⚙️ No config file at '{}', using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = Self::parse(&raw).with_context(|| format!("parsing {}", path.display()))?;
        info!("⚙️ Loaded config from '{}'", path.display());
        Ok(config)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}
