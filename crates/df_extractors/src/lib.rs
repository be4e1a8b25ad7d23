use std::sync::Arc;

use df_core::{ArticleStorage, ContentExtractor, Result, ScreenshotExtractor};
use tracing::info;

pub mod content;
pub mod screenshot;

pub use content::{ContentConfig, DocumentParserExtractor};
pub use screenshot::{PageSpeedScreenshotExtractor, ScreenshotConfig};

pub fn create_screenshot_extractor(
    config: &ScreenshotConfig,
    storage: Arc<dyn ArticleStorage>,
) -> Result<Option<Arc<dyn ScreenshotExtractor>>> {
    if !config.enabled {
        info!("📸 Screenshot extraction disabled");
        return Ok(None);
    }
    let extractor = PageSpeedScreenshotExtractor::new(config, storage)?;
    info!("📸 Screenshot extractor ready (using {})", extractor.name());
    Ok(Some(Arc::new(extractor)))
}

pub fn create_content_extractor(
    config: &ContentConfig,
    storage: Arc<dyn ArticleStorage>,
) -> Result<Option<Arc<dyn ContentExtractor>>> {
    if config.api_key.trim().is_empty() {
        info!("📄 Content extraction disabled (no document parser key)");
        return Ok(None);
    }
    let extractor = DocumentParserExtractor::new(config, storage)?;
    info!("📄 Content extractor ready (using {})", extractor.name());
    Ok(Some(Arc::new(extractor)))
}

pub mod prelude {
    pub use super::{create_content_extractor, create_screenshot_extractor};
    pub use super::{ContentConfig, DocumentParserExtractor, PageSpeedScreenshotExtractor, ScreenshotConfig};
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_storage::MemoryStorage;

    #[test]
    fn test_factories_follow_config() {
        let storage: Arc<dyn ArticleStorage> = Arc::new(MemoryStorage::new());

        let screenshot = create_screenshot_extractor(&ScreenshotConfig::default(), storage.clone()).unwrap();
        assert_eq!(screenshot.unwrap().name(), "pagespeed");

        let disabled = ScreenshotConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(create_screenshot_extractor(&disabled, storage.clone()).unwrap().is_none());

        assert!(create_content_extractor(&ContentConfig::default(), storage.clone()).unwrap().is_none());
        let keyed = ContentConfig {
            api_key: "secret".into(),
            ..Default::default()
        };
        assert_eq!(create_content_extractor(&keyed, storage).unwrap().unwrap().name(), "document-parser");
    }
}
