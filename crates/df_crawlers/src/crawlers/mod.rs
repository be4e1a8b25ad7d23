use std::sync::Arc;

use df_core::Crawler;
use tracing::warn;

use crate::CrawlersConfig;

pub mod dummy;

pub use dummy::DummyCrawler;

/// A named constructor for a crawler.
#[derive(Clone, Copy)]
pub struct CrawlerFactory {
    pub name: &'static str,
    pub build: fn(&CrawlersConfig) -> Arc<dyn Crawler>,
}

impl CrawlerFactory {
    pub fn create(&self, config: &CrawlersConfig) -> Arc<dyn Crawler> {
        (self.build)(config)
    }
}

/// Every crawler this build knows about.
pub fn get_crawler_factories() -> Vec<CrawlerFactory> {
    vec![CrawlerFactory {
        name: dummy::NAME,
        build: build_dummy,
    }]
}

fn build_dummy(config: &CrawlersConfig) -> Arc<dyn Crawler> {
    Arc::new(DummyCrawler::with_fanout(config.fanout))
}

/// Instantiates the registered crawlers whose names are enabled in `config`.
pub fn enabled_crawlers(config: &CrawlersConfig) -> Vec<Arc<dyn Crawler>> {
    let factories = get_crawler_factories();
    for name in &config.enabled {
        if !factories.iter().any(|f| f.name.eq_ignore_ascii_case(name)) {
            warn!("🦗 Unknown crawler '{}' in config, ignoring", name);
        }
    }
    factories
        .iter()
        .filter(|f| config.is_enabled(f.name))
        .map(|f| f.create(config))
        .collect()
}
