pub mod crawlers;
pub mod fanout;

use serde::Deserialize;

pub use crawlers::{enabled_crawlers, get_crawler_factories, CrawlerFactory, DummyCrawler};

/// Which registered crawlers run, and how wide their sub-fetches go.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlersConfig {
    pub enabled: Vec<String>,
    pub fanout: usize,
}

impl Default for CrawlersConfig {
    fn default() -> Self {
        Self {
            enabled: vec![crawlers::dummy::NAME.to_string()],
            fanout: fanout::DEFAULT_FANOUT,
        }
    }
}

impl CrawlersConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

pub mod prelude {
    pub use super::crawlers::*;
    pub use super::fanout::fetch_all;
    pub use super::CrawlersConfig;
    pub use df_core::{Article, Crawler, Error, Result};
}
