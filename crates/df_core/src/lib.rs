pub mod crawler;
pub mod error;
pub mod extractor;
pub mod storage;
pub mod types;

pub use crawler::Crawler;
pub use error::{Error, Result};
pub use extractor::{ContentExtractor, ScreenshotExtractor};
pub use storage::ArticleStorage;
pub use types::{Article, ArticleParsed, Screenshot};

pub mod prelude {
    pub use super::{
        Article, ArticleParsed, ArticleStorage, ContentExtractor, Crawler, Error, Result,
        Screenshot, ScreenshotExtractor,
    };
}
