use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use df_core::{ArticleStorage, Error, Result};
use serde::Deserialize;
use tracing::info;

pub mod backends;

pub use backends::*;

/// A persistence gateway that can be built from [`StorageConfig`].
#[async_trait]
pub trait StorageBackend: ArticleStorage + Sized {
    fn get_error_message() -> &'static str;
    async fn connect(config: &StorageConfig) -> Result<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Sqlite,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(Error::Config(format!("Unknown storage backend: {}", other))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Database file, sqlite only
    pub path: PathBuf,
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            path: PathBuf::from("devfeed.db"),
            pool_size: 5,
        }
    }
}

async fn connect_backend<T: StorageBackend + 'static>(config: &StorageConfig) -> Result<Arc<dyn ArticleStorage>> {
    let storage = T::connect(config).await.map_err(|e| {
        Error::Storage(format!("{} ({})", T::get_error_message(), e))
    })?;
    Ok(Arc::new(storage))
}

pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn ArticleStorage>> {
    let storage = match config.backend {
        BackendKind::Memory => connect_backend::<MemoryStorage>(config).await?,
        #[cfg(feature = "sqlite")]
        BackendKind::Sqlite => connect_backend::<SQLiteStorage>(config).await?,
        #[cfg(not(feature = "sqlite"))]
        BackendKind::Sqlite => {
            return Err(Error::Config(
                "This build has no sqlite support (enable the `sqlite` feature)".to_string(),
            ))
        }
    };
    info!("🏦 Storage backend ready (using {})", storage.name());
    Ok(storage)
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, BackendKind, StorageBackend, StorageConfig};
}
