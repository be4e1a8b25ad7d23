use df_core::ArticleStorage;
use serde::Serialize;
use tracing::debug;

use crate::status::PipelineStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Health {
    Up,
    Down,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: Health,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthCheck {
    fn new(status: Health, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
        }
    }
}

/// Up when the gateway serves at least one recent article.
///
/// An empty store is only reported Down once a run has completed; before
/// that nothing could have been stored yet.
pub async fn check_health(storage: &dyn ArticleStorage, status: &PipelineStatus) -> HealthCheck {
    if let Err(e) = storage.check_health().await {
        return HealthCheck::new(Health::Down, format!("storage unreachable: {}", e));
    }
    match storage.recent_articles(1).await {
        Ok(recent) if !recent.is_empty() => HealthCheck {
            status: Health::Up,
            detail: None,
        },
        Ok(_) if !status.has_completed_run() => {
            HealthCheck::new(Health::Unknown, "no pipeline run has completed yet")
        }
        Ok(_) => HealthCheck::new(Health::Down, "no recent articles"),
        Err(e) => {
            debug!("Recent articles query failed: {}", e);
            HealthCheck::new(Health::Down, format!("storage query failed: {}", e))
        }
    }
}
