use std::sync::Arc;

use df_core::ArticleStorage;
use df_pipeline::PipelineStatus;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ArticleStorage>,
    pub status: watch::Receiver<PipelineStatus>,
}

impl AppState {
    pub fn new(storage: Arc<dyn ArticleStorage>, status: watch::Receiver<PipelineStatus>) -> Self {
        Self { storage, status }
    }

    pub fn current_status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }
}
