use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Persistence and enrichment update tasks
    pub workers: usize,
    pub screenshot_workers: usize,
    pub content_workers: usize,
    /// Articles older than this many days are skipped; 0 keeps everything
    pub max_age_days: u32,
    pub crawler_timeout_secs: u64,
    pub screenshot_timeout_secs: u64,
    pub content_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            screenshot_workers: 5,
            content_workers: 5,
            max_age_days: 0,
            crawler_timeout_secs: 600,
            screenshot_timeout_secs: 90,
            content_timeout_secs: 60,
        }
    }
}

impl PipelineConfig {
    pub fn crawler_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler_timeout_secs)
    }

    pub fn screenshot_timeout(&self) -> Duration {
        Duration::from_secs(self.screenshot_timeout_secs)
    }

    pub fn content_timeout(&self) -> Duration {
        Duration::from_secs(self.content_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Six fields, seconds first
    pub cron: String,
    pub screenshot_sweep_cron: Option<String>,
    pub run_on_startup: bool,
    pub startup_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 */2 * * *".to_string(),
            screenshot_sweep_cron: None,
            run_on_startup: true,
            startup_delay_secs: 5,
        }
    }
}

impl ScheduleConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}
