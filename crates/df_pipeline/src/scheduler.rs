use std::sync::Arc;

use df_core::{Error, Result};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::config::ScheduleConfig;
use crate::pipeline::Pipeline;

fn scheduler_error(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Scheduler(format!("{}: {}", context, e))
}

fn full_run_job(cron: &str, pipeline: Arc<Pipeline>) -> Result<Job> {
    Job::new_async(cron, move |_uuid, _lock| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            info!("⏰ Scheduled run triggered");
            pipeline.run().await;
        })
    })
    .map_err(|e| scheduler_error(&format!("invalid cron expression '{}'", cron), e))
}

fn sweep_job(cron: &str, pipeline: Arc<Pipeline>) -> Result<Job> {
    Job::new_async(cron, move |_uuid, _lock| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            info!("⏰ Scheduled screenshot sweep triggered");
            pipeline.trigger_screenshot_sweep().await;
        })
    })
    .map_err(|e| scheduler_error(&format!("invalid cron expression '{}'", cron), e))
}

/// Cron triggers plus the delayed startup run for one pipeline.
pub struct PipelineScheduler {
    scheduler: JobScheduler,
    startup: Option<JoinHandle<()>>,
}

impl PipelineScheduler {
    pub async fn start(pipeline: Arc<Pipeline>, config: &ScheduleConfig) -> Result<Self> {
        let mut jobs = vec![full_run_job(&config.cron, pipeline.clone())?];
        if let Some(cron) = config.screenshot_sweep_cron.as_deref() {
            jobs.push(sweep_job(cron, pipeline.clone())?);
        }

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| scheduler_error("creating scheduler", e))?;
        for job in jobs {
            scheduler
                .add(job)
                .await
                .map_err(|e| scheduler_error("adding scheduler job", e))?;
        }
        scheduler
            .start()
            .await
            .map_err(|e| scheduler_error("starting scheduler", e))?;
        info!("⏰ Pipeline scheduled with '{}'", config.cron);
        if let Some(cron) = &config.screenshot_sweep_cron {
            info!("⏰ Screenshot sweep scheduled with '{}'", cron);
        }

        let startup = config.run_on_startup.then(|| {
            let delay = config.startup_delay();
            info!("⏰ First run in {:?}", delay);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                pipeline.run().await;
            })
        });

        Ok(Self { scheduler, startup })
    }

    /// Stops triggering new runs. A run already in progress is not awaited.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(startup) = self.startup.take() {
            startup.abort();
        }
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| scheduler_error("stopping scheduler", e))
    }
}
