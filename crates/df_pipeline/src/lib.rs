//! The fetch-enrich-persist pipeline: crawl every source, store what is new,
//! then fill in screenshots and parsed content on bounded worker pools.

pub mod config;
pub mod health;
pub mod pipeline;
pub mod pool;
pub mod scheduler;
pub mod status;

pub use config::{PipelineConfig, ScheduleConfig};
pub use health::{check_health, Health, HealthCheck};
pub use pipeline::Pipeline;
pub use pool::WorkerPool;
pub use scheduler::PipelineScheduler;
pub use status::{PipelineStatus, RunKind, RunReport, SweepReport};

pub mod prelude {
    pub use super::{
        check_health, Health, HealthCheck, Pipeline, PipelineConfig, PipelineScheduler, PipelineStatus,
        RunKind, RunReport, ScheduleConfig,
    };
}
