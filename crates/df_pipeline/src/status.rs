use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Full,
    ScreenshotSweep,
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunKind::Full => write!(f, "full run"),
            RunKind::ScreenshotSweep => write!(f, "screenshot sweep"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub pending: usize,
    pub updated: usize,
    pub remaining: usize,
}

/// Counters for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub kind: RunKind,
    /// 1-based, counts every completed run of any kind
    pub run_number: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub crawlers_ok: usize,
    pub crawlers_failed: usize,
    pub crawled: usize,
    pub duplicates_in_batch: usize,
    pub too_old: usize,
    pub inserted: usize,
    pub already_stored: usize,
    pub persist_failures: usize,
    pub screenshots_added: usize,
    pub parsed_added: usize,
    pub update_failures: usize,
    pub sweep: Option<SweepReport>,
    pub failures: Vec<String>,
}

impl RunReport {
    pub fn new(kind: RunKind, run_number: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            run_number,
            started_at,
            finished_at: None,
            crawlers_ok: 0,
            crawlers_failed: 0,
            crawled: 0,
            duplicates_in_batch: 0,
            too_old: 0,
            inserted: 0,
            already_stored: 0,
            persist_failures: 0,
            screenshots_added: 0,
            parsed_added: 0,
            update_failures: 0,
            sweep: None,
            failures: Vec::new(),
        }
    }

    pub fn crawling_succeeded(&self) -> bool {
        self.crawlers_failed == 0
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    pub(crate) fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
    }
}

/// What the pipeline is doing, or how its last run ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineStatus {
    #[default]
    Idle,
    Running {
        kind: RunKind,
        started_at: DateTime<Utc>,
        completed_runs: u64,
    },
    LastOk {
        report: RunReport,
    },
    LastFailed {
        reason: String,
        report: RunReport,
    },
}

impl PipelineStatus {
    pub(crate) fn from_report(report: RunReport) -> Self {
        if report.is_success() {
            PipelineStatus::LastOk { report }
        } else {
            PipelineStatus::LastFailed {
                reason: report.failures.join("; "),
                report,
            }
        }
    }

    pub fn completed_runs(&self) -> u64 {
        match self {
            PipelineStatus::Idle => 0,
            PipelineStatus::Running { completed_runs, .. } => *completed_runs,
            PipelineStatus::LastOk { report } | PipelineStatus::LastFailed { report, .. } => {
                report.run_number
            }
        }
    }

    pub fn has_completed_run(&self) -> bool {
        self.completed_runs() > 0
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PipelineStatus::Running { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_report() {
        let mut report = RunReport::new(RunKind::Full, 3, Utc::now());
        assert!(matches!(
            PipelineStatus::from_report(report.clone()),
            PipelineStatus::LastOk { .. }
        ));

        report.failures.push("crawler a failed".into());
        report.failures.push("crawler b failed".into());
        let status = PipelineStatus::from_report(report);
        match &status {
            PipelineStatus::LastFailed { reason, .. } => {
                assert_eq!(reason, "crawler a failed; crawler b failed")
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(status.completed_runs(), 3);
    }

    #[test]
    fn test_completed_runs() {
        assert!(!PipelineStatus::Idle.has_completed_run());
        let running = PipelineStatus::Running {
            kind: RunKind::Full,
            started_at: Utc::now(),
            completed_runs: 0,
        };
        assert!(running.is_running());
        assert!(!running.has_completed_run());
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let json = serde_json::to_value(PipelineStatus::Idle).unwrap();
        assert_eq!(json["state"], "idle");

        let report = RunReport::new(RunKind::ScreenshotSweep, 1, Utc::now());
        let json = serde_json::to_value(PipelineStatus::from_report(report)).unwrap();
        assert_eq!(json["state"], "last_ok");
        assert_eq!(json["report"]["kind"], "screenshot_sweep");
    }
}
