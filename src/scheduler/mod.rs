//! Runs the pipeline jobs once or on a fixed period.
//!
//! A cycle is sync, then analysis, then to-do sync. Each job is retried with
//! backoff while it fails with a transient error kind; a partial success is
//! final. A job that still fails is logged, recorded in the job log and
//! reported through exactly one notice.

pub mod retry;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ErrorKind, ProcessingError};
use crate::notification::{Notice, Notifier};
use crate::pipeline::{
    AnalysisOrchestrator, BatchResult, Outcome, SyncOrchestrator, SyncResult,
    TodoSyncOrchestrator,
};
use crate::store::{JobLog, JobRun};
use retry::{Attempted, RetryConfig, with_retry_if};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    Sync,
    Analysis,
    TodoSync,
}

impl Job {
    pub fn as_str(self) -> &'static str {
        match self {
            Job::Sync => "sync",
            Job::Analysis => "analysis",
            Job::TodoSync => "todo-sync",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Final state of one job within a cycle.
#[derive(Debug, Clone)]
pub enum JobStatus {
    Succeeded(String),
    /// Finished with some failed items or targets; not retried.
    Partial {
        summary: String,
        errors: Vec<String>,
    },
    Failed(ProcessingError),
    /// Disabled in the configuration
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Succeeded(_) => "succeeded",
            JobStatus::Partial { .. } => "partial",
            JobStatus::Failed(_) => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    /// Text stored in the job log.
    pub fn detail(&self) -> String {
        match self {
            JobStatus::Succeeded(summary) => summary.clone(),
            JobStatus::Partial { summary, errors } => {
                format!("{} ({})", summary, errors.join("; "))
            }
            JobStatus::Failed(e) => format!("[{}] {}", e.kind, e.message),
            JobStatus::Skipped => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: Job,
    pub status: JobStatus,
    /// Zero for skipped jobs
    pub attempts: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub jobs: Vec<JobReport>,
}

impl CycleReport {
    #[cfg(test)]
    pub fn get(&self, job: Job) -> Option<&JobReport> {
        self.jobs.iter().find(|report| report.job == job)
    }

    pub fn has_failures(&self) -> bool {
        self.jobs
            .iter()
            .any(|report| matches!(report.status, JobStatus::Failed(_)))
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, report) in self.jobs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", report.job, report.status.as_str())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub retry: RetryConfig,
    pub analyze: bool,
    pub push_todos: bool,
    pub list_name: String,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.sync.interval_secs),
            retry: RetryConfig::new(
                config.sync.max_attempts,
                Duration::from_millis(config.sync.retry_initial_delay_ms),
                Duration::from_millis(config.sync.retry_max_delay_ms),
            ),
            analyze: config.sync.analyze,
            push_todos: config.sync.push_todos,
            list_name: config.todo.list_name.clone(),
        }
    }
}

/// A job attempt that needs no retry, with the notice it earns.
struct Finished {
    status: JobStatus,
    notice: Option<Notice>,
}

fn batch_status(verb: &str, batch: &BatchResult) -> JobStatus {
    let summary = format!(
        "{} {} of {} ({} failed, {} skipped)",
        verb, batch.successful, batch.total, batch.failed, batch.skipped
    );
    if batch.failed == 0 {
        JobStatus::Succeeded(summary)
    } else {
        JobStatus::Partial {
            summary,
            errors: batch.failure_messages(),
        }
    }
}

/// A batch job that reports `Loading` has not finished; try it again.
fn still_running(job: Job) -> ProcessingError {
    ProcessingError::new(ErrorKind::Unknown, format!("{} job did not finish", job))
}

pub struct JobScheduler {
    sync: SyncOrchestrator,
    analysis: AnalysisOrchestrator,
    todo_sync: TodoSyncOrchestrator,
    job_log: Arc<dyn JobLog>,
    notifier: Arc<dyn Notifier>,
    settings: SchedulerSettings,
}

impl JobScheduler {
    pub fn new(
        sync: SyncOrchestrator,
        analysis: AnalysisOrchestrator,
        todo_sync: TodoSyncOrchestrator,
        job_log: Arc<dyn JobLog>,
        notifier: Arc<dyn Notifier>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            sync,
            analysis,
            todo_sync,
            job_log,
            notifier,
            settings,
        }
    }

    /// Run every enabled job once, in pipeline order.
    ///
    /// Later jobs run even when an earlier one failed; they work on what the
    /// store already holds.
    pub async fn run_cycle(&self) -> CycleReport {
        tracing::info!("Starting pipeline cycle");
        let mut report = CycleReport::default();

        report
            .jobs
            .push(self.run_job(Job::Sync, || self.sync_once()).await);

        report.jobs.push(if self.settings.analyze {
            self.run_job(Job::Analysis, || self.analysis_once()).await
        } else {
            Self::skipped(Job::Analysis)
        });

        report.jobs.push(if self.settings.push_todos {
            self.run_job(Job::TodoSync, || self.todo_sync_once()).await
        } else {
            Self::skipped(Job::TodoSync)
        });

        tracing::info!("Cycle finished: {}", report);
        report
    }

    /// Run cycles every `interval` until `shutdown` fires.
    ///
    /// The first cycle starts immediately. A cycle that overruns the period
    /// delays the next tick instead of stacking cycles. Shutdown interrupts a
    /// running cycle at its next suspension point; store updates already made
    /// stay committed.
    pub async fn run_periodic(&self, shutdown: CancellationToken) {
        let mut tick = interval(self.settings.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Scheduler started, cycle every {:?}", self.settings.interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
                _ = tick.tick() => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            tracing::info!("Cycle interrupted, scheduler shutting down");
                            break;
                        }
                        _ = self.run_cycle() => {}
                    }
                }
            }
        }
    }

    fn skipped(job: Job) -> JobReport {
        tracing::debug!("Job {} disabled, skipping", job);
        JobReport {
            job,
            status: JobStatus::Skipped,
            attempts: 0,
        }
    }

    async fn run_job<F, Fut>(&self, job: Job, operation: F) -> JobReport
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Finished, ProcessingError>>,
    {
        let Attempted { result, attempts } = with_retry_if(
            &self.settings.retry,
            |e: &ProcessingError| e.kind.is_transient(),
            operation,
        )
        .await;

        let (status, notice) = match result {
            Ok(Finished { status, notice }) => (status, notice),
            Err(e) => {
                tracing::error!(
                    "Job {} failed after {} attempt(s) [{}]: {}",
                    job,
                    attempts,
                    e.kind,
                    e
                );
                let notice = Notice::Failure {
                    job: job.to_string(),
                    message: e.message.clone(),
                };
                (JobStatus::Failed(e), Some(notice))
            }
        };

        if let JobStatus::Partial { errors, .. } = &status {
            tracing::warn!("Job {} finished with {} error(s)", job, errors.len());
        }
        if let Some(notice) = notice {
            self.notifier.notify(&notice);
        }

        let run = JobRun {
            job: job.as_str().to_string(),
            status: status.as_str().to_string(),
            message: status.detail(),
            attempts,
            finished_at: chrono::Utc::now().timestamp(),
        };
        if let Err(e) = self.job_log.record_job_run(&run).await {
            tracing::warn!("Failed to record {} job run: {:#}", job, e);
        }

        JobReport {
            job,
            status,
            attempts,
        }
    }

    async fn sync_once(&self) -> Result<Finished, ProcessingError> {
        match self.sync.sync().await {
            SyncResult::Success {
                fetched, processed, ..
            } => Ok(Finished {
                status: JobStatus::Succeeded(format!(
                    "Fetched {}, stored {}",
                    fetched, processed
                )),
                notice: (processed > 0).then_some(Notice::SyncSummary { stored: processed }),
            }),
            SyncResult::PartialSuccess {
                fetched,
                processed,
                errors,
                error_messages,
            } => Ok(Finished {
                status: JobStatus::Partial {
                    summary: format!(
                        "Fetched {}, stored {}, {} target(s) failed",
                        fetched, processed, errors
                    ),
                    errors: error_messages,
                },
                notice: (processed > 0).then_some(Notice::SyncSummary { stored: processed }),
            }),
            SyncResult::Failure(e) => Err(e),
        }
    }

    async fn analysis_once(&self) -> Result<Finished, ProcessingError> {
        match self.analysis.analyze_pending().await {
            Outcome::Success(batch) => Ok(Finished {
                status: batch_status("Analyzed", &batch),
                notice: None,
            }),
            Outcome::Error(e) => Err(e),
            Outcome::Loading => Err(still_running(Job::Analysis)),
        }
    }

    async fn todo_sync_once(&self) -> Result<Finished, ProcessingError> {
        let list_name = &self.settings.list_name;
        match self.todo_sync.sync_pending(list_name).await {
            Outcome::Success(batch) => Ok(Finished {
                status: batch_status("Synced", &batch),
                notice: (batch.successful > 0).then(|| Notice::TodoSummary {
                    synced: batch.successful,
                    list: list_name.clone(),
                }),
            }),
            Outcome::Error(e) => Err(e),
            Outcome::Loading => Err(still_running(Job::TodoSync)),
        }
    }
}
