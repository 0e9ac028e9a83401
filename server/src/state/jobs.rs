//! Run-exclusion for the two pipelines. Each job owns an explicit
//! IDLE/RUNNING flag acquired with an atomic check-and-set; a trigger that
//! finds its job RUNNING is dropped and logged, never queued. Both jobs
//! additionally serialize their store access behind one pipeline lock, so a
//! weekly read never races an in-flight daily write.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{Duration, Utc};
use derive_more::derive::Display;
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    digest::{DigestSink, FileDigestSink},
    email::spool::SpoolSource,
    prompt::LlmGateway,
    server_config::cfg,
    state::{daily, weekly::WeeklyAggregator},
    ServerState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JobKind {
    #[display("daily ingestion")]
    Daily,
    #[display("weekly digest")]
    Weekly,
}

#[derive(Clone, Default)]
pub struct JobCoordinator {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    daily_running: AtomicBool,
    weekly_running: AtomicBool,
    pipeline: Mutex<()>,
}

impl JobCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the job's RUNNING flag. `None` means the job is already
    /// running and this trigger is dropped (logged as a skipped run).
    pub fn try_begin(&self, kind: JobKind) -> Option<JobGuard> {
        let acquired = self
            .flag(kind)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if acquired {
            Some(JobGuard {
                coordinator: self.clone(),
                kind,
            })
        } else {
            tracing::warn!("Skipping {} run: job is already running", kind);
            None
        }
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        self.flag(kind).load(Ordering::Acquire)
    }

    /// Store access is single-writer: whoever holds this touches the record
    /// store alone, which serializes a weekly run behind an in-flight daily.
    pub async fn lock_pipeline(&self) -> MutexGuard<'_, ()> {
        self.inner.pipeline.lock().await
    }

    fn flag(&self, kind: JobKind) -> &AtomicBool {
        match kind {
            JobKind::Daily => &self.inner.daily_running,
            JobKind::Weekly => &self.inner.weekly_running,
        }
    }
}

/// Clears the RUNNING flag when the run ends, panics included.
pub struct JobGuard {
    coordinator: JobCoordinator,
    kind: JobKind,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.coordinator
            .flag(self.kind)
            .store(false, Ordering::Release);
    }
}

/// Start a daily run in the background. Returns false (without spawning) if
/// the job is already running.
pub fn spawn_daily(state: ServerState) -> bool {
    let Some(guard) = state.jobs.try_begin(JobKind::Daily) else {
        return false;
    };

    tokio::spawn(execute_daily(state, guard));
    true
}

/// Start a weekly run in the background. Returns false (without spawning) if
/// the job is already running.
pub fn spawn_weekly(state: ServerState) -> bool {
    let Some(guard) = state.jobs.try_begin(JobKind::Weekly) else {
        return false;
    };

    tokio::spawn(execute_weekly(state, guard));
    true
}

async fn execute_daily(state: ServerState, guard: JobGuard) {
    let _guard = guard;
    let _pipeline = state.jobs.lock_pipeline().await;

    tracing::info!("=== Starting daily newsletter ingestion ===");
    let source = SpoolSource::new(&cfg.settings.spool_dir);
    let gateway = LlmGateway::new(state.http_client.clone());

    match daily::run_daily_ingestion(&state.conn, &source, &gateway).await {
        Ok(report) => {
            tracing::info!(
                "Daily ingestion finished: stored {} of {} candidates",
                report.stored,
                report.candidates
            );
        }
        Err(err) => {
            // Confined to this run; the next scheduled run proceeds normally
            tracing::error!("Daily ingestion failed: {:?}", err);
        }
    }
}

async fn execute_weekly(state: ServerState, guard: JobGuard) {
    let _guard = guard;
    let _pipeline = state.jobs.lock_pipeline().await;

    tracing::info!("=== Starting weekly digest generation ===");
    let gateway = LlmGateway::new(state.http_client.clone());
    let aggregator = WeeklyAggregator::from_config(&gateway);

    // Half-open window over the last 7 calendar dates, today included
    let window_end = Utc::now().date_naive() + Duration::days(1);
    let window_start = window_end - Duration::days(7);

    match aggregator.aggregate(&state.conn, window_start, window_end).await {
        Ok(digest) => {
            let sink = FileDigestSink::new(&cfg.settings.digest_dir);
            match sink.publish(&digest) {
                Ok(path) => {
                    tracing::info!(
                        "Weekly digest finished: {} sections, {} newsletters, written to {}",
                        digest.sections.len(),
                        digest.total_newsletters,
                        path.display()
                    );
                }
                Err(err) => {
                    tracing::error!("Could not publish weekly digest: {:?}", err);
                }
            }
        }
        Err(err) => {
            tracing::error!("Weekly digest generation failed: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_trigger_is_dropped_while_running() {
        let jobs = JobCoordinator::new();

        let guard = jobs.try_begin(JobKind::Daily);
        assert!(guard.is_some());
        assert!(jobs.is_running(JobKind::Daily));

        // same job cannot be acquired twice
        assert!(jobs.try_begin(JobKind::Daily).is_none());

        drop(guard);
        assert!(!jobs.is_running(JobKind::Daily));
        assert!(jobs.try_begin(JobKind::Daily).is_some());
    }

    #[test]
    fn test_jobs_have_independent_flags() {
        let jobs = JobCoordinator::new();

        let _daily = jobs.try_begin(JobKind::Daily).unwrap();
        let weekly = jobs.try_begin(JobKind::Weekly);
        assert!(weekly.is_some());
    }

    #[tokio::test]
    async fn test_pipeline_lock_serializes_store_access() {
        let jobs = JobCoordinator::new();

        let held = jobs.lock_pipeline().await;
        // a second holder must wait until the first releases
        assert!(jobs.inner.pipeline.try_lock().is_err());
        drop(held);
        assert!(jobs.inner.pipeline.try_lock().is_ok());
    }
}
