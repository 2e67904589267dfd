//! Export job state.
//!
//! One [`ExportJob`] exists per exported category. It owns the accumulator, the
//! progress signal and the failure record, and concludes exactly once: seal, write,
//! report.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::categories::Category;
use crate::error::RemoteError;
use crate::remote::SessionId;

use super::accumulator::ResultAccumulator;
use super::fanout::FanOutTracker;
use super::progress::{ProgressAggregator, ProgressMode};
use super::status::{Severity, StatusReporter, StatusSink};
use super::writers::{ExportFormat, ExportRecord, write_records};

/// What went wrong while a job ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureRecord {
    pub last_failure: Option<String>,
    pub transport_failures: u32,
    pub skipped: u32,
}

#[derive(Debug, Default)]
struct JobState {
    failures: FailureRecord,
    declared_total: Option<u64>,
}

/// Terminal summary of one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryReport {
    pub category: Category,
    pub job_id: Uuid,
    pub severity: Severity,
    pub text: String,
    pub records: usize,
    pub output: Option<PathBuf>,
    pub bytes: u64,
    pub failures: FailureRecord,
    pub cancelled: bool,
}

pub struct ExportJob<T> {
    id: Uuid,
    category: Category,
    session: SessionId,
    accumulator: ResultAccumulator<T>,
    reporter: StatusReporter,
    progress: ProgressAggregator,
    cancel: CancellationToken,
    completed: AtomicBool,
    state: Mutex<JobState>,
}

impl<T> ExportJob<T> {
    pub fn new(
        category: Category,
        session: SessionId,
        sink: Arc<dyn StatusSink>,
        parent: &CancellationToken,
        mode: ProgressMode,
    ) -> Self {
        let cancel = parent.child_token();
        let id = Uuid::new_v4();
        debug!("Created {} job {}", category, id);
        Self {
            id,
            category,
            session,
            accumulator: ResultAccumulator::new(),
            reporter: StatusReporter::new(category, sink, cancel.clone()),
            progress: ProgressAggregator::new(mode),
            cancel,
            completed: AtomicBool::new(false),
            state: Mutex::new(JobState::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_declared_total(&self, total: u64) {
        self.state().declared_total = Some(total);
    }

    pub fn declared_total(&self) -> Option<u64> {
        self.state().declared_total
    }

    /// Append one record and announce it.
    pub fn push(&self, record: T, label: &str) -> bool {
        if self.is_completed() || !self.accumulator.append(record) {
            return false;
        }
        self.reporter.item(label, self.declared_total());
        true
    }

    /// A fetch failed. The job continues but is marked degraded.
    pub fn record_failure(&self, err: &RemoteError) {
        warn!("[{}] {}", self.category, err);
        let text = err.to_string();
        {
            let mut state = self.state();
            state.failures.transport_failures += 1;
            state.failures.last_failure = Some(text.clone());
        }
        self.reporter.status(&text, Severity::Failure);
    }

    /// An item could not be exported (no media, download failed or timed out).
    pub fn record_skipped(&self, reason: &str) {
        debug!("[{}] skipped: {}", self.category, reason);
        self.state().failures.skipped += 1;
    }

    pub fn failures(&self) -> FailureRecord {
        self.state().failures.clone()
    }

    /// Report fan-out progress.
    pub fn observe(&self, tracker: &FanOutTracker) {
        let snapshot = tracker.snapshot();
        self.record_progress(snapshot.pending, snapshot.total);
    }

    pub fn record_progress(&self, pending: usize, total: usize) {
        if let Some(fraction) = self.progress.observe(pending, total) {
            self.reporter.progress(fraction);
        }
    }

    /// Report one processed batch of a sequential job.
    pub fn advance(&self) {
        if let Some(fraction) = self.progress.advance() {
            self.reporter.progress(fraction);
        }
    }

    /// Seal the accumulator, write it to `path` and deliver the terminal status.
    ///
    /// `done` builds the success text from the number of written records. Only the
    /// first call does anything.
    pub async fn conclude<F>(&self, path: &Path, format: ExportFormat, done: F) -> CategoryReport
    where
        T: ExportRecord,
        F: FnOnce(usize) -> String,
    {
        if self
            .completed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.report(Severity::Info, "Export already finished".into(), 0, None, 0);
        }

        let mut records = self.accumulator.seal_and_take();
        T::sort(&mut records);
        let failures = self.failures();

        if self.is_cancelled() {
            info!("[{}] cancelled with {} records", self.category, records.len());
            return self.report(Severity::Warning, "Export cancelled".into(), records.len(), None, 0);
        }

        self.reporter.progress(self.progress.complete());

        if failures.transport_failures > 0 && records.is_empty() {
            let text = failures
                .last_failure
                .clone()
                .unwrap_or_else(|| "Export failed".into());
            self.reporter.finish(&text, Severity::Failure);
            return self.report(Severity::Failure, text, 0, None, 0);
        }

        let summary = match write_records(&records, format, path).await {
            Ok(summary) => summary,
            Err(e) => {
                let text = format!("Export failed: {e}");
                warn!("[{}] {}", self.category, text);
                self.reporter.finish(&text, Severity::Failure);
                return self.report(Severity::Failure, text, records.len(), None, 0);
            }
        };

        let base = done(records.len());
        let (severity, text) = if let Some(last) = failures
            .last_failure
            .as_deref()
            .filter(|_| failures.transport_failures > 0)
        {
            (
                Severity::Failure,
                format!("{} with errors: {}", base.trim_end_matches('.'), last),
            )
        } else if failures.skipped > 0 {
            (
                Severity::Warning,
                format!("{}, {} skipped.", base.trim_end_matches('.'), failures.skipped),
            )
        } else {
            (Severity::Success, base)
        };

        info!(
            "[{}] job {} finished: {} records in {}",
            self.category,
            self.id,
            summary.records,
            summary.path.display()
        );
        self.reporter.finish(&text, severity);
        self.report(severity, text, summary.records, Some(summary.path), summary.bytes)
    }

    /// Terminal status for a job whose output is not a record file.
    pub fn abandon(&self, text: &str) -> CategoryReport {
        self.completed.store(true, Ordering::SeqCst);
        self.accumulator.seal_and_take();
        self.reporter.finish(text, Severity::Failure);
        self.report(Severity::Failure, text.to_string(), 0, None, 0)
    }

    fn report(
        &self,
        severity: Severity,
        text: String,
        records: usize,
        output: Option<PathBuf>,
        bytes: u64,
    ) -> CategoryReport {
        CategoryReport {
            category: self.category,
            job_id: self.id,
            severity,
            text,
            records,
            output,
            bytes,
            failures: self.failures(),
            cancelled: self.is_cancelled(),
        }
    }
}
