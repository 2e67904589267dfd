//! Status notifications for export jobs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::categories::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Failure,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Failure => "failure",
        }
    }
}

/// Receiver of job notifications.
///
/// Called from whatever task produced the event; implementations must be cheap and
/// must not block.
pub trait StatusSink: Send + Sync {
    fn status_changed(&self, category: Category, text: &str, severity: Severity);

    /// One entity was exported. `order` is 1-based.
    fn item_exported(&self, category: Category, order: u64, label: &str, total: Option<u64>);

    fn progress_changed(&self, _category: Category, _fraction: f64) {}

    fn export_finished(&self, category: Category, text: &str, severity: Severity);
}

/// Sink that writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn status_changed(&self, category: Category, text: &str, severity: Severity) {
        match severity {
            Severity::Failure => error!("[{}] {}", category, text),
            Severity::Warning => warn!("[{}] {}", category, text),
            _ => info!("[{}] {}", category, text),
        }
    }

    fn item_exported(&self, category: Category, order: u64, label: &str, total: Option<u64>) {
        match total {
            Some(total) => tracing::debug!("[{}] {}/{} {}", category, order, total, label),
            None => tracing::debug!("[{}] #{} {}", category, order, label),
        }
    }

    fn export_finished(&self, category: Category, text: &str, severity: Severity) {
        self.status_changed(category, text, severity);
    }
}

/// Per-job front for a [`StatusSink`].
///
/// Numbers exported items, and turns every notification into a no-op once the job
/// has finished or been cancelled. `finish` delivers at most once.
pub struct StatusReporter {
    category: Category,
    sink: Arc<dyn StatusSink>,
    cancel: CancellationToken,
    finished: AtomicBool,
    exported: AtomicU64,
}

impl StatusReporter {
    pub fn new(category: Category, sink: Arc<dyn StatusSink>, cancel: CancellationToken) -> Self {
        Self {
            category,
            sink,
            cancel,
            finished: AtomicBool::new(false),
            exported: AtomicU64::new(0),
        }
    }

    fn silent(&self) -> bool {
        self.finished.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    pub fn status(&self, text: &str, severity: Severity) {
        if !self.silent() {
            self.sink.status_changed(self.category, text, severity);
        }
    }

    /// Returns the order assigned to the item.
    pub fn item(&self, label: &str, total: Option<u64>) -> u64 {
        let order = self.exported.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.silent() {
            self.sink.item_exported(self.category, order, label, total);
        }
        order
    }

    pub fn progress(&self, fraction: f64) {
        if !self.silent() {
            self.sink.progress_changed(self.category, fraction.clamp(0.0, 1.0));
        }
    }

    /// Deliver the terminal notification. Returns `false` if it was already sent or
    /// the job was cancelled.
    pub fn finish(&self, text: &str, severity: Severity) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self
            .finished
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.sink.export_finished(self.category, text, severity);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn exported(&self) -> u64 {
        self.exported.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl StatusSink for Recorder {
        fn status_changed(&self, _: Category, text: &str, severity: Severity) {
            self.events
                .lock()
                .unwrap()
                .push(format!("status:{}:{}", severity.as_str(), text));
        }

        fn item_exported(&self, _: Category, order: u64, label: &str, _: Option<u64>) {
            self.events.lock().unwrap().push(format!("item:{order}:{label}"));
        }

        fn export_finished(&self, _: Category, text: &str, severity: Severity) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finished:{}:{}", severity.as_str(), text));
        }
    }

    #[test]
    fn test_finish_is_delivered_once() {
        let recorder = Arc::new(Recorder::default());
        let reporter = StatusReporter::new(Category::Contacts, recorder.clone(), CancellationToken::new());

        reporter.item("Ada", Some(2));
        reporter.item("Bob", Some(2));
        assert!(reporter.finish("done", Severity::Success));
        assert!(!reporter.finish("again", Severity::Failure));
        reporter.status("late", Severity::Info);

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["item:1:Ada", "item:2:Bob", "finished:success:done"]
        );
    }

    #[test]
    fn test_cancelled_reporter_is_silent() {
        let recorder = Arc::new(Recorder::default());
        let token = CancellationToken::new();
        let reporter = StatusReporter::new(Category::Sessions, recorder.clone(), token.clone());

        token.cancel();
        reporter.status("fetching", Severity::Info);
        reporter.item("x", None);
        assert!(!reporter.finish("done", Severity::Success));
        assert!(recorder.events.lock().unwrap().is_empty());
    }
}
