//! Takeout coordinator
//!
//! Opens the takeout session with options derived from the selected categories, runs
//! every category concurrently, and closes the session with the overall outcome.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::categories::{self, Category, ExportContext};
use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::remote::{SessionId, SessionLifecycle, TakeoutBackend, TakeoutOptions};

use super::job::CategoryReport;
use super::status::{Severity, StatusSink};
use super::writers::run_timestamp;

/// Result of a takeout run
#[derive(Debug, Clone)]
pub struct TakeoutSummary {
    pub session: SessionId,
    pub reports: Vec<CategoryReport>,
    pub elapsed_ms: u64,
    /// Whether the run was cancelled
    pub cancelled: bool,
    /// Whether the session was closed without error
    pub session_closed: bool,
}

impl TakeoutSummary {
    /// True when every category finished without failure and the run was not cancelled.
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.reports.iter().all(|r| r.severity != Severity::Failure)
    }
}

/// Coordinator for a takeout run
pub struct TakeoutCoordinator {
    backend: Arc<dyn TakeoutBackend>,
    sink: Arc<dyn StatusSink>,
    settings: ExportConfig,
    cancel_token: CancellationToken,
}

impl TakeoutCoordinator {
    pub fn new(
        backend: Arc<dyn TakeoutBackend>,
        sink: Arc<dyn StatusSink>,
        settings: ExportConfig,
    ) -> Self {
        Self {
            backend,
            sink,
            settings,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Set cancellation token for this run
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Session options for a category selection
    pub fn options_for(categories: &[Category], settings: &ExportConfig) -> TakeoutOptions {
        let has = |c: Category| categories.contains(&c);
        TakeoutOptions {
            contacts: has(Category::Contacts),
            message_users: has(Category::PrivateMessages),
            message_chats: has(Category::GroupMessages),
            message_megagroups: has(Category::GroupMessages),
            message_channels: has(Category::ChannelMessages),
            files: settings.file_max_size_mb.is_some(),
            file_max_size: settings.file_max_size_bytes(),
        }
    }

    /// Execute the takeout run
    ///
    /// Fails only when nothing is selected or the session cannot be opened. Category
    /// failures are carried in the summary.
    pub async fn execute(&self, selection: &[Category]) -> Result<TakeoutSummary> {
        let start_time = Instant::now();

        let mut selected: Vec<Category> = Vec::new();
        for category in selection {
            if !selected.contains(category) {
                selected.push(*category);
            }
        }
        if selected.is_empty() {
            return Err(ExportError::NothingSelected.into());
        }

        let options = Self::options_for(&selected, &self.settings);
        let session = self.backend.open_session(&options).await?;
        info!("Takeout session {} opened for {} categories", session.0, selected.len());

        let ctx = ExportContext::new(
            Arc::clone(&self.backend),
            session,
            Arc::clone(&self.sink),
            self.settings.clone(),
            self.cancel_token.clone(),
            run_timestamp(),
        );

        let runs = selected.iter().map(|&category| {
            let ctx = ctx.clone();
            categories::run(ctx, category).instrument(info_span!("export", category = %category))
        });
        let reports = join_all(runs).await;

        let cancelled = self.cancel_token.is_cancelled();
        let success = !cancelled && reports.iter().all(|r| r.severity != Severity::Failure);

        let session_closed = match self.backend.close_session(session, success).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to close takeout session {}: {}", session.0, e);
                false
            }
        };

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Takeout run finished in {} ms (success: {}, cancelled: {})",
            elapsed_ms, success, cancelled
        );

        Ok(TakeoutSummary {
            session,
            reports,
            elapsed_ms,
            cancelled,
            session_closed,
        })
    }
}
