//! Progress aggregation for export jobs
//!
//! Jobs report progress as a single fraction in `[0, 1]`. Fanned-out jobs derive it
//! from the tracker counters; sequential jobs without a known total creep towards a
//! ceiling so the signal keeps moving without ever claiming completion early.

use std::sync::atomic::{AtomicU64, Ordering};

/// Saturating mode: share of the remaining distance covered per batch.
pub const DEFAULT_INCREMENT: f64 = 0.3;

/// Saturating mode: highest value reported before `complete()`.
pub const DEFAULT_CEILING: f64 = 0.95;

/// Value to report while nothing has been counted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyProgress {
    /// Work has not been discovered yet.
    Unknown,
    /// There is definitely nothing to export.
    NothingToExport,
}

/// Fraction of completed sub-streams, clamped to `[0, 1]`.
pub fn sample(pending: usize, total: usize, empty: EmptyProgress) -> f64 {
    if total == 0 {
        return match empty {
            EmptyProgress::Unknown => 0.0,
            EmptyProgress::NothingToExport => 1.0,
        };
    }
    let done = total.saturating_sub(pending) as f64;
    (done / total as f64).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressMode {
    /// Report tracker samples.
    Counted,
    /// Move a fixed share of the remaining distance per batch.
    Saturating { increment: f64, ceiling: f64 },
}

impl ProgressMode {
    pub fn saturating() -> Self {
        ProgressMode::Saturating {
            increment: DEFAULT_INCREMENT,
            ceiling: DEFAULT_CEILING,
        }
    }
}

/// Non-decreasing progress signal.
///
/// The current fraction is kept as `f64` bits in an atomic so that sub-streams on any
/// task can report without locking.
#[derive(Debug)]
pub struct ProgressAggregator {
    mode: ProgressMode,
    current: AtomicU64,
}

impl ProgressAggregator {
    pub fn new(mode: ProgressMode) -> Self {
        Self {
            mode,
            current: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn current(&self) -> f64 {
        f64::from_bits(self.current.load(Ordering::SeqCst))
    }

    /// Record tracker counters. Returns the new value when it moved forward.
    pub fn observe(&self, pending: usize, total: usize) -> Option<f64> {
        self.raise(sample(pending, total, EmptyProgress::Unknown))
    }

    /// Record one processed batch. Returns the new value when it moved forward.
    pub fn advance(&self) -> Option<f64> {
        match self.mode {
            ProgressMode::Saturating { increment, ceiling } => {
                let current = self.current();
                let next = (current + (ceiling - current) * increment).min(ceiling);
                self.raise(next)
            }
            ProgressMode::Counted => None,
        }
    }

    /// Jump to exactly 1.0.
    pub fn complete(&self) -> f64 {
        self.current.store(1f64.to_bits(), Ordering::SeqCst);
        1.0
    }

    fn raise(&self, value: f64) -> Option<f64> {
        let value = value.clamp(0.0, 1.0);
        let mut raised = None;
        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                if value > f64::from_bits(bits) {
                    raised = Some(value);
                    Some(value.to_bits())
                } else {
                    raised = None;
                    None
                }
            });
        raised
    }
}
