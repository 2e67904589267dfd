//! Completion tracking for fanned-out sub-streams.
//!
//! A job that enumerates a listing (dialogs, photos, stories) spawns one sub-stream per
//! listed item. The tracker counts those sub-streams and resolves [`Drained`] exactly
//! once, when every sub-stream has completed *and* every enumeration that could still
//! enqueue more has closed.
//!
//! The tracker starts with one open enumeration, owned by whoever created it:
//!
//! ```
//! # tokio_test::block_on(async {
//! use takeout::export::fanout::{Completion, FanOutTracker};
//!
//! let (tracker, drained) = FanOutTracker::new();
//! tracker.enqueue(2).unwrap();
//! assert_eq!(tracker.complete_one(), Completion::Pending);
//! assert_eq!(tracker.complete_one(), Completion::Pending);
//! assert_eq!(tracker.close_enumeration(), Completion::Finalized);
//! assert!(drained.await);
//! # });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ExportError;

/// Result of a completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Work remains.
    Pending,
    /// This call fired finalize.
    Finalized,
    /// Nothing was pending; the call was ignored.
    Overrun,
}

/// Counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutSnapshot {
    pub pending: usize,
    pub total: usize,
    pub open_enumerations: usize,
    pub finalized: bool,
}

struct Inner {
    pending: AtomicUsize,
    total: AtomicUsize,
    open_enumerations: AtomicUsize,
    finalized: AtomicBool,
    notify: Mutex<Option<oneshot::Sender<()>>>,
}

/// Shared handle to one fan-out set.
#[derive(Clone)]
pub struct FanOutTracker {
    inner: Arc<Inner>,
}

/// Resolves once the fan-out set finalizes.
///
/// Yields `true` on finalize and `false` if every tracker handle was dropped first.
pub struct Drained {
    rx: oneshot::Receiver<()>,
}

impl Future for Drained {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        Pin::new(&mut self.rx).poll(cx).map(|res| res.is_ok())
    }
}

impl FanOutTracker {
    pub fn new() -> (Self, Drained) {
        let (tx, rx) = oneshot::channel();
        let tracker = Self {
            inner: Arc::new(Inner {
                pending: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
                open_enumerations: AtomicUsize::new(1),
                finalized: AtomicBool::new(false),
                notify: Mutex::new(Some(tx)),
            }),
        };
        (tracker, Drained { rx })
    }

    /// Register `n` sub-streams. Only valid while an enumeration is open.
    pub fn enqueue(&self, n: usize) -> Result<(), ExportError> {
        if self.inner.open_enumerations.load(Ordering::SeqCst) == 0 {
            warn!("Rejected {} sub-streams: enumeration already closed", n);
            return Err(ExportError::FanOutSealed);
        }
        self.inner.total.fetch_add(n, Ordering::SeqCst);
        self.inner.pending.fetch_add(n, Ordering::SeqCst);
        Ok(())
    }

    /// Open a nested enumeration. Only valid while another enumeration is open.
    pub fn open_enumeration(&self) -> Result<(), ExportError> {
        self.inner
            .open_enumerations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| {
                (open > 0).then_some(open + 1)
            })
            .map(|_| ())
            .map_err(|_| ExportError::FanOutSealed)
    }

    /// Close one enumeration; may fire finalize.
    pub fn close_enumeration(&self) -> Completion {
        match self
            .inner
            .open_enumerations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| open.checked_sub(1))
        {
            Ok(1) => self.try_finalize(),
            Ok(_) => Completion::Pending,
            Err(_) => Completion::Overrun,
        }
    }

    /// Mark one sub-stream complete; may fire finalize.
    ///
    /// Calls beyond the enqueued count are ignored.
    pub fn complete_one(&self) -> Completion {
        match self
            .inner
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| pending.checked_sub(1))
        {
            Ok(1) => self.try_finalize(),
            Ok(_) => Completion::Pending,
            Err(_) => {
                debug!("complete_one with nothing pending");
                Completion::Overrun
            }
        }
    }

    pub fn snapshot(&self) -> FanOutSnapshot {
        FanOutSnapshot {
            pending: self.inner.pending.load(Ordering::SeqCst),
            total: self.inner.total.load(Ordering::SeqCst),
            open_enumerations: self.inner.open_enumerations.load(Ordering::SeqCst),
            finalized: self.inner.finalized.load(Ordering::SeqCst),
        }
    }

    /// A guard that calls [`complete_one`](Self::complete_one) when dropped, so a
    /// sub-stream counts as complete however it ends.
    pub fn completion_guard(&self) -> CompletionGuard {
        CompletionGuard {
            tracker: self.clone(),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.finalized.load(Ordering::SeqCst)
    }

    fn try_finalize(&self) -> Completion {
        if self.inner.pending.load(Ordering::SeqCst) != 0
            || self.inner.open_enumerations.load(Ordering::SeqCst) != 0
        {
            return Completion::Pending;
        }
        if self
            .inner
            .finalized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Completion::Pending;
        }

        let sender = self
            .inner
            .notify
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
        debug!(
            "Fan-out drained after {} sub-streams",
            self.inner.total.load(Ordering::SeqCst)
        );
        Completion::Finalized
    }
}

/// Completes one sub-stream on drop.
pub struct CompletionGuard {
    tracker: FanOutTracker,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.tracker.complete_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_substreams_finalizes_on_close() {
        let (tracker, drained) = FanOutTracker::new();
        assert_eq!(tracker.close_enumeration(), Completion::Finalized);
        assert!(drained.await);
    }

    #[test]
    fn test_enumeration_gate_holds_finalize() {
        // Page one: three sub-streams that all finish before page two is listed.
        let (tracker, _drained) = FanOutTracker::new();
        tracker.enqueue(3).unwrap();
        for _ in 0..3 {
            assert_eq!(tracker.complete_one(), Completion::Pending);
        }
        assert!(!tracker.is_finalized());

        tracker.enqueue(2).unwrap();
        assert_eq!(tracker.close_enumeration(), Completion::Pending);
        assert_eq!(tracker.complete_one(), Completion::Pending);
        assert_eq!(tracker.complete_one(), Completion::Finalized);
        assert_eq!(tracker.snapshot().total, 5);
    }

    #[test]
    fn test_finalize_once_for_every_ordering() {
        for n in 0..=5usize {
            // The close can land at any point among the n completions.
            for close_at in 0..=n {
                let (tracker, _drained) = FanOutTracker::new();
                tracker.enqueue(n).unwrap();
                let mut fired = 0;
                for step in 0..=n {
                    let completion = if step == close_at {
                        tracker.close_enumeration()
                    } else {
                        tracker.complete_one()
                    };
                    if completion == Completion::Finalized {
                        fired += 1;
                    }
                }
                assert_eq!(fired, 1, "n={n} close_at={close_at}");
                assert!(tracker.is_finalized());
            }
        }
    }

    #[test]
    fn test_overrun_never_underflows() {
        let (tracker, _drained) = FanOutTracker::new();
        tracker.enqueue(2).unwrap();
        tracker.close_enumeration();
        assert_eq!(tracker.complete_one(), Completion::Pending);
        assert_eq!(tracker.complete_one(), Completion::Finalized);
        assert_eq!(tracker.complete_one(), Completion::Overrun);
        assert_eq!(tracker.close_enumeration(), Completion::Overrun);
        assert_eq!(tracker.snapshot().pending, 0);
    }

    #[test]
    fn test_enqueue_after_close_rejected() {
        let (tracker, _drained) = FanOutTracker::new();
        tracker.close_enumeration();
        assert!(matches!(tracker.enqueue(1), Err(ExportError::FanOutSealed)));
        assert!(tracker.open_enumeration().is_err());
    }

    #[test]
    fn test_nested_enumerations() {
        let (tracker, _drained) = FanOutTracker::new();
        tracker.open_enumeration().unwrap();
        tracker.open_enumeration().unwrap();
        assert_eq!(tracker.close_enumeration(), Completion::Pending);
        tracker.enqueue(1).unwrap();
        assert_eq!(tracker.close_enumeration(), Completion::Pending);
        assert_eq!(tracker.complete_one(), Completion::Pending);
        assert_eq!(tracker.close_enumeration(), Completion::Finalized);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completion_fires_once() {
        let (tracker, drained) = FanOutTracker::new();
        tracker.enqueue(200).unwrap();

        let mut handles = Vec::new();
        for i in 0..200u64 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_micros(i % 7)).await;
                tracker.complete_one()
            }));
        }
        let closer = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.close_enumeration() })
        };

        let mut fired = 0;
        for handle in handles {
            if handle.await.unwrap() == Completion::Finalized {
                fired += 1;
            }
        }
        if closer.await.unwrap() == Completion::Finalized {
            fired += 1;
        }

        assert_eq!(fired, 1);
        assert!(drained.await);
    }

    #[tokio::test]
    async fn test_guard_completes_panicking_substream() {
        let (tracker, drained) = FanOutTracker::new();
        tracker.enqueue(1).unwrap();
        let guard = tracker.completion_guard();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("sub-stream blew up");
        });
        assert!(handle.await.is_err());
        tracker.close_enumeration();
        assert!(drained.await);
    }

    #[tokio::test]
    async fn test_drained_reports_abandonment() {
        let (tracker, drained) = FanOutTracker::new();
        drop(tracker);
        assert!(!drained.await);
    }
}
