//! Cursor-driven pagination.
//!
//! A [`PageSource`] knows how to fetch one page for a position and how to derive the
//! following position from a page it just returned. [`CursorEngine`] drives a source
//! until its stop rule fires, handing every page to a sink before the next fetch.

use std::fmt::Debug;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RemoteError;

/// One page as received from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Server-declared total for sliced listings.
    pub declared_total: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            declared_total: None,
        }
    }

    pub fn with_total(items: Vec<T>, declared_total: Option<u64>) -> Self {
        Self {
            items,
            declared_total,
        }
    }
}

/// When a stream counts as exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRule {
    /// Stop once the accumulated count reaches the declared total, or as soon as a
    /// page arrives without a declared total.
    DeclaredTotal,
    /// Stop on the first page shorter than the requested limit.
    ShortPage,
}

/// A paginated listing with its own continuation-key semantics.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;
    type Position: Clone + PartialEq + Debug + Send + Sync;

    /// Name used in logs.
    fn label(&self) -> &str {
        "stream"
    }

    fn page_limit(&self) -> u32;

    fn stop_rule(&self) -> StopRule;

    async fn fetch(&self, position: &Self::Position) -> Result<Page<Self::Item>, RemoteError>;

    /// The position following `page`, derived from the page just received and the
    /// position it was fetched at.
    fn next_position(
        &self,
        current: &Self::Position,
        page: &Page<Self::Item>,
    ) -> Option<Self::Position>;
}

/// Continuation state of one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCursor<P> {
    pub position: P,
    pub pages: u32,
    pub items: u64,
    pub exhausted: bool,
}

impl<P> PageCursor<P> {
    pub fn new(start: P) -> Self {
        Self {
            position: start,
            pages: 0,
            items: 0,
            exhausted: false,
        }
    }
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub pages: u32,
    pub items: u64,
    /// The fetch error that terminated the stream, if any.
    pub error: Option<RemoteError>,
    pub cancelled: bool,
}

impl StreamOutcome {
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }
}

/// Drives one [`PageSource`] to exhaustion.
pub struct CursorEngine<S: PageSource> {
    source: S,
    cursor: PageCursor<S::Position>,
    cancel: CancellationToken,
}

impl<S: PageSource> CursorEngine<S> {
    pub fn new(source: S, start: S::Position, cancel: CancellationToken) -> Self {
        Self {
            source,
            cursor: PageCursor::new(start),
            cancel,
        }
    }

    /// Fetch pages until the stream is exhausted, fails or is cancelled.
    ///
    /// `sink` receives the items of each page before the next page is requested.
    /// Fetch errors end the stream and are reported in the outcome, never raised.
    pub async fn run<F>(mut self, mut sink: F) -> StreamOutcome
    where
        F: FnMut(Vec<S::Item>) + Send,
    {
        let limit = self.source.page_limit();
        let rule = self.source.stop_rule();
        let mut error = None;
        let mut cancelled = false;

        while !self.cursor.exhausted {
            if self.cancel.is_cancelled() {
                debug!("{}: cancelled after {} pages", self.source.label(), self.cursor.pages);
                cancelled = true;
                break;
            }

            let page = match self.source.fetch(&self.cursor.position).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("{}: fetch failed at {:?}: {}", self.source.label(), self.cursor.position, e);
                    error = Some(e);
                    break;
                }
            };

            let received = page.items.len();
            self.cursor.pages += 1;
            self.cursor.items += received as u64;
            debug!(
                "{}: page {} with {} items (total: {})",
                self.source.label(),
                self.cursor.pages,
                received,
                self.cursor.items
            );

            let stop = received == 0
                || match rule {
                    StopRule::DeclaredTotal => match page.declared_total {
                        Some(total) => self.cursor.items >= total,
                        None => true,
                    },
                    StopRule::ShortPage => received < limit as usize,
                };
            let next = if stop {
                None
            } else {
                self.source.next_position(&self.cursor.position, &page)
            };

            sink(page.items);

            match next {
                Some(position) if position != self.cursor.position => {
                    self.cursor.position = position;
                }
                Some(_) => {
                    warn!(
                        "{}: position did not advance past {:?}, stopping",
                        self.source.label(),
                        self.cursor.position
                    );
                    self.cursor.exhausted = true;
                }
                None => self.cursor.exhausted = true,
            }
        }

        StreamOutcome {
            pages: self.cursor.pages,
            items: self.cursor.items,
            error,
            cancelled,
        }
    }
}
