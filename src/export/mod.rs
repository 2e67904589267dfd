//! Export engine
//!
//! The pieces every category exporter is assembled from:
//!
//! 1. **CursorEngine**: drives one paginated listing to exhaustion
//! 2. **FanOutTracker**: counts per-item sub-streams and fires finalize exactly once
//! 3. **ProgressAggregator**: folds counters or batches into one fraction
//! 4. **ResultAccumulator**: collects records from every stream of a job
//! 5. **FormatWriter**: writes the final record set as CSV or JSON
//!
//! An [`ExportJob`] ties them to one category and a [`StatusSink`]; the
//! [`TakeoutCoordinator`] opens the takeout session, runs the selected categories
//! concurrently and closes the session.

pub mod accumulator;
pub mod coordinator;
pub mod cursor;
pub mod fanout;
pub mod job;
pub mod progress;
pub mod status;
pub mod writers;

pub use accumulator::ResultAccumulator;
pub use coordinator::{TakeoutCoordinator, TakeoutSummary};
pub use cursor::{CursorEngine, Page, PageCursor, PageSource, StopRule, StreamOutcome};
pub use fanout::{Completion, Drained, FanOutTracker};
pub use job::{CategoryReport, ExportJob, FailureRecord};
pub use progress::{ProgressAggregator, ProgressMode};
pub use status::{Severity, StatusReporter, StatusSink, TracingSink};
pub use writers::{CsvWriter, ExportFormat, ExportRecord, FormatWriter, JsonWriter, WriteSummary};
