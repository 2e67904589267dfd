//! Takeout Library
//!
//! Bulk export of account data over a takeout session. The library pulls several
//! categories of remote data through a paginated request interface, tracks the
//! completion of fanned-out sub-streams, and writes each category as CSV or JSON.
//!
//! # Modules
//!
//! - `categories`: One exporter per kind of account data
//! - `cli`: Command-line interface and console presentation
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `export`: Cursor engine, fan-out tracker, progress, accumulator and writers
//! - `remote`: Backend ports and the account snapshot backend
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use takeout::categories::Category;
//! use takeout::config::Config;
//! use takeout::export::{TakeoutCoordinator, TracingSink};
//! use takeout::remote::{AccountSnapshot, SnapshotBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let snapshot = AccountSnapshot::from_file("account.json").await?;
//!     let coordinator = TakeoutCoordinator::new(
//!         Arc::new(SnapshotBackend::new(snapshot)),
//!         Arc::new(TracingSink),
//!         Config::default().export,
//!     );
//!
//!     let summary = coordinator
//!         .execute(&[Category::Contacts, Category::SavedMessages])
//!         .await?;
//!     println!("{} categories exported", summary.reports.len());
//!     Ok(())
//! }
//! ```

pub mod categories;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod remote;

// Re-export commonly used types
pub use categories::Category;
pub use config::Config;
pub use error::{Result, TakeoutError};
pub use export::{ExportFormat, TakeoutCoordinator, TakeoutSummary};
pub use remote::{AccountSnapshot, SnapshotBackend};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
