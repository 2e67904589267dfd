//! Error handling for takeout exports.
//!
//! Errors are grouped by the layer that raises them:
//! - `RemoteError`: the fetch port, session lifecycle and media downloads
//! - `ExportError`: the engine and the serialization writers
//! - `ConfigError`: configuration loading and validation
//!
//! All of them convert into the crate-wide [`TakeoutError`].
//!
//! # Example
//!
//! ```rust
//! use takeout::error::{RemoteError, Result, TakeoutError};
//!
//! fn fetch_page() -> Result<()> {
//!     Err(RemoteError::rpc(420, "FLOOD_WAIT_3").into())
//! }
//!
//! let err = fetch_page().unwrap_err();
//! assert!(matches!(err, TakeoutError::Remote(_)));
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{ConfigError, ExportError, RemoteError, Result, TakeoutError};
