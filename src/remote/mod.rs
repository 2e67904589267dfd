//! Ports to the remote backend.
//!
//! The export engine only talks to the backend through three capabilities:
//!
//! 1. **RemoteFetch**: issue one request inside a takeout session, get one response
//! 2. **SessionLifecycle**: open and close the takeout session itself
//! 3. **MediaDownloader**: resolve a media location into bytes
//!
//! Implementations hold no per-stream state, so a single instance is shared by every
//! job of a run. [`SnapshotBackend`] implements all three over an account snapshot.

use async_trait::async_trait;

pub mod snapshot;
pub mod types;

pub use snapshot::{AccountSnapshot, ConversationHistory, SnapshotBackend};
pub use types::*;

use crate::error::RemoteError;

/// Issues one paginated request and returns one typed page.
#[async_trait]
pub trait RemoteFetch: Send + Sync {
    async fn send(&self, call: Invocation) -> Result<TakeoutResponse, RemoteError>;
}

/// Opens and closes takeout sessions.
#[async_trait]
pub trait SessionLifecycle: Send + Sync {
    async fn open_session(&self, options: &TakeoutOptions) -> Result<SessionId, RemoteError>;

    async fn close_session(&self, session: SessionId, success: bool) -> Result<(), RemoteError>;
}

/// Downloads media referenced by photos, stories and documents.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download(&self, location: &MediaLocation) -> Result<Vec<u8>, RemoteError>;
}

/// Everything a takeout run needs from the backend.
pub trait TakeoutBackend: RemoteFetch + SessionLifecycle + MediaDownloader {}

impl<T> TakeoutBackend for T where T: RemoteFetch + SessionLifecycle + MediaDownloader {}
