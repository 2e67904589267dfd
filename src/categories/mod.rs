//! Category exporters.
//!
//! Each exporter is a fixed recipe over the export engine: issue the category's
//! requests, page through listings, fan out per item where needed, accumulate
//! records, and conclude the job with one terminal status.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::ExportConfig;
use crate::error::RemoteError;
use crate::export::progress::ProgressMode;
use crate::export::writers::{ExportFormat, export_file_name};
use crate::export::{ExportJob, StatusSink};
use crate::remote::{
    Invocation, MediaDownloader, MediaLocation, MessageRange, RemoteFetch, SessionId,
    TakeoutBackend, TakeoutRequest, TakeoutResponse,
};

pub mod contacts;
pub mod conversations;
pub mod media;
pub mod personal_info;
pub mod profile_pictures;
pub mod saved_messages;
pub mod sessions;
pub mod stories;

pub use crate::export::job::CategoryReport;
pub use contacts::ContactRecord;
pub use conversations::{ConversationMessage, ConversationScope, DialogBuckets};
pub use personal_info::PersonalField;
pub use profile_pictures::ProfilePhotoRecord;
pub use saved_messages::SavedMessageRecord;
pub use sessions::SessionRecord;
pub use stories::StoryRecord;

/// A kind of account data that can be exported.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Contacts,
    PersonalInfo,
    ProfilePictures,
    Stories,
    PrivateMessages,
    GroupMessages,
    ChannelMessages,
    SavedMessages,
    Sessions,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Contacts,
        Category::PersonalInfo,
        Category::ProfilePictures,
        Category::Stories,
        Category::PrivateMessages,
        Category::GroupMessages,
        Category::ChannelMessages,
        Category::SavedMessages,
        Category::Sessions,
    ];

    /// Stem used in output file and folder names.
    pub fn slug(&self) -> &'static str {
        match self {
            Category::Contacts => "contacts",
            Category::PersonalInfo => "personal_info",
            Category::ProfilePictures => "profile_pictures",
            Category::Stories => "stories",
            Category::PrivateMessages => "private_messages",
            Category::GroupMessages => "group_messages",
            Category::ChannelMessages => "channel_messages",
            Category::SavedMessages => "saved_messages",
            Category::Sessions => "sessions",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Category::Contacts => "Contacts",
            Category::PersonalInfo => "Personal info",
            Category::ProfilePictures => "Profile pictures",
            Category::Stories => "Stories",
            Category::PrivateMessages => "Private messages",
            Category::GroupMessages => "Group messages",
            Category::ChannelMessages => "Channel messages",
            Category::SavedMessages => "Saved messages",
            Category::Sessions => "Sessions",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Everything an exporter needs for one run. Cheap to clone.
#[derive(Clone)]
pub struct ExportContext {
    backend: Arc<dyn TakeoutBackend>,
    session: SessionId,
    sink: Arc<dyn StatusSink>,
    settings: Arc<ExportConfig>,
    cancel: CancellationToken,
    downloads: Arc<Semaphore>,
    timestamp: Arc<str>,
}

impl ExportContext {
    pub fn new(
        backend: Arc<dyn TakeoutBackend>,
        session: SessionId,
        sink: Arc<dyn StatusSink>,
        settings: ExportConfig,
        cancel: CancellationToken,
        timestamp: String,
    ) -> Self {
        let downloads = Arc::new(Semaphore::new(settings.max_concurrent_downloads.max(1)));
        Self {
            backend,
            session,
            sink,
            settings: Arc::new(settings),
            cancel,
            downloads,
            timestamp: timestamp.into(),
        }
    }

    pub fn settings(&self) -> &ExportConfig {
        &self.settings
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn format(&self) -> ExportFormat {
        self.settings.format
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn job<T>(&self, category: Category, mode: ProgressMode) -> Arc<ExportJob<T>> {
        Arc::new(ExportJob::new(
            category,
            self.session,
            Arc::clone(&self.sink),
            &self.cancel,
            mode,
        ))
    }

    /// Issue one request inside the takeout session.
    pub async fn invoke(&self, request: TakeoutRequest) -> Result<TakeoutResponse, RemoteError> {
        self.backend
            .send(Invocation::new(self.session, request))
            .await
    }

    /// Issue one request restricted to a message range.
    pub async fn invoke_in(
        &self,
        range: MessageRange,
        request: TakeoutRequest,
    ) -> Result<TakeoutResponse, RemoteError> {
        self.backend
            .send(Invocation::new(self.session, request).in_range(range))
            .await
    }

    /// Download media, bounded by the shared download pool and the configured timeout.
    pub async fn download(&self, location: &MediaLocation) -> Result<Vec<u8>, RemoteError> {
        let _permit = self
            .downloads
            .acquire()
            .await
            .map_err(|_| RemoteError::MediaUnavailable("download pool closed".into()))?;
        let limit = self.settings.download_timeout();
        match tokio::time::timeout(limit, self.backend.download(location)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(format!(
                "download of {} after {}s",
                location.0,
                limit.as_secs()
            ))),
        }
    }

    /// `<output_dir>/<category>_<timestamp>.<ext>`
    pub fn record_path(&self, category: Category) -> PathBuf {
        self.settings.output_dir.join(export_file_name(
            category.slug(),
            &self.timestamp,
            self.settings.format,
        ))
    }

    /// `<output_dir>/<category>_<timestamp>/` for categories that write media.
    pub fn media_dir(&self, category: Category) -> PathBuf {
        self.settings
            .output_dir
            .join(format!("{}_{}", category.slug(), self.timestamp))
    }
}

/// Run one category to completion.
pub async fn run(ctx: ExportContext, category: Category) -> CategoryReport {
    match category {
        Category::Contacts => contacts::export(&ctx).await,
        Category::PersonalInfo => personal_info::export(&ctx).await,
        Category::ProfilePictures => profile_pictures::export(&ctx).await,
        Category::Stories => stories::export(&ctx).await,
        Category::PrivateMessages => conversations::export(&ctx, ConversationScope::Private).await,
        Category::GroupMessages => conversations::export(&ctx, ConversationScope::Group).await,
        Category::ChannelMessages => conversations::export(&ctx, ConversationScope::Channel).await,
        Category::SavedMessages => saved_messages::export(&ctx).await,
        Category::Sessions => sessions::export(&ctx).await,
    }
}
