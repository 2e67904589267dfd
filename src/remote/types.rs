//! Typed payloads exchanged with the remote backend.
//!
//! These mirror what the backend hands out for a takeout session. Wire encoding is the
//! transport's business; here they are plain serde types so that a snapshot of an
//! account can be loaded from disk.

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Opaque takeout session capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub i64);

/// A message id window that the backend wants bulk reads split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRange {
    pub min_id: i32,
    pub max_id: i32,
}

impl MessageRange {
    /// The range covering every message id.
    pub const FULL: MessageRange = MessageRange {
        min_id: 0,
        max_id: i32::MAX,
    };

    pub fn contains(&self, id: i32) -> bool {
        id >= self.min_id && id <= self.max_id
    }
}

/// Conversation peer as it appears on a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Peer {
    User { user_id: i64 },
    Chat { chat_id: i64 },
    Channel { channel_id: i64 },
}

/// Peer reference usable in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputPeer {
    #[default]
    Empty,
    SelfUser,
    User { user_id: i64, access_hash: i64 },
    Chat { chat_id: i64 },
    Channel { channel_id: i64, access_hash: i64 },
}

impl InputPeer {
    /// The dialog peer this input peer addresses, if any.
    pub fn peer(&self) -> Option<Peer> {
        match *self {
            InputPeer::User { user_id, .. } => Some(Peer::User { user_id }),
            InputPeer::Chat { chat_id } => Some(Peer::Chat { chat_id }),
            InputPeer::Channel { channel_id, .. } => Some(Peer::Channel { channel_id }),
            InputPeer::Empty | InputPeer::SelfUser => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialog {
    pub peer: Peer,
    pub top_message: i32,
    pub last_message_date: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub access_hash: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Whether the user is in the account's contact list.
    #[serde(default)]
    pub contact: bool,
}

impl User {
    /// "First Last", trimmed; empty when neither name is set.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("");
        let last = self.last_name.as_deref().unwrap_or("");
        format!("{first} {last}").trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    #[default]
    Basic,
    Megagroup,
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub access_hash: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub kind: ChatKind,
}

/// Opaque handle the media downloader resolves into bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaLocation(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoSize {
    #[serde(default)]
    pub kind: String,
    pub w: u32,
    pub h: u32,
    /// Size in bytes.
    pub size: u64,
    pub location: MediaLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub date: i64,
    #[serde(default)]
    pub sizes: Vec<PhotoSize>,
}

impl Photo {
    /// The largest available size, by pixel area.
    pub fn largest_size(&self) -> Option<&PhotoSize> {
        self.sizes
            .iter()
            .max_by_key(|s| (u64::from(s.w) * u64::from(s.h), s.size))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub location: MediaLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageMedia {
    Photo { photo: Photo },
    Document { document: Document },
    /// Geo points, polls, contacts and other non-file media.
    Other,
}

impl MessageMedia {
    /// Coarse media type label used in exported metadata.
    pub fn kind_label(&self) -> &'static str {
        match self {
            MessageMedia::Photo { .. } => "photo",
            MessageMedia::Document { document } => match document.mime_type.as_deref() {
                Some(mime) if mime.starts_with("video/") => "video",
                Some(mime) if mime.starts_with("audio/") => "audio",
                _ => "other",
            },
            MessageMedia::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i32,
    pub date: i64,
    #[serde(default)]
    pub from_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub media: Option<MessageMedia>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryItem {
    pub id: i32,
    pub date: i64,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub media: Option<MessageMedia>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedContact {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullUser {
    pub user: User,
    #[serde(default)]
    pub about: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub device_model: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    pub date_active: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebAuthorization {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    pub date_active: i64,
}

/// One page of a dialog listing.
///
/// `count` is the server-declared total for a sliced listing and `None` when the
/// page is the complete list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DialogsPage {
    pub dialogs: Vec<Dialog>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub chats: Vec<Chat>,
    #[serde(default)]
    pub count: Option<u64>,
}

impl DialogsPage {
    pub fn user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn chat(&self, id: i64) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    /// Resolve a dialog into a request peer using this page's lookup tables.
    pub fn input_peer(&self, dialog: &Dialog) -> Option<InputPeer> {
        match dialog.peer {
            Peer::User { user_id } => self.user(user_id).map(|u| InputPeer::User {
                user_id: u.id,
                access_hash: u.access_hash,
            }),
            Peer::Chat { chat_id } => self.chat(chat_id).map(|c| InputPeer::Chat { chat_id: c.id }),
            Peer::Channel { channel_id } => self.chat(channel_id).map(|c| InputPeer::Channel {
                channel_id: c.id,
                access_hash: c.access_hash,
            }),
        }
    }
}

/// Options for opening a takeout session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeoutOptions {
    pub contacts: bool,
    pub message_users: bool,
    pub message_chats: bool,
    pub message_megagroups: bool,
    pub message_channels: bool,
    pub files: bool,
    /// Upper bound for exported files, in bytes. Only meaningful with `files`.
    pub file_max_size: Option<u64>,
}

/// A single request issued within a takeout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TakeoutRequest {
    GetSplitRanges,
    GetSavedContacts,
    GetFullUser,
    GetUserPhotos {
        offset: u32,
        limit: u32,
    },
    GetStoriesArchive {
        offset_id: i32,
        limit: u32,
    },
    GetDialogs {
        offset_date: i64,
        offset_id: i32,
        offset_peer: InputPeer,
        limit: u32,
    },
    GetHistory {
        peer: InputPeer,
        offset_id: i32,
        offset_date: i64,
        limit: u32,
    },
    SearchSaved {
        offset_id: i32,
        limit: u32,
    },
    GetAuthorizations,
    GetWebAuthorizations,
}

/// A request bound to a takeout session and, optionally, a message range.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub session: SessionId,
    pub range: Option<MessageRange>,
    pub request: TakeoutRequest,
}

impl Invocation {
    pub fn new(session: SessionId, request: TakeoutRequest) -> Self {
        Self {
            session,
            range: None,
            request,
        }
    }

    pub fn in_range(mut self, range: MessageRange) -> Self {
        self.range = Some(range);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TakeoutResponse {
    SplitRanges(Vec<MessageRange>),
    SavedContacts(Vec<SavedContact>),
    FullUser(FullUser),
    Photos { photos: Vec<Photo>, count: Option<u64> },
    Stories { stories: Vec<StoryItem>, count: Option<u64> },
    Dialogs(DialogsPage),
    Messages(Vec<Message>),
    Authorizations(Vec<Authorization>),
    WebAuthorizations(Vec<WebAuthorization>),
}

impl TakeoutResponse {
    /// Variant name, for shape errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TakeoutResponse::SplitRanges(_) => "SplitRanges",
            TakeoutResponse::SavedContacts(_) => "SavedContacts",
            TakeoutResponse::FullUser(_) => "FullUser",
            TakeoutResponse::Photos { .. } => "Photos",
            TakeoutResponse::Stories { .. } => "Stories",
            TakeoutResponse::Dialogs(_) => "Dialogs",
            TakeoutResponse::Messages(_) => "Messages",
            TakeoutResponse::Authorizations(_) => "Authorizations",
            TakeoutResponse::WebAuthorizations(_) => "WebAuthorizations",
        }
    }

    fn unexpected(self, expected: &'static str) -> RemoteError {
        RemoteError::UnexpectedResponse {
            expected,
            found: self.kind(),
        }
    }

    pub fn into_split_ranges(self) -> Result<Vec<MessageRange>, RemoteError> {
        match self {
            TakeoutResponse::SplitRanges(ranges) => Ok(ranges),
            other => Err(other.unexpected("SplitRanges")),
        }
    }

    pub fn into_saved_contacts(self) -> Result<Vec<SavedContact>, RemoteError> {
        match self {
            TakeoutResponse::SavedContacts(contacts) => Ok(contacts),
            other => Err(other.unexpected("SavedContacts")),
        }
    }

    pub fn into_full_user(self) -> Result<FullUser, RemoteError> {
        match self {
            TakeoutResponse::FullUser(full) => Ok(full),
            other => Err(other.unexpected("FullUser")),
        }
    }

    pub fn into_photos(self) -> Result<(Vec<Photo>, Option<u64>), RemoteError> {
        match self {
            TakeoutResponse::Photos { photos, count } => Ok((photos, count)),
            other => Err(other.unexpected("Photos")),
        }
    }

    pub fn into_stories(self) -> Result<(Vec<StoryItem>, Option<u64>), RemoteError> {
        match self {
            TakeoutResponse::Stories { stories, count } => Ok((stories, count)),
            other => Err(other.unexpected("Stories")),
        }
    }

    pub fn into_dialogs(self) -> Result<DialogsPage, RemoteError> {
        match self {
            TakeoutResponse::Dialogs(page) => Ok(page),
            other => Err(other.unexpected("Dialogs")),
        }
    }

    pub fn into_messages(self) -> Result<Vec<Message>, RemoteError> {
        match self {
            TakeoutResponse::Messages(messages) => Ok(messages),
            other => Err(other.unexpected("Messages")),
        }
    }

    pub fn into_authorizations(self) -> Result<Vec<Authorization>, RemoteError> {
        match self {
            TakeoutResponse::Authorizations(auths) => Ok(auths),
            other => Err(other.unexpected("Authorizations")),
        }
    }

    pub fn into_web_authorizations(self) -> Result<Vec<WebAuthorization>, RemoteError> {
        match self {
            TakeoutResponse::WebAuthorizations(auths) => Ok(auths),
            other => Err(other.unexpected("WebAuthorizations")),
        }
    }
}
