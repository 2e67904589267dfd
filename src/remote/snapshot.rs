//! Account snapshot backend.
//!
//! Serves a takeout session from a JSON dump of an account. Pagination follows the
//! backend's rules: dialogs are ordered newest first and continue after
//! `(offset_date, offset_id, offset_peer)`, history continues below `offset_id`,
//! saved-message search continues at or below `offset_id`, and photos use a plain
//! numeric offset. A range-limited dialog listing includes every dialog with a
//! message in the range.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::types::*;
use super::{MediaDownloader, RemoteFetch, SessionLifecycle};
use crate::error::{RemoteError, Result};

/// Message history of one conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub peer: Option<Peer>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Everything the backend knows about one account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub contacts: Vec<SavedContact>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub stories: Vec<StoryItem>,
    #[serde(default = "default_ranges")]
    pub ranges: Vec<MessageRange>,
    #[serde(default)]
    pub dialogs: Vec<Dialog>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub chats: Vec<Chat>,
    #[serde(default)]
    pub history: Vec<ConversationHistory>,
    #[serde(default)]
    pub saved: Vec<Message>,
    #[serde(default)]
    pub authorizations: Vec<Authorization>,
    #[serde(default)]
    pub web_authorizations: Vec<WebAuthorization>,
    /// Media bytes keyed by location, base64 encoded.
    #[serde(default)]
    pub media: HashMap<String, String>,
}

fn default_ranges() -> Vec<MessageRange> {
    vec![MessageRange::FULL]
}

impl AccountSnapshot {
    /// Load a snapshot from a JSON file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let snapshot: AccountSnapshot = serde_json::from_str(&raw)?;
        info!(
            "Loaded account snapshot: {} dialogs, {} contacts, {} photos, {} stories",
            snapshot.dialogs.len(),
            snapshot.contacts.len(),
            snapshot.photos.len(),
            snapshot.stories.len()
        );
        Ok(snapshot)
    }

    fn messages_for(&self, peer: Peer) -> &[Message] {
        self.history
            .iter()
            .find(|h| h.peer == Some(peer))
            .map(|h| h.messages.as_slice())
            .unwrap_or(&[])
    }
}

/// Listing order of dialogs: newest first, ties broken on the peer.
fn dialog_order(dialog: &Dialog) -> (i64, i32, Option<(u8, i64)>) {
    (
        dialog.last_message_date,
        dialog.top_message,
        Some(peer_order(dialog.peer)),
    )
}

fn peer_order(peer: Peer) -> (u8, i64) {
    match peer {
        Peer::User { user_id } => (0, user_id),
        Peer::Chat { chat_id } => (1, chat_id),
        Peer::Channel { channel_id } => (2, channel_id),
    }
}

/// In-memory backend over an [`AccountSnapshot`].
pub struct SnapshotBackend {
    snapshot: AccountSnapshot,
    latency: Option<Duration>,
    sessions: Mutex<HashSet<i64>>,
    next_session: AtomicI64,
}

impl SnapshotBackend {
    pub fn new(snapshot: AccountSnapshot) -> Self {
        Self {
            snapshot,
            latency: None,
            sessions: Mutex::new(HashSet::new()),
            next_session: AtomicI64::new(1),
        }
    }

    /// Delay every call, so that concurrent streams interleave like they would
    /// against a real backend.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn session_open(&self, session: SessionId) -> bool {
        self.sessions
            .lock()
            .map(|open| open.contains(&session.0))
            .unwrap_or(false)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn dialogs_page(
        &self,
        range: MessageRange,
        offset_date: i64,
        offset_id: i32,
        offset_peer: InputPeer,
        limit: u32,
    ) -> DialogsPage {
        let mut dialogs: Vec<Dialog> = self
            .snapshot
            .dialogs
            .iter()
            .filter_map(|d| self.dialog_in_range(d, range))
            .collect();
        dialogs.sort_by(|a, b| dialog_order(b).cmp(&dialog_order(a)));

        let total = dialogs.len() as u64;
        let from_start = offset_date == 0 && offset_id == 0;
        let offset = (offset_date, offset_id, offset_peer.peer().map(peer_order));
        let page: Vec<Dialog> = dialogs
            .into_iter()
            .filter(|d| from_start || dialog_order(d) < offset)
            .take(limit as usize)
            .collect();

        let users = self
            .snapshot
            .users
            .iter()
            .filter(|u| page.iter().any(|d| d.peer == Peer::User { user_id: u.id }))
            .cloned()
            .collect();
        let chats = self
            .snapshot
            .chats
            .iter()
            .filter(|c| {
                page.iter().any(|d| {
                    d.peer == Peer::Chat { chat_id: c.id } || d.peer == Peer::Channel { channel_id: c.id }
                })
            })
            .cloned()
            .collect();

        // A listing that fits in one page comes back complete, without a count.
        let count = if from_start && total <= u64::from(limit) {
            None
        } else {
            Some(total)
        };

        DialogsPage {
            dialogs: page,
            users,
            chats,
            count,
        }
    }

    /// The dialog as a range-limited listing reports it: present when any of its
    /// messages falls in the range, dated by its newest message there.
    fn dialog_in_range(&self, dialog: &Dialog, range: MessageRange) -> Option<Dialog> {
        let messages = self.snapshot.messages_for(dialog.peer);
        if messages.is_empty() {
            return range.contains(dialog.top_message).then(|| dialog.clone());
        }
        messages
            .iter()
            .filter(|m| range.contains(m.id))
            .max_by_key(|m| m.id)
            .map(|newest| Dialog {
                peer: dialog.peer,
                top_message: newest.id,
                last_message_date: newest.date,
            })
    }

    fn check_peer(&self, peer: InputPeer) -> std::result::Result<Peer, RemoteError> {
        let invalid = || RemoteError::rpc(400, "PEER_ID_INVALID");
        match peer {
            InputPeer::User {
                user_id,
                access_hash,
            } => self
                .snapshot
                .users
                .iter()
                .find(|u| u.id == user_id && u.access_hash == access_hash)
                .map(|_| Peer::User { user_id })
                .ok_or_else(invalid),
            InputPeer::Chat { chat_id } => Ok(Peer::Chat { chat_id }),
            InputPeer::Channel {
                channel_id,
                access_hash,
            } => self
                .snapshot
                .chats
                .iter()
                .find(|c| c.id == channel_id && c.access_hash == access_hash)
                .map(|_| Peer::Channel { channel_id })
                .ok_or_else(invalid),
            InputPeer::Empty | InputPeer::SelfUser => Err(invalid()),
        }
    }

    fn newest_first(messages: &[Message], range: MessageRange, keep: impl Fn(i32) -> bool) -> Vec<Message> {
        let mut selected: Vec<Message> = messages
            .iter()
            .filter(|m| range.contains(m.id) && keep(m.id))
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.id.cmp(&a.id));
        selected
    }
}

#[async_trait]
impl RemoteFetch for SnapshotBackend {
    async fn send(&self, call: Invocation) -> std::result::Result<TakeoutResponse, RemoteError> {
        self.simulate_latency().await;

        if !self.session_open(call.session) {
            return Err(RemoteError::SessionUnavailable(format!(
                "session {} is not open",
                call.session.0
            )));
        }

        let range = call.range.unwrap_or(MessageRange::FULL);
        debug!("Snapshot backend serving {:?}", call.request);

        let response = match call.request {
            TakeoutRequest::GetSplitRanges => TakeoutResponse::SplitRanges(self.snapshot.ranges.clone()),
            TakeoutRequest::GetSavedContacts => {
                TakeoutResponse::SavedContacts(self.snapshot.contacts.clone())
            }
            TakeoutRequest::GetFullUser => TakeoutResponse::FullUser(FullUser {
                user: self.snapshot.user.clone(),
                about: self.snapshot.about.clone(),
            }),
            TakeoutRequest::GetUserPhotos { offset, limit } => TakeoutResponse::Photos {
                photos: self
                    .snapshot
                    .photos
                    .iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect(),
                count: Some(self.snapshot.photos.len() as u64),
            },
            TakeoutRequest::GetStoriesArchive { offset_id, limit } => {
                let mut stories: Vec<StoryItem> = self
                    .snapshot
                    .stories
                    .iter()
                    .filter(|s| offset_id == 0 || s.id < offset_id)
                    .cloned()
                    .collect();
                stories.sort_by(|a, b| b.id.cmp(&a.id));
                stories.truncate(limit as usize);
                TakeoutResponse::Stories {
                    stories,
                    count: Some(self.snapshot.stories.len() as u64),
                }
            }
            TakeoutRequest::GetDialogs {
                offset_date,
                offset_id,
                offset_peer,
                limit,
            } => TakeoutResponse::Dialogs(self.dialogs_page(
                range,
                offset_date,
                offset_id,
                offset_peer,
                limit,
            )),
            TakeoutRequest::GetHistory {
                peer,
                offset_id,
                limit,
                ..
            } => {
                let peer = self.check_peer(peer)?;
                let mut messages = Self::newest_first(self.snapshot.messages_for(peer), range, |id| {
                    offset_id == 0 || id < offset_id
                });
                messages.truncate(limit as usize);
                TakeoutResponse::Messages(messages)
            }
            TakeoutRequest::SearchSaved { offset_id, limit } => {
                let mut messages = Self::newest_first(&self.snapshot.saved, range, |id| {
                    offset_id == 0 || id <= offset_id
                });
                messages.truncate(limit as usize);
                TakeoutResponse::Messages(messages)
            }
            TakeoutRequest::GetAuthorizations => {
                TakeoutResponse::Authorizations(self.snapshot.authorizations.clone())
            }
            TakeoutRequest::GetWebAuthorizations => {
                TakeoutResponse::WebAuthorizations(self.snapshot.web_authorizations.clone())
            }
        };

        Ok(response)
    }
}

#[async_trait]
impl SessionLifecycle for SnapshotBackend {
    async fn open_session(&self, options: &TakeoutOptions) -> std::result::Result<SessionId, RemoteError> {
        self.simulate_latency().await;
        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .map_err(|_| RemoteError::SessionUnavailable("session table poisoned".into()))?
            .insert(id);
        info!("Opened takeout session {} with {:?}", id, options);
        Ok(SessionId(id))
    }

    async fn close_session(&self, session: SessionId, success: bool) -> std::result::Result<(), RemoteError> {
        let removed = self
            .sessions
            .lock()
            .map_err(|_| RemoteError::SessionUnavailable("session table poisoned".into()))?
            .remove(&session.0);
        if !removed {
            return Err(RemoteError::SessionUnavailable(format!(
                "session {} is not open",
                session.0
            )));
        }
        info!("Closed takeout session {} (success: {})", session.0, success);
        Ok(())
    }
}

#[async_trait]
impl MediaDownloader for SnapshotBackend {
    async fn download(&self, location: &MediaLocation) -> std::result::Result<Vec<u8>, RemoteError> {
        self.simulate_latency().await;
        let encoded = self
            .snapshot
            .media
            .get(&location.0)
            .ok_or_else(|| RemoteError::MediaUnavailable(location.0.clone()))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| RemoteError::MediaUnavailable(format!("{}: {}", location.0, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialog(user_id: i64, top: i32, date: i64) -> Dialog {
        Dialog {
            peer: Peer::User { user_id },
            top_message: top,
            last_message_date: date,
        }
    }

    fn backend() -> SnapshotBackend {
        let snapshot = AccountSnapshot {
            dialogs: (1..=5).map(|i| dialog(i, i as i32 * 10, 1000 + i)).collect(),
            users: (1..=5)
                .map(|i| User {
                    id: i,
                    access_hash: i * 100,
                    ..Default::default()
                })
                .collect(),
            history: vec![ConversationHistory {
                peer: Some(Peer::User { user_id: 1 }),
                messages: (1..=5)
                    .map(|id| Message {
                        id,
                        date: 100 + i64::from(id),
                        from_id: Some(1),
                        message: Some(format!("m{id}")),
                        media: None,
                    })
                    .collect(),
            }],
            media: HashMap::from([("loc".to_string(), STANDARD.encode(b"jpeg"))]),
            ranges: default_ranges(),
            ..Default::default()
        };
        SnapshotBackend::new(snapshot)
    }

    #[tokio::test]
    async fn test_requires_open_session() {
        let backend = backend();
        let err = backend
            .send(Invocation::new(SessionId(42), TakeoutRequest::GetSavedContacts))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::SessionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_dialog_pages_continue_after_offset() {
        let backend = backend();
        let session = backend.open_session(&TakeoutOptions::default()).await.unwrap();

        let first = backend
            .send(Invocation::new(
                session,
                TakeoutRequest::GetDialogs {
                    offset_date: 0,
                    offset_id: 0,
                    offset_peer: InputPeer::Empty,
                    limit: 3,
                },
            ))
            .await
            .unwrap()
            .into_dialogs()
            .unwrap();
        assert_eq!(first.count, Some(5));
        assert_eq!(first.dialogs.len(), 3);
        assert_eq!(first.users.len(), 3);

        let last = first.dialogs.last().unwrap();
        let second = backend
            .send(Invocation::new(
                session,
                TakeoutRequest::GetDialogs {
                    offset_date: last.last_message_date,
                    offset_id: last.top_message,
                    offset_peer: first.input_peer(last).unwrap(),
                    limit: 3,
                },
            ))
            .await
            .unwrap()
            .into_dialogs()
            .unwrap();
        assert_eq!(second.dialogs.len(), 2);
        assert!(second.dialogs.iter().all(|d| !first.dialogs.contains(d)));
    }

    async fn list_dialogs(
        backend: &SnapshotBackend,
        session: SessionId,
        range: MessageRange,
        after: Option<&Dialog>,
        limit: u32,
    ) -> DialogsPage {
        let (offset_date, offset_id, offset_peer) = match after {
            Some(d) => {
                let Peer::User { user_id } = d.peer else {
                    panic!("user dialogs only");
                };
                (
                    d.last_message_date,
                    d.top_message,
                    InputPeer::User {
                        user_id,
                        access_hash: user_id * 100,
                    },
                )
            }
            None => (0, 0, InputPeer::Empty),
        };
        backend
            .send(
                Invocation::new(
                    session,
                    TakeoutRequest::GetDialogs {
                        offset_date,
                        offset_id,
                        offset_peer,
                        limit,
                    },
                )
                .in_range(range),
            )
            .await
            .unwrap()
            .into_dialogs()
            .unwrap()
    }

    #[tokio::test]
    async fn test_dialog_listed_in_every_range_it_has_messages() {
        let backend = backend();
        let session = backend.open_session(&TakeoutOptions::default()).await.unwrap();
        let early = MessageRange { min_id: 0, max_id: 2 };
        let late = MessageRange { min_id: 3, max_id: i32::MAX };

        let page = list_dialogs(&backend, session, early, None, 10).await;
        let ada = page
            .dialogs
            .iter()
            .find(|d| d.peer == Peer::User { user_id: 1 })
            .unwrap();
        assert_eq!((ada.top_message, ada.last_message_date), (2, 102));

        let page = list_dialogs(&backend, session, late, None, 10).await;
        let ada = page
            .dialogs
            .iter()
            .find(|d| d.peer == Peer::User { user_id: 1 })
            .unwrap();
        assert_eq!((ada.top_message, ada.last_message_date), (5, 105));
    }

    #[tokio::test]
    async fn test_dialog_paging_breaks_ties_on_peer() {
        let snapshot = AccountSnapshot {
            dialogs: (1..=3).map(|i| dialog(i, 7, 500)).collect(),
            users: (1..=3)
                .map(|i| User {
                    id: i,
                    access_hash: i * 100,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let backend = SnapshotBackend::new(snapshot);
        let session = backend.open_session(&TakeoutOptions::default()).await.unwrap();

        let mut seen = Vec::new();
        let mut after: Option<Dialog> = None;
        loop {
            let page = list_dialogs(&backend, session, MessageRange::FULL, after.as_ref(), 1).await;
            let Some(last) = page.dialogs.last().cloned() else {
                break;
            };
            seen.push(last.peer);
            after = Some(last);
        }
        assert_eq!(
            seen,
            vec![
                Peer::User { user_id: 3 },
                Peer::User { user_id: 2 },
                Peer::User { user_id: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_history_rejects_bad_access_hash() {
        let backend = backend();
        let session = backend.open_session(&TakeoutOptions::default()).await.unwrap();
        let err = backend
            .send(Invocation::new(
                session,
                TakeoutRequest::GetHistory {
                    peer: InputPeer::User {
                        user_id: 1,
                        access_hash: 7,
                    },
                    offset_id: 0,
                    offset_date: 0,
                    limit: 10,
                },
            ))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::rpc(400, "PEER_ID_INVALID"));
    }

    #[tokio::test]
    async fn test_history_below_offset() {
        let backend = backend();
        let session = backend.open_session(&TakeoutOptions::default()).await.unwrap();
        let messages = backend
            .send(Invocation::new(
                session,
                TakeoutRequest::GetHistory {
                    peer: InputPeer::User {
                        user_id: 1,
                        access_hash: 100,
                    },
                    offset_id: 4,
                    offset_date: 0,
                    limit: 10,
                },
            ))
            .await
            .unwrap()
            .into_messages()
            .unwrap();
        let ids: Vec<i32> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_download_and_close() {
        let backend = backend();
        let session = backend.open_session(&TakeoutOptions::default()).await.unwrap();
        let bytes = backend.download(&MediaLocation("loc".into())).await.unwrap();
        assert_eq!(bytes, b"jpeg");
        assert!(backend.download(&MediaLocation("nope".into())).await.is_err());

        backend.close_session(session, true).await.unwrap();
        assert!(backend.close_session(session, true).await.is_err());
    }
}
