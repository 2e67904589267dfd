//! Message history export for private chats, groups and channels.
//!
//! The dialog list is read once per message range. Every dialog in scope gets its
//! own history stream; the job concludes when all ranges are listed and every
//! history stream has finished.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::RemoteError;
use crate::export::cursor::{CursorEngine, Page, PageSource, StopRule};
use crate::export::fanout::FanOutTracker;
use crate::export::job::{CategoryReport, ExportJob};
use crate::export::progress::ProgressMode;
use crate::export::writers::{ExportRecord, format_timestamp};
use crate::export::Severity;
use crate::remote::{
    ChatKind, Dialog, DialogsPage, InputPeer, Message, MessageRange, Peer, TakeoutRequest,
};

use super::{Category, ExportContext};

/// Which dialogs a message export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationScope {
    Private,
    Group,
    Channel,
}

impl ConversationScope {
    pub fn category(&self) -> Category {
        match self {
            ConversationScope::Private => Category::PrivateMessages,
            ConversationScope::Group => Category::GroupMessages,
            ConversationScope::Channel => Category::ChannelMessages,
        }
    }

    pub fn includes(&self, kind: DialogKind) -> bool {
        matches!(
            (self, kind),
            (ConversationScope::Private, DialogKind::Contact | DialogKind::NonContact)
                | (ConversationScope::Group, DialogKind::BasicGroup | DialogKind::Supergroup)
                | (ConversationScope::Channel, DialogKind::Channel)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Contact,
    NonContact,
    BasicGroup,
    Supergroup,
    Channel,
}

/// A dialog resolved against the lookup tables of the page it was listed on.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedDialog {
    pub dialog: Dialog,
    pub kind: DialogKind,
    /// `None` when the page did not carry the peer's user or chat.
    pub peer: Option<InputPeer>,
    pub chat: String,
}

/// Classify every dialog of a page.
pub fn classify(page: &DialogsPage) -> Vec<ListedDialog> {
    page.dialogs
        .iter()
        .map(|dialog| {
            let (kind, chat) = match dialog.peer {
                Peer::User { user_id } => match page.user(user_id) {
                    Some(user) => {
                        let name = user.display_name();
                        (
                            if user.contact { DialogKind::Contact } else { DialogKind::NonContact },
                            if name.is_empty() { "UnknownUser".to_string() } else { name },
                        )
                    }
                    None => (DialogKind::NonContact, "UnknownUser".to_string()),
                },
                Peer::Chat { chat_id } => (DialogKind::BasicGroup, chat_title(page, chat_id)),
                Peer::Channel { channel_id } => {
                    let kind = match page.chat(channel_id).map(|c| c.kind) {
                        Some(ChatKind::Megagroup) => DialogKind::Supergroup,
                        Some(ChatKind::Basic) => DialogKind::BasicGroup,
                        Some(ChatKind::Broadcast) | None => DialogKind::Channel,
                    };
                    (kind, chat_title(page, channel_id))
                }
            };
            ListedDialog {
                dialog: dialog.clone(),
                kind,
                peer: page.input_peer(dialog),
                chat,
            }
        })
        .collect()
}

fn chat_title(page: &DialogsPage, id: i64) -> String {
    page.chat(id)
        .map(|c| c.title.clone())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "UnknownChat".to_string())
}

/// Dialogs of one page, split by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogBuckets {
    pub private_contacts: Vec<ListedDialog>,
    pub private_non_contacts: Vec<ListedDialog>,
    pub basic_groups: Vec<ListedDialog>,
    pub supergroups: Vec<ListedDialog>,
    pub channels: Vec<ListedDialog>,
}

impl DialogBuckets {
    pub fn from_page(page: &DialogsPage) -> Self {
        Self::from_listed(classify(page))
    }

    pub fn from_listed(dialogs: impl IntoIterator<Item = ListedDialog>) -> Self {
        let mut buckets = Self::default();
        for listed in dialogs {
            let bucket = match listed.kind {
                DialogKind::Contact => &mut buckets.private_contacts,
                DialogKind::NonContact => &mut buckets.private_non_contacts,
                DialogKind::BasicGroup => &mut buckets.basic_groups,
                DialogKind::Supergroup => &mut buckets.supergroups,
                DialogKind::Channel => &mut buckets.channels,
            };
            bucket.push(listed);
        }
        buckets
    }

    pub fn len(&self) -> usize {
        self.private_contacts.len()
            + self.private_non_contacts.len()
            + self.basic_groups.len()
            + self.supergroups.len()
            + self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The dialogs a scope exports, in listing order within each bucket.
    pub fn in_scope(self, scope: ConversationScope) -> Vec<ListedDialog> {
        match scope {
            ConversationScope::Private => {
                let mut dialogs = self.private_contacts;
                dialogs.extend(self.private_non_contacts);
                dialogs
            }
            ConversationScope::Group => {
                let mut dialogs = self.basic_groups;
                dialogs.extend(self.supergroups);
                dialogs
            }
            ConversationScope::Channel => self.channels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    pub id: i32,
    pub date: String,
    pub chat: String,
    pub from_id: Option<i64>,
    pub message: String,
}

impl ExportRecord for ConversationMessage {
    const CSV_HEADER: &'static [&'static str] = &["ID", "Date", "Chat", "From ID", "Message"];

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.date.clone(),
            self.chat.clone(),
            self.from_id.map(|id| id.to_string()).unwrap_or_default(),
            self.message.clone(),
        ]
    }

    fn sort(records: &mut [Self]) {
        records.sort_by(|a, b| (&a.chat, a.id).cmp(&(&b.chat, b.id)));
    }
}

type MessageJob = Arc<ExportJob<ConversationMessage>>;

/// Continuation key of a dialog listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogOffset {
    pub date: i64,
    pub id: i32,
    pub peer: InputPeer,
}

struct DialogListing<'a> {
    ctx: &'a ExportContext,
    range: MessageRange,
}

#[async_trait]
impl<'a> PageSource for DialogListing<'a> {
    type Item = ListedDialog;
    type Position = DialogOffset;

    fn label(&self) -> &str {
        "dialogs"
    }

    fn page_limit(&self) -> u32 {
        self.ctx.settings().dialog_page_limit
    }

    fn stop_rule(&self) -> StopRule {
        StopRule::DeclaredTotal
    }

    async fn fetch(&self, offset: &DialogOffset) -> Result<Page<ListedDialog>, RemoteError> {
        let page = self
            .ctx
            .invoke_in(
                self.range,
                TakeoutRequest::GetDialogs {
                    offset_date: offset.date,
                    offset_id: offset.id,
                    offset_peer: offset.peer,
                    limit: self.page_limit(),
                },
            )
            .await?
            .into_dialogs()?;
        Ok(Page::with_total(classify(&page), page.count))
    }

    fn next_position(&self, _: &DialogOffset, page: &Page<ListedDialog>) -> Option<DialogOffset> {
        page.items.last().map(|last| DialogOffset {
            date: last.dialog.last_message_date,
            id: last.dialog.top_message,
            peer: last.peer.unwrap_or_default(),
        })
    }
}

/// Continuation key of a history stream: the oldest message seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct HistoryOffset {
    id: i32,
    date: i64,
}

struct HistoryStream<'a> {
    ctx: &'a ExportContext,
    range: MessageRange,
    peer: InputPeer,
    chat: &'a str,
}

#[async_trait]
impl<'a> PageSource for HistoryStream<'a> {
    type Item = Message;
    type Position = HistoryOffset;

    fn label(&self) -> &str {
        self.chat
    }

    fn page_limit(&self) -> u32 {
        self.ctx.settings().history_page_limit
    }

    fn stop_rule(&self) -> StopRule {
        StopRule::ShortPage
    }

    async fn fetch(&self, offset: &HistoryOffset) -> Result<Page<Message>, RemoteError> {
        let messages = self
            .ctx
            .invoke_in(
                self.range,
                TakeoutRequest::GetHistory {
                    peer: self.peer,
                    offset_id: offset.id,
                    offset_date: offset.date,
                    limit: self.page_limit(),
                },
            )
            .await?
            .into_messages()?;
        Ok(Page::new(messages))
    }

    fn next_position(&self, _: &HistoryOffset, page: &Page<Message>) -> Option<HistoryOffset> {
        page.items.last().map(|last| HistoryOffset {
            id: last.id,
            date: last.date,
        })
    }
}

pub async fn export(ctx: &ExportContext, scope: ConversationScope) -> CategoryReport {
    let category = scope.category();
    let job: MessageJob = ctx.job(category, ProgressMode::Counted);
    job.reporter().status("Starting export...", Severity::Info);

    let ranges = match ctx
        .invoke(TakeoutRequest::GetSplitRanges)
        .await
        .and_then(|r| r.into_split_ranges())
    {
        Ok(ranges) if ranges.is_empty() => vec![MessageRange::FULL],
        Ok(ranges) => ranges,
        Err(e) => {
            job.record_failure(&e);
            Vec::new()
        }
    };
    debug!("[{}] listing dialogs over {} ranges", category, ranges.len());

    let (tracker, drained) = FanOutTracker::new();
    let chats: ChatSet = Arc::new(Mutex::new(HashSet::new()));

    let mut listings = Vec::with_capacity(ranges.len());
    for range in ranges {
        if tracker.open_enumeration().is_ok() {
            listings.push(list_range(ctx, &job, &tracker, &chats, range, scope));
        }
    }
    tracker.close_enumeration();
    join_all(listings).await;
    drained.await;

    let chats = chats.lock().unwrap_or_else(PoisonError::into_inner).len();
    info!("[{}] exported history of {} chats", category, chats);
    job.conclude(&ctx.record_path(category), ctx.format(), |n| {
        format!("Export done! {n} messages from {chats} chats exported.")
    })
    .await
}

/// Chats whose history was read. A chat spanning several ranges counts once.
type ChatSet = Arc<Mutex<HashSet<Peer>>>;

/// List the dialogs of one range and start a history stream per dialog in scope.
async fn list_range(
    ctx: &ExportContext,
    job: &MessageJob,
    tracker: &FanOutTracker,
    chats: &ChatSet,
    range: MessageRange,
    scope: ConversationScope,
) {
    let listing = DialogListing { ctx, range };
    let outcome = CursorEngine::new(listing, DialogOffset::default(), job.cancel_token())
        .run(|dialogs| {
            let in_scope = DialogBuckets::from_listed(dialogs).in_scope(scope);
            for listed in in_scope {
                if tracker.enqueue(1).is_err() {
                    job.record_skipped("dialog listing already closed");
                    continue;
                }
                let guard = tracker.completion_guard();
                let Some(peer) = listed.peer else {
                    job.record_skipped(&format!("could not resolve {}", listed.chat));
                    drop(guard);
                    continue;
                };
                let (ctx, job, tracker, chats) =
                    (ctx.clone(), Arc::clone(job), tracker.clone(), Arc::clone(chats));
                tokio::spawn(async move {
                    {
                        let _guard = guard;
                        export_history(&ctx, &job, range, peer, &listed.chat).await;
                        chats
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(listed.dialog.peer);
                    }
                    job.observe(&tracker);
                });
            }
            job.observe(tracker);
        })
        .await;

    if let Some(e) = &outcome.error {
        job.record_failure(e);
    }
    tracker.close_enumeration();
}

async fn export_history(
    ctx: &ExportContext,
    job: &MessageJob,
    range: MessageRange,
    peer: InputPeer,
    chat: &str,
) {
    let stream = HistoryStream {
        ctx,
        range,
        peer,
        chat,
    };
    let outcome = CursorEngine::new(stream, HistoryOffset::default(), job.cancel_token())
        .run(|messages| {
            for message in messages {
                let record = ConversationMessage {
                    id: message.id,
                    date: format_timestamp(message.date),
                    chat: chat.to_string(),
                    from_id: message.from_id,
                    message: message.message.unwrap_or_default(),
                };
                let label = format!("{} #{}", chat, record.id);
                job.push(record, &label);
            }
        })
        .await;

    if let Some(e) = &outcome.error {
        job.record_failure(e);
    }
    debug!("{}: {} messages in {} pages", chat, outcome.items, outcome.pages);
}
