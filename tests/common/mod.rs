//! Shared helpers for integration tests: a scripted backend and a recording sink.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use takeout::categories::Category;
use takeout::error::RemoteError;
use takeout::export::{Severity, StatusSink};
use takeout::remote::{
    Dialog, DialogsPage, Invocation, MediaDownloader, MediaLocation, Message, Peer,
    RemoteFetch, SessionId, SessionLifecycle, TakeoutOptions, TakeoutRequest, TakeoutResponse,
    User,
};

type Handler = Box<dyn Fn(&Invocation) -> Result<TakeoutResponse, RemoteError> + Send + Sync>;
type Delay = Box<dyn Fn(&TakeoutRequest) -> Option<Duration> + Send + Sync>;

/// Backend that answers every request through a closure.
pub struct ScriptedBackend {
    handler: Handler,
    delay: Delay,
    pub opened: Mutex<Vec<TakeoutOptions>>,
    pub closed: Mutex<Vec<(SessionId, bool)>>,
    pub calls: Mutex<Vec<TakeoutRequest>>,
}

impl ScriptedBackend {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Invocation) -> Result<TakeoutResponse, RemoteError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: Box::new(|_| None),
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering requests for which `delay` returns a duration.
    pub fn with_delay<D>(mut self, delay: D) -> Self
    where
        D: Fn(&TakeoutRequest) -> Option<Duration> + Send + Sync + 'static,
    {
        self.delay = Box::new(delay);
        self
    }
}

#[async_trait]
impl RemoteFetch for ScriptedBackend {
    async fn send(&self, call: Invocation) -> Result<TakeoutResponse, RemoteError> {
        if let Some(pause) = (self.delay)(&call.request) {
            tokio::time::sleep(pause).await;
        }
        self.calls.lock().unwrap().push(call.request.clone());
        (self.handler)(&call)
    }
}

#[async_trait]
impl SessionLifecycle for ScriptedBackend {
    async fn open_session(&self, options: &TakeoutOptions) -> Result<SessionId, RemoteError> {
        self.opened.lock().unwrap().push(options.clone());
        Ok(SessionId(42))
    }

    async fn close_session(&self, session: SessionId, success: bool) -> Result<(), RemoteError> {
        self.closed.lock().unwrap().push((session, success));
        Ok(())
    }
}

#[async_trait]
impl MediaDownloader for ScriptedBackend {
    async fn download(&self, location: &MediaLocation) -> Result<Vec<u8>, RemoteError> {
        Err(RemoteError::MediaUnavailable(location.0.clone()))
    }
}

/// Sink that keeps every terminal status and exported label.
#[derive(Default)]
pub struct RecordingSink {
    pub items: Mutex<Vec<String>>,
    pub finished: Mutex<Vec<(Category, String, Severity)>>,
}

impl RecordingSink {
    pub fn finished_count(&self) -> usize {
        self.finished.lock().unwrap().len()
    }
}

impl StatusSink for RecordingSink {
    fn status_changed(&self, _: Category, _: &str, _: Severity) {}

    fn item_exported(&self, _: Category, _: u64, label: &str, _: Option<u64>) {
        self.items.lock().unwrap().push(label.to_string());
    }

    fn export_finished(&self, category: Category, text: &str, severity: Severity) {
        self.finished
            .lock()
            .unwrap()
            .push((category, text.to_string(), severity));
    }
}

pub fn user(id: i64, name: &str) -> User {
    User {
        id,
        access_hash: id + 1000,
        first_name: Some(name.to_string()),
        contact: true,
        ..Default::default()
    }
}

pub fn user_dialog(user_id: i64, top_message: i32, date: i64) -> Dialog {
    Dialog {
        peer: Peer::User { user_id },
        top_message,
        last_message_date: date,
    }
}

/// A page of private dialogs for `users`, newest first.
pub fn private_page(users: &[User], count: Option<u64>) -> DialogsPage {
    let dialogs = users
        .iter()
        .enumerate()
        .map(|(i, u)| user_dialog(u.id, 100 - i as i32, 1_700_000_000 - i as i64))
        .collect();
    DialogsPage {
        dialogs,
        users: users.to_vec(),
        chats: Vec::new(),
        count,
    }
}

pub fn message(id: i32, from_id: i64, text: &str) -> Message {
    Message {
        id,
        date: 1_700_000_000 + i64::from(id),
        from_id: Some(from_id),
        message: Some(text.to_string()),
        media: None,
    }
}
