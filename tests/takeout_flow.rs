//! End-to-end runs of the coordinator against scripted and snapshot backends.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use takeout::categories::Category;
use takeout::config::ExportConfig;
use takeout::error::{ExportError, RemoteError, TakeoutError};
use takeout::export::{Severity, TakeoutCoordinator, TracingSink};
use takeout::remote::{
    AccountSnapshot, DialogsPage, InputPeer, SavedContact, SnapshotBackend, TakeoutRequest,
    TakeoutResponse,
};

use common::{RecordingSink, ScriptedBackend, message, private_page, user};

fn settings(dir: &std::path::Path) -> ExportConfig {
    ExportConfig {
        output_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

fn history_user(request: &TakeoutRequest) -> Option<(i64, i32)> {
    match request {
        TakeoutRequest::GetHistory {
            peer: InputPeer::User { user_id, .. },
            offset_id,
            ..
        } => Some((*user_id, *offset_id)),
        _ => None,
    }
}

#[tokio::test]
async fn empty_dialog_listing_still_finishes() {
    let dir = tempdir().unwrap();
    let backend = ScriptedBackend::new(|call| match &call.request {
        TakeoutRequest::GetSplitRanges => Ok(TakeoutResponse::SplitRanges(vec![])),
        TakeoutRequest::GetDialogs { .. } => Ok(TakeoutResponse::Dialogs(DialogsPage::default())),
        other => panic!("unexpected request {other:?}"),
    });
    let sink = Arc::new(RecordingSink::default());
    let coordinator = TakeoutCoordinator::new(Arc::new(backend), sink.clone(), settings(dir.path()));

    let summary = coordinator.execute(&[Category::PrivateMessages]).await.unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.severity, Severity::Success);
    assert_eq!(report.records, 0);
    assert_eq!(report.text, "Export done! 0 messages from 0 chats exported.");
    let written = std::fs::read_to_string(report.output.as_ref().unwrap()).unwrap();
    assert_eq!(written, "ID,Date,Chat,From ID,Message\n");
    assert_eq!(sink.finished_count(), 1);
}

#[tokio::test]
async fn failed_history_keeps_other_streams() {
    let dir = tempdir().unwrap();
    let users = vec![user(1, "Ada"), user(2, "Bob")];
    let page = private_page(&users, None);
    let backend = ScriptedBackend::new(move |call| match &call.request {
        TakeoutRequest::GetSplitRanges => Ok(TakeoutResponse::SplitRanges(vec![])),
        TakeoutRequest::GetDialogs { .. } => Ok(TakeoutResponse::Dialogs(page.clone())),
        request => match history_user(request) {
            Some((1, _)) => Err(RemoteError::rpc(500, "INTERNAL_SERVER_ERROR")),
            Some((2, offset_id)) => {
                // Five messages, newest first, served two at a time.
                let below = if offset_id == 0 { 6 } else { offset_id };
                let messages = (1..below)
                    .rev()
                    .take(2)
                    .map(|id| message(id, 2, &format!("bob {id}")))
                    .collect();
                Ok(TakeoutResponse::Messages(messages))
            }
            _ => panic!("unexpected request {request:?}"),
        },
    });
    let backend = Arc::new(backend);
    let sink = Arc::new(RecordingSink::default());
    let coordinator = TakeoutCoordinator::new(
        backend.clone(),
        sink.clone(),
        ExportConfig {
            history_page_limit: 2,
            ..settings(dir.path())
        },
    );

    let summary = coordinator.execute(&[Category::PrivateMessages]).await.unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.severity, Severity::Failure);
    assert_eq!(report.records, 5);
    assert!(report.text.contains("INTERNAL_SERVER_ERROR (500)"), "{}", report.text);
    assert_eq!(report.failures.transport_failures, 1);
    assert_eq!(sink.finished_count(), 1);

    let mut reader = csv::Reader::from_path(report.output.as_ref().unwrap()).unwrap();
    let chats: Vec<String> = reader
        .records()
        .map(|r| r.unwrap()[2].to_string())
        .collect();
    assert_eq!(chats, vec!["Bob"; 5]);

    let bob_pages = backend
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|r| matches!(history_user(r), Some((2, _))))
        .count();
    assert_eq!(bob_pages, 3);
    assert_eq!(*backend.closed.lock().unwrap(), vec![(takeout::remote::SessionId(42), false)]);
}

#[tokio::test]
async fn empty_history_leaves_its_chat_out() {
    let dir = tempdir().unwrap();
    let users = vec![user(1, "Ada"), user(2, "Bob")];
    let page = private_page(&users, None);
    let backend = Arc::new(ScriptedBackend::new(move |call| match &call.request {
        TakeoutRequest::GetSplitRanges => Ok(TakeoutResponse::SplitRanges(vec![])),
        TakeoutRequest::GetDialogs { .. } => Ok(TakeoutResponse::Dialogs(page.clone())),
        request => match history_user(request) {
            Some((1, _)) => Ok(TakeoutResponse::Messages(vec![])),
            Some((2, _)) => Ok(TakeoutResponse::Messages(vec![
                message(2, 2, "second"),
                message(1, 2, "first"),
            ])),
            _ => panic!("unexpected request {request:?}"),
        },
    }));
    let sink = Arc::new(RecordingSink::default());
    let coordinator = TakeoutCoordinator::new(backend.clone(), sink.clone(), settings(dir.path()));

    let summary = coordinator.execute(&[Category::PrivateMessages]).await.unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.severity, Severity::Success);
    assert_eq!(report.records, 2);
    assert_eq!(sink.finished_count(), 1);

    let mut reader = csv::Reader::from_path(report.output.as_ref().unwrap()).unwrap();
    let rows: Vec<(String, String)> = reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            (r[0].to_string(), r[2].to_string())
        })
        .collect();
    assert_eq!(
        rows,
        vec![("1".to_string(), "Bob".to_string()), ("2".to_string(), "Bob".to_string())]
    );

    // Ada's stream ended on its first, empty page.
    let ada_pages = backend
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|r| matches!(history_user(r), Some((1, _))))
        .count();
    assert_eq!(ada_pages, 1);
}

#[tokio::test]
async fn wrong_history_response_fails_the_job() {
    let dir = tempdir().unwrap();
    let users = vec![user(1, "Ada"), user(2, "Bob")];
    let page = private_page(&users, None);
    let backend = ScriptedBackend::new(move |call| match &call.request {
        TakeoutRequest::GetSplitRanges => Ok(TakeoutResponse::SplitRanges(vec![])),
        TakeoutRequest::GetDialogs { .. } => Ok(TakeoutResponse::Dialogs(page.clone())),
        request => match history_user(request) {
            Some((1, _)) => Ok(TakeoutResponse::Dialogs(DialogsPage::default())),
            Some((2, _)) => Ok(TakeoutResponse::Messages(vec![message(1, 2, "hello")])),
            _ => panic!("unexpected request {request:?}"),
        },
    });
    let sink = Arc::new(RecordingSink::default());
    let coordinator = TakeoutCoordinator::new(Arc::new(backend), sink.clone(), settings(dir.path()));

    let summary = coordinator.execute(&[Category::PrivateMessages]).await.unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.severity, Severity::Failure);
    assert_eq!(report.records, 1);
    assert_eq!(report.failures.transport_failures, 1);
    assert!(
        report
            .text
            .ends_with("with errors: Unexpected response: expected Messages, got Dialogs"),
        "{}",
        report.text
    );
    assert_eq!(sink.finished_count(), 1);
    assert!(!summary.succeeded());
}

#[tokio::test]
async fn no_finish_before_enumeration_completes() {
    let dir = tempdir().unwrap();
    let users: Vec<_> = (1..=5).map(|id| user(id, &format!("User{id}"))).collect();
    let first = private_page(&users[..3], Some(5));
    let mut second = private_page(&users[3..], Some(5));
    for (i, dialog) in second.dialogs.iter_mut().enumerate() {
        dialog.top_message = 50 - i as i32;
        dialog.last_message_date = 1_600_000_000 - i as i64;
    }

    let sink = Arc::new(RecordingSink::default());
    let histories = Arc::new(AtomicUsize::new(0));
    let seen_at_second_page: Arc<Mutex<Option<(usize, usize)>>> = Arc::new(Mutex::new(None));

    let backend = {
        let (sink, histories, seen) = (sink.clone(), histories.clone(), seen_at_second_page.clone());
        ScriptedBackend::new(move |call| match &call.request {
            TakeoutRequest::GetSplitRanges => Ok(TakeoutResponse::SplitRanges(vec![])),
            TakeoutRequest::GetDialogs { offset_id: 0, .. } => {
                Ok(TakeoutResponse::Dialogs(first.clone()))
            }
            TakeoutRequest::GetDialogs { .. } => {
                *seen.lock().unwrap() =
                    Some((histories.load(Ordering::SeqCst), sink.finished_count()));
                Ok(TakeoutResponse::Dialogs(second.clone()))
            }
            request => {
                let (user_id, _) = history_user(request).expect("history request");
                histories.fetch_add(1, Ordering::SeqCst);
                Ok(TakeoutResponse::Messages(vec![message(user_id as i32, user_id, "hi")]))
            }
        })
        .with_delay(|request| match request {
            TakeoutRequest::GetDialogs { offset_id, .. } if *offset_id != 0 => {
                Some(Duration::from_millis(150))
            }
            _ => None,
        })
    };

    let coordinator = TakeoutCoordinator::new(Arc::new(backend), sink.clone(), settings(dir.path()));
    let summary = coordinator.execute(&[Category::PrivateMessages]).await.unwrap();

    // The first three histories were done while the listing was still open.
    assert_eq!(*seen_at_second_page.lock().unwrap(), Some((3, 0)));

    let report = &summary.reports[0];
    assert_eq!(report.severity, Severity::Success);
    assert_eq!(report.records, 5);
    assert_eq!(report.text, "Export done! 5 messages from 5 chats exported.");
    assert_eq!(histories.load(Ordering::SeqCst), 5);
    assert_eq!(sink.finished_count(), 1);
}

#[tokio::test]
async fn cancellation_stops_streams_and_closes_session() {
    let dir = tempdir().unwrap();
    let users = vec![user(1, "Ada")];
    let page = private_page(&users, None);
    let backend = ScriptedBackend::new(move |call| match &call.request {
        TakeoutRequest::GetSplitRanges => Ok(TakeoutResponse::SplitRanges(vec![])),
        TakeoutRequest::GetDialogs { .. } => Ok(TakeoutResponse::Dialogs(page.clone())),
        request => {
            // An endless history, one message per page.
            let (_, offset_id) = history_user(request).expect("history request");
            let id = if offset_id == 0 { 1_000_000 } else { offset_id - 1 };
            Ok(TakeoutResponse::Messages(vec![message(id, 1, "again")]))
        }
    })
    .with_delay(|request| match request {
        TakeoutRequest::GetHistory { .. } => Some(Duration::from_millis(5)),
        _ => None,
    });
    let backend = Arc::new(backend);

    let token = CancellationToken::new();
    let coordinator = TakeoutCoordinator::new(
        backend.clone(),
        Arc::new(RecordingSink::default()),
        ExportConfig {
            history_page_limit: 1,
            ..settings(dir.path())
        },
    )
    .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        token.cancel();
    });
    let summary = coordinator.execute(&[Category::PrivateMessages]).await.unwrap();
    canceller.await.unwrap();

    assert!(summary.cancelled);
    assert!(!summary.succeeded());
    let report = &summary.reports[0];
    assert!(report.cancelled);
    assert_eq!(report.severity, Severity::Warning);
    assert_eq!(report.text, "Export cancelled");
    assert!(report.output.is_none());
    assert!(!backend.closed.lock().unwrap()[0].1);
}

#[tokio::test]
async fn snapshot_run_end_to_end() {
    let dir = tempdir().unwrap();
    let snapshot = AccountSnapshot {
        contacts: vec![SavedContact {
            phone: Some("+15550100".into()),
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            date: 1_700_000_000,
        }],
        ..Default::default()
    };
    let coordinator = TakeoutCoordinator::new(
        Arc::new(SnapshotBackend::new(snapshot)),
        Arc::new(TracingSink),
        ExportConfig {
            file_max_size_mb: Some(8),
            ..settings(dir.path())
        },
    );

    let summary = coordinator
        .execute(&[Category::Contacts, Category::Sessions, Category::SavedMessages])
        .await
        .unwrap();

    assert!(summary.succeeded());
    assert!(summary.session_closed);
    assert_eq!(summary.reports.len(), 3);
    let contacts = summary
        .reports
        .iter()
        .find(|r| r.category == Category::Contacts)
        .unwrap();
    assert_eq!(contacts.records, 1);
    let path = contacts.output.as_ref().unwrap();
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("contacts_"));
    assert!(std::fs::read_to_string(path).unwrap().contains("Ada"));
}

#[tokio::test]
async fn session_options_follow_selection() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(|call| match &call.request {
        TakeoutRequest::GetSplitRanges => Ok(TakeoutResponse::SplitRanges(vec![])),
        TakeoutRequest::GetDialogs { .. } => Ok(TakeoutResponse::Dialogs(DialogsPage::default())),
        other => panic!("unexpected request {other:?}"),
    }));
    let coordinator = TakeoutCoordinator::new(
        backend.clone(),
        Arc::new(TracingSink),
        settings(dir.path()),
    );

    let summary = coordinator
        .execute(&[Category::GroupMessages, Category::ChannelMessages])
        .await
        .unwrap();
    assert!(summary.succeeded());

    let opened = backend.opened.lock().unwrap();
    assert_eq!(opened.len(), 1);
    let options = &opened[0];
    assert!(options.message_chats && options.message_megagroups && options.message_channels);
    assert!(!options.message_users && !options.contacts && !options.files);
    assert_eq!(*backend.closed.lock().unwrap(), vec![(summary.session, true)]);
}

#[tokio::test]
async fn nothing_selected_is_an_error() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(|_| unreachable!()));
    let coordinator = TakeoutCoordinator::new(backend.clone(), Arc::new(TracingSink), settings(dir.path()));

    let err = coordinator.execute(&[]).await.unwrap_err();
    assert!(matches!(err, TakeoutError::Export(ExportError::NothingSelected)));
    assert!(backend.opened.lock().unwrap().is_empty());
}
