use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::RemoteError;
use crate::export::cursor::{CursorEngine, Page, PageSource, StopRule};
use crate::export::job::CategoryReport;
use crate::export::progress::ProgressMode;
use crate::export::writers::{ExportRecord, format_timestamp};
use crate::export::Severity;
use crate::remote::{Message, MessageRange, TakeoutRequest};

use super::{Category, ExportContext};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedMessageRecord {
    pub id: i32,
    pub date: String,
    pub message: String,
    pub media_type: String,
}

impl From<Message> for SavedMessageRecord {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            date: format_timestamp(message.date),
            message: message.message.unwrap_or_default(),
            media_type: message
                .media
                .as_ref()
                .map_or("", |media| media.kind_label())
                .to_string(),
        }
    }
}

impl ExportRecord for SavedMessageRecord {
    const CSV_HEADER: &'static [&'static str] = &["ID", "Date", "Message", "Media Type"];

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.date.clone(),
            self.message.clone(),
            self.media_type.clone(),
        ]
    }

    fn sort(records: &mut [Self]) {
        records.sort_by_key(|r| r.id);
    }
}

/// Saved-message search within one range. The offset is inclusive, so each page
/// continues one below the oldest id it returned.
struct SavedSearch<'a> {
    ctx: &'a ExportContext,
    range: MessageRange,
}

#[async_trait]
impl<'a> PageSource for SavedSearch<'a> {
    type Item = Message;
    type Position = i32;

    fn label(&self) -> &str {
        "saved messages"
    }

    fn page_limit(&self) -> u32 {
        self.ctx.settings().saved_page_limit
    }

    fn stop_rule(&self) -> StopRule {
        StopRule::ShortPage
    }

    async fn fetch(&self, offset_id: &i32) -> Result<Page<Message>, RemoteError> {
        let messages = self
            .ctx
            .invoke_in(
                self.range,
                TakeoutRequest::SearchSaved {
                    offset_id: *offset_id,
                    limit: self.page_limit(),
                },
            )
            .await?
            .into_messages()?;
        Ok(Page::new(messages))
    }

    fn next_position(&self, _: &i32, page: &Page<Message>) -> Option<i32> {
        // Offset zero means "from the newest", so there is nothing below id 1.
        page.items
            .last()
            .map(|last| last.id - 1)
            .filter(|next| *next > 0)
    }
}

pub async fn export(ctx: &ExportContext) -> CategoryReport {
    let job = ctx.job::<SavedMessageRecord>(Category::SavedMessages, ProgressMode::saturating());
    job.reporter().status("Initializing export...", Severity::Info);

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

    for range in ranges {
        if job.is_cancelled() {
            break;
        }
        let search = SavedSearch { ctx, range };
        let outcome = CursorEngine::new(search, 0, job.cancel_token())
            .run(|messages| {
                for message in messages {
                    let record = SavedMessageRecord::from(message);
                    let label = format!("message {}", record.id);
                    job.push(record, &label);
                }
                job.advance();
            })
            .await;
        if let Some(e) = &outcome.error {
            job.record_failure(e);
        }
        debug!(
            "Saved messages in {}..={}: {} in {} pages",
            range.min_id, range.max_id, outcome.items, outcome.pages
        );
    }

    job.reporter().status("Saving messages...", Severity::Info);
    job.conclude(&ctx.record_path(Category::SavedMessages), ctx.format(), |n| {
        format!("Export done! {n} saved messages exported.")
    })
    .await
}
