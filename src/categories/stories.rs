//! Story archive export: media into `stories_<timestamp>/` plus a metadata file.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::RemoteError;
use crate::export::cursor::{CursorEngine, Page, PageSource, StopRule};
use crate::export::fanout::FanOutTracker;
use crate::export::job::{CategoryReport, ExportJob};
use crate::export::progress::ProgressMode;
use crate::export::writers::{ExportRecord, ensure_dir, format_timestamp};
use crate::export::Severity;
use crate::remote::{StoryItem, TakeoutRequest};

use super::media::{media_source, save_media};
use super::{Category, ExportContext};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryRecord {
    pub id: i32,
    pub date: String,
    pub caption: String,
    pub media_type: String,
    pub file_name: String,
}

impl ExportRecord for StoryRecord {
    const CSV_HEADER: &'static [&'static str] = &["ID", "Date", "Caption", "Media Type", "File Name"];

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.date.clone(),
            self.caption.clone(),
            self.media_type.clone(),
            self.file_name.clone(),
        ]
    }

    fn sort(records: &mut [Self]) {
        records.sort_by_key(|r| r.id);
    }
}

type StoryJob = Arc<ExportJob<StoryRecord>>;

/// Archive listing keyed by the id of the oldest story seen so far.
struct StoryArchive<'a> {
    ctx: &'a ExportContext,
    job: &'a StoryJob,
}

#[async_trait]
impl<'a> PageSource for StoryArchive<'a> {
    type Item = StoryItem;
    type Position = i32;

    fn label(&self) -> &str {
        "stories archive"
    }

    fn page_limit(&self) -> u32 {
        self.ctx.settings().story_page_limit
    }

    fn stop_rule(&self) -> StopRule {
        StopRule::ShortPage
    }

    async fn fetch(&self, offset_id: &i32) -> Result<Page<StoryItem>, RemoteError> {
        let (stories, count) = self
            .ctx
            .invoke(TakeoutRequest::GetStoriesArchive {
                offset_id: *offset_id,
                limit: self.page_limit(),
            })
            .await?
            .into_stories()?;
        if let Some(count) = count {
            self.job.set_declared_total(count);
        }
        Ok(Page::with_total(stories, count))
    }

    fn next_position(&self, _: &i32, page: &Page<StoryItem>) -> Option<i32> {
        page.items.last().map(|story| story.id)
    }
}

pub async fn export(ctx: &ExportContext) -> CategoryReport {
    let job: StoryJob = ctx.job(Category::Stories, ProgressMode::Counted);
    job.reporter().status("Starting export...", Severity::Info);

    let dir = ctx.media_dir(Category::Stories);
    if let Err(e) = ensure_dir(&dir).await {
        return job.abandon(&format!("Failed to create folder: {e}"));
    }

    let (tracker, drained) = FanOutTracker::new();
    let archive = StoryArchive { ctx, job: &job };
    let outcome = CursorEngine::new(archive, 0, job.cancel_token())
        .run(|stories| {
            for story in stories {
                if tracker.enqueue(1).is_err() {
                    job.record_skipped("archive listing already closed");
                    continue;
                }
                let guard = tracker.completion_guard();
                let (ctx, job, tracker, dir) =
                    (ctx.clone(), Arc::clone(&job), tracker.clone(), dir.clone());
                tokio::spawn(async move {
                    {
                        let _guard = guard;
                        export_story(&ctx, &job, &dir, story).await;
                    }
                    job.observe(&tracker);
                });
            }
            job.observe(&tracker);
        })
        .await;

    if let Some(e) = &outcome.error {
        job.record_failure(e);
    }
    tracker.close_enumeration();
    drained.await;
    info!("Story archive listing done: {} stories", outcome.items);

    job.conclude(
        &dir.join(format!("metadata.{}", ctx.format().extension())),
        ctx.format(),
        |n| format!("Export done! {n} stories exported."),
    )
    .await
}

async fn export_story(ctx: &ExportContext, job: &StoryJob, dir: &PathBuf, story: StoryItem) {
    if job.is_cancelled() {
        return;
    }

    let media_type = story
        .media
        .as_ref()
        .map_or("unknown", |media| media.kind_label());
    let mut file_name = String::new();

    if let Some((location, ext)) = story.media.as_ref().and_then(media_source) {
        let name = format!("story_{}{}", story.id, ext);
        match ctx.download(&location).await {
            Ok(bytes) => {
                if let Err(e) = save_media(dir, &name, &bytes).await {
                    job.record_skipped(&e.to_string());
                }
            }
            Err(e) => job.record_skipped(&format!("story {}: {}", story.id, e)),
        }
        file_name = name;
    } else {
        job.record_skipped(&format!("story {} has no downloadable media", story.id));
    }

    let record = StoryRecord {
        id: story.id,
        date: format_timestamp(story.date),
        caption: story.caption.unwrap_or_default(),
        media_type: media_type.to_string(),
        file_name,
    };
    let label = format!("story {}", record.id);
    job.push(record, &label);
}
