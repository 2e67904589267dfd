//! Profile picture export.
//!
//! Pages through the account's profile photos and downloads the largest size of each
//! into `profile_pictures_<timestamp>/`, next to a `metadata` record file.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::RemoteError;
use crate::export::cursor::{CursorEngine, Page, PageSource, StopRule};
use crate::export::fanout::FanOutTracker;
use crate::export::job::{CategoryReport, ExportJob};
use crate::export::progress::ProgressMode;
use crate::export::writers::{ExportRecord, ensure_dir, format_timestamp};
use crate::export::Severity;
use crate::remote::{Photo, TakeoutRequest};

use super::media::save_media;
use super::{Category, ExportContext};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePhotoRecord {
    pub id: i64,
    pub date: String,
    pub size_kb: u64,
    pub dimensions: String,
    pub file_name: String,
}

impl ExportRecord for ProfilePhotoRecord {
    const CSV_HEADER: &'static [&'static str] =
        &["ID", "Date", "Size (KB)", "Dimensions", "File Name"];

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.date.clone(),
            self.size_kb.to_string(),
            self.dimensions.clone(),
            self.file_name.clone(),
        ]
    }

    fn sort(records: &mut [Self]) {
        records.sort_by(|a, b| (&a.date, a.id).cmp(&(&b.date, b.id)));
    }
}

type PhotoJob = Arc<ExportJob<ProfilePhotoRecord>>;

/// Offset-paginated photo listing.
struct PhotoListing<'a> {
    ctx: &'a ExportContext,
    job: &'a PhotoJob,
}

#[async_trait]
impl<'a> PageSource for PhotoListing<'a> {
    type Item = Photo;
    type Position = u32;

    fn label(&self) -> &str {
        "profile photos"
    }

    fn page_limit(&self) -> u32 {
        self.ctx.settings().photo_page_limit
    }

    fn stop_rule(&self) -> StopRule {
        StopRule::ShortPage
    }

    async fn fetch(&self, offset: &u32) -> Result<Page<Photo>, RemoteError> {
        let (photos, count) = self
            .ctx
            .invoke(TakeoutRequest::GetUserPhotos {
                offset: *offset,
                limit: self.page_limit(),
            })
            .await?
            .into_photos()?;
        if let Some(count) = count {
            self.job.set_declared_total(count);
        }
        Ok(Page::with_total(photos, count))
    }

    fn next_position(&self, offset: &u32, page: &Page<Photo>) -> Option<u32> {
        Some(offset + page.items.len() as u32)
    }
}

pub async fn export(ctx: &ExportContext) -> CategoryReport {
    let job: PhotoJob = ctx.job(Category::ProfilePictures, ProgressMode::Counted);
    job.reporter().status("Starting export...", Severity::Info);

    let dir = ctx.media_dir(Category::ProfilePictures);
    if let Err(e) = ensure_dir(&dir).await {
        return job.abandon(&format!("Failed to create folder: {e}"));
    }

    let (tracker, drained) = FanOutTracker::new();
    let listing = PhotoListing { ctx, job: &job };
    let outcome = CursorEngine::new(listing, 0, job.cancel_token())
        .run(|photos| {
            for photo in photos {
                fan_out(ctx, &job, &tracker, &dir, photo);
            }
            job.observe(&tracker);
        })
        .await;

    if let Some(e) = &outcome.error {
        job.record_failure(e);
    }
    tracker.close_enumeration();
    drained.await;
    info!("Profile photo listing done: {} photos in {} pages", outcome.items, outcome.pages);

    job.conclude(
        &dir.join(format!("metadata.{}", ctx.format().extension())),
        ctx.format(),
        |n| format!("Exported {n} photos"),
    )
    .await
}

fn fan_out(ctx: &ExportContext, job: &PhotoJob, tracker: &FanOutTracker, dir: &PathBuf, photo: Photo) {
    if tracker.enqueue(1).is_err() {
        job.record_skipped("listing already closed");
        return;
    }
    let guard = tracker.completion_guard();
    let (ctx, job, tracker, dir) = (ctx.clone(), Arc::clone(job), tracker.clone(), dir.clone());
    tokio::spawn(async move {
        {
            let _guard = guard;
            export_photo(&ctx, &job, &dir, photo).await;
        }
        job.observe(&tracker);
    });
}

async fn export_photo(ctx: &ExportContext, job: &PhotoJob, dir: &PathBuf, photo: Photo) {
    if job.is_cancelled() {
        return;
    }
    let Some(size) = photo.largest_size() else {
        job.record_skipped(&format!("photo {} has no sizes", photo.id));
        return;
    };

    let file_name = format!("profile_{}.jpg", format_timestamp(photo.date));
    if tokio::fs::try_exists(dir.join(&file_name)).await.unwrap_or(false) {
        job.record_skipped(&format!("{file_name} already exported"));
        return;
    }

    let bytes = match ctx.download(&size.location).await {
        Ok(bytes) => bytes,
        Err(e) => {
            job.record_skipped(&e.to_string());
            return;
        }
    };
    match save_media(dir, &file_name, &bytes).await {
        Ok(true) => {}
        Ok(false) => {
            job.record_skipped(&format!("{file_name} already exported"));
            return;
        }
        Err(e) => {
            job.record_skipped(&e.to_string());
            return;
        }
    }

    debug!("Saved {} ({} bytes)", file_name, bytes.len());
    let record = ProfilePhotoRecord {
        id: photo.id,
        date: format_timestamp(photo.date),
        size_kb: size.size / 1024,
        dimensions: if size.w > 0 && size.h > 0 {
            format!("{}x{}", size.w, size.h)
        } else {
            "unknown".to_string()
        },
        file_name,
    };
    let label = record.file_name.clone();
    job.push(record, &label);
}
