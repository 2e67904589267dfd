use serde::Serialize;

use crate::export::job::CategoryReport;
use crate::export::progress::ProgressMode;
use crate::export::writers::{ExportRecord, format_timestamp};
use crate::export::Severity;
use crate::remote::{Authorization, TakeoutRequest, WebAuthorization};

use super::{Category, ExportContext};

/// An active app or web login.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub kind: &'static str,
    pub name: String,
    pub device: String,
    pub platform: String,
    pub last_active: String,
}

impl From<&Authorization> for SessionRecord {
    fn from(auth: &Authorization) -> Self {
        Self {
            kind: "app",
            name: auth.app_name.clone().unwrap_or_default(),
            device: auth.device_model.clone().unwrap_or_default(),
            platform: auth.platform.clone().unwrap_or_default(),
            last_active: format_timestamp(auth.date_active),
        }
    }
}

impl From<&WebAuthorization> for SessionRecord {
    fn from(auth: &WebAuthorization) -> Self {
        Self {
            kind: "web",
            name: auth.domain.clone().unwrap_or_default(),
            device: auth.browser.clone().unwrap_or_default(),
            platform: auth.platform.clone().unwrap_or_default(),
            last_active: format_timestamp(auth.date_active),
        }
    }
}

impl ExportRecord for SessionRecord {
    const CSV_HEADER: &'static [&'static str] = &["Kind", "Name", "Device", "Platform", "Last Active"];

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.kind.to_string(),
            self.name.clone(),
            self.device.clone(),
            self.platform.clone(),
            self.last_active.clone(),
        ]
    }
}

pub async fn export(ctx: &ExportContext) -> CategoryReport {
    let job = ctx.job::<SessionRecord>(Category::Sessions, ProgressMode::Counted);
    job.reporter().status("Starting export...", Severity::Info);

    let apps = ctx
        .invoke(TakeoutRequest::GetAuthorizations)
        .await
        .and_then(|r| r.into_authorizations());
    match apps {
        Ok(apps) => {
            for auth in &apps {
                let record = SessionRecord::from(auth);
                let label = format!("{} ({})", record.name, record.kind);
                job.push(record, &label);
            }
            job.record_progress(1, 2);

            // Web logins only make sense next to a successful app listing.
            match ctx
                .invoke(TakeoutRequest::GetWebAuthorizations)
                .await
                .and_then(|r| r.into_web_authorizations())
            {
                Ok(web) => {
                    for auth in &web {
                        let record = SessionRecord::from(auth);
                        let label = format!("{} ({})", record.name, record.kind);
                        job.push(record, &label);
                    }
                    job.record_progress(0, 2);
                }
                Err(e) => job.record_failure(&e),
            }
        }
        Err(e) => job.record_failure(&e),
    }

    job.conclude(&ctx.record_path(Category::Sessions), ctx.format(), |n| {
        format!("Export done! {n} sessions exported.")
    })
    .await
}
