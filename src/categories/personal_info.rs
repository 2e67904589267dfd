use serde::Serialize;

use crate::export::job::CategoryReport;
use crate::export::progress::ProgressMode;
use crate::export::writers::ExportRecord;
use crate::export::Severity;
use crate::remote::{FullUser, TakeoutRequest};

use super::{Category, ExportContext};

/// One profile field. The set is written as a single `{ field: value }` document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalField {
    pub field: &'static str,
    pub value: String,
}

impl ExportRecord for PersonalField {
    const CSV_HEADER: &'static [&'static str] = &["Field Name", "Value"];
    const JSON_OBJECT: bool = true;

    fn csv_row(&self) -> Vec<String> {
        vec![self.field.to_string(), self.value.clone()]
    }

    fn json_entry(&self) -> Option<(&str, &str)> {
        Some((self.field, &self.value))
    }
}

pub fn fields(full: &FullUser) -> Vec<PersonalField> {
    let user = &full.user;
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    vec![
        PersonalField { field: "First Name", value: text(&user.first_name) },
        PersonalField { field: "Last Name", value: text(&user.last_name) },
        PersonalField { field: "Username", value: text(&user.username) },
        PersonalField { field: "Phone", value: text(&user.phone) },
        PersonalField { field: "Bio", value: text(&full.about) },
    ]
}

pub async fn export(ctx: &ExportContext) -> CategoryReport {
    let job = ctx.job::<PersonalField>(Category::PersonalInfo, ProgressMode::Counted);
    job.reporter().status("Starting export...", Severity::Info);

    match ctx
        .invoke(TakeoutRequest::GetFullUser)
        .await
        .and_then(|r| r.into_full_user())
    {
        Ok(full) => {
            let fields = fields(&full);
            job.set_declared_total(fields.len() as u64);
            let total = fields.len();
            for (done, field) in fields.into_iter().enumerate() {
                let name = field.field;
                job.push(field, name);
                job.record_progress(total - done - 1, total);
            }
            job.reporter().status("Saving to file...", Severity::Info);
        }
        Err(e) => job.record_failure(&e),
    }

    job.conclude(&ctx.record_path(Category::PersonalInfo), ctx.format(), |_| {
        "Export completed!".to_string()
    })
    .await
}
