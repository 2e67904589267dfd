use serde::Serialize;
use tracing::info;

use crate::export::job::CategoryReport;
use crate::export::progress::ProgressMode;
use crate::export::writers::{ExportRecord, format_timestamp};
use crate::export::Severity;
use crate::remote::{SavedContact, TakeoutRequest};

use super::{Category, ExportContext};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactRecord {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub added_date: String,
}

impl From<&SavedContact> for ContactRecord {
    fn from(contact: &SavedContact) -> Self {
        Self {
            first_name: contact.first_name.clone().unwrap_or_default(),
            last_name: contact.last_name.clone().unwrap_or_default(),
            phone: contact.phone.clone().unwrap_or_default(),
            added_date: format_timestamp(contact.date),
        }
    }
}

impl ExportRecord for ContactRecord {
    const CSV_HEADER: &'static [&'static str] =
        &["First Name", "Last Name", "Phone Number", "Added Date"];

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.first_name.clone(),
            self.last_name.clone(),
            self.phone.clone(),
            self.added_date.clone(),
        ]
    }
}

pub async fn export(ctx: &ExportContext) -> CategoryReport {
    let job = ctx.job::<ContactRecord>(Category::Contacts, ProgressMode::Counted);
    job.reporter().status("Starting export...", Severity::Info);

    match ctx
        .invoke(TakeoutRequest::GetSavedContacts)
        .await
        .and_then(|r| r.into_saved_contacts())
    {
        Ok(contacts) => {
            info!("Exporting {} contacts", contacts.len());
            job.set_declared_total(contacts.len() as u64);
            job.reporter()
                .status(&format!("Exporting {} contacts", contacts.len()), Severity::Info);
            for (done, contact) in contacts.iter().enumerate() {
                let record = ContactRecord::from(contact);
                let label = format!("{} {}", record.first_name, record.last_name);
                job.push(record, label.trim());
                job.record_progress(contacts.len() - done - 1, contacts.len());
            }
        }
        Err(e) => job.record_failure(&e),
    }

    job.conclude(&ctx.record_path(Category::Contacts), ctx.format(), |n| {
        format!("Export done! {n} contacts exported.")
    })
    .await
}
