//! Console presentation: one progress bar per category while the run is going, and a
//! summary table once it is over.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use nu_ansi_term::Color;
use tabled::builder::Builder;
use tabled::settings::object::{Columns, Rows};
use tabled::settings::width::Width;
use tabled::settings::{Alignment, Color as TableColor, Modify, Style};

use crate::categories::Category;
use crate::export::{Severity, StatusSink, TakeoutSummary};

/// Bar length; progress fractions are scaled onto it.
const PROGRESS_SCALE: u64 = 1000;

/// Widest the message column of the summary gets before wrapping.
const MAX_MESSAGE_WIDTH: usize = 60;

/// Status sink that drives terminal progress bars
pub struct ConsoleSink {
    multi: MultiProgress,
    bars: HashMap<Category, ProgressBar>,
    color: bool,
}

impl ConsoleSink {
    /// Create one bar per category. `quiet` hides every bar.
    pub fn new(categories: &[Category], color: bool, quiet: bool) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        let style = ProgressStyle::default_bar()
            .template("{prefix:>18} [{bar:30.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let bars = categories
            .iter()
            .map(|&category| {
                let bar = multi.add(ProgressBar::new(PROGRESS_SCALE));
                bar.set_style(style.clone());
                bar.set_prefix(category.title());
                (category, bar)
            })
            .collect();

        Self { multi, bars, color }
    }

    fn bar(&self, category: Category) -> Option<&ProgressBar> {
        self.bars.get(&category)
    }

    fn paint(&self, text: &str, severity: Severity) -> String {
        paint(text, severity, self.color)
    }

    /// Remove bars that never finished (cancelled runs).
    pub fn finish(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
        let _ = self.multi.clear();
    }

    #[cfg(test)]
    fn position(&self, category: Category) -> Option<u64> {
        self.bar(category).map(|bar| bar.position())
    }
}

impl StatusSink for ConsoleSink {
    fn status_changed(&self, category: Category, text: &str, severity: Severity) {
        if let Some(bar) = self.bar(category) {
            bar.set_message(self.paint(text, severity));
        }
    }

    fn item_exported(&self, category: Category, order: u64, label: &str, total: Option<u64>) {
        if let Some(bar) = self.bar(category) {
            let message = match total {
                Some(total) => format!("{order}/{total} {label}"),
                None => format!("#{order} {label}"),
            };
            bar.set_message(message);
        }
    }

    fn progress_changed(&self, category: Category, fraction: f64) {
        if let Some(bar) = self.bar(category) {
            bar.set_position((fraction * PROGRESS_SCALE as f64).round() as u64);
        }
    }

    fn export_finished(&self, category: Category, text: &str, severity: Severity) {
        if let Some(bar) = self.bar(category) {
            if severity != Severity::Failure {
                bar.set_position(PROGRESS_SCALE);
            }
            bar.finish_with_message(self.paint(text, severity));
        }
    }
}

fn paint(text: &str, severity: Severity, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    match severity {
        Severity::Success => Color::Green.paint(text).to_string(),
        Severity::Warning => Color::Yellow.paint(text).to_string(),
        Severity::Failure => Color::Red.bold().paint(text).to_string(),
        Severity::Info => text.to_string(),
    }
}

/// Render the end-of-run table
pub fn render_summary(summary: &TakeoutSummary, color: bool) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Category", "Status", "Records", "Output", "Message"]);
    for report in &summary.reports {
        builder.push_record([
            report.category.title().to_string(),
            paint(report.severity.as_str(), report.severity, color),
            report.records.to_string(),
            report
                .output
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            report.text.clone(),
        ]);
    }

    let mut table = builder.build();
    table.with(Style::modern());
    table.with(Modify::new(Columns::new(4..=4)).with(Width::wrap(MAX_MESSAGE_WIDTH)));
    table.with(Modify::new(Rows::first()).with(Alignment::center()));
    if color {
        table.modify(Rows::first(), TableColor::FG_CYAN | TableColor::BOLD);
    }

    let outcome = if summary.cancelled {
        "cancelled"
    } else if summary.succeeded() {
        "completed"
    } else {
        "completed with errors"
    };
    format!(
        "{}\nTakeout session {} {} in {:.1}s",
        table,
        summary.session.0,
        outcome,
        summary.elapsed_ms as f64 / 1000.0
    )
}
