use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::domain::{ArchiveRecord, DateWindow};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Headline statistics sent with a delivered archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveSummary {
    pub channel_id: String,
    pub count: usize,
    pub oldest: Option<(DateTime<Utc>, String)>,
    pub newest: Option<(DateTime<Utc>, String)>,
    pub per_day: f64,
}

impl ArchiveSummary {
    /// The effective window is the requested one, narrowed to the items'
    /// own range on whichever side was left open. Spans under a day count
    /// as one day.
    pub fn new(record: &ArchiveRecord, window: &DateWindow) -> Self {
        let oldest = record
            .oldest()
            .map(|item| (item.created_at, item.author_name.clone()));
        let newest = record
            .newest()
            .map(|item| (item.created_at, item.author_name.clone()));

        let start = window.start.or(oldest.as_ref().map(|(ts, _)| *ts));
        let end = window.end.or(newest.as_ref().map(|(ts, _)| *ts));
        let days = match (start, end) {
            (Some(start), Some(end)) => {
                ((end - start).num_seconds() as f64 / SECONDS_PER_DAY).max(1.0)
            }
            _ => 1.0,
        };

        Self {
            channel_id: record.channel_id.clone(),
            count: record.items.len(),
            oldest,
            newest,
            per_day: record.items.len() as f64 / days,
        }
    }

    pub fn render(&self, tz: Tz) -> String {
        let describe = |entry: &Option<(DateTime<Utc>, String)>| match entry {
            Some((ts, author)) => format!(
                "{} ({})",
                ts.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S"),
                escape_html(author)
            ),
            None => "-".to_string(),
        };
        format!(
            "<b>Archive complete</b>\n\n\
             Channel: {}\n\
             Messages: {}\n\
             Oldest: {}\n\
             Newest: {}\n\
             Average per day: {:.2}",
            escape_html(&self.channel_id),
            self.count,
            describe(&self.oldest),
            describe(&self.newest),
            self.per_day
        )
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
