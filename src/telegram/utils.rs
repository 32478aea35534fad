use chrono::{DateTime, NaiveDate, Utc};
use teloxide::types::User;

use crate::domain::{DateWindow, JobError, DEFAULT_LIMIT};

pub const ARCHIVE_USAGE: &str = "\
<b>/archive</b> &lt;channel_id&gt; [limit] [start_date] [end_date]

Archives messages from the given channel. By default every message is fetched; \
a limit or a timeframe makes the job smaller and faster.

- <code>limit</code>: maximum number of messages (e.g. 500)
- <code>start_date</code>: earliest day to include, YYYY-MM-DD
- <code>end_date</code>: latest day to include, YYYY-MM-DD (defaults to today)

Options may also be written as <code>limit=500 start=2024-01-01 end=2024-01-31</code>.

A JSON file with the archived messages is sent to you privately once the job \
completes. If the bot cannot message you, the file is posted in this chat instead.
Requests are queued by size: smaller jobs finish first.";

/// A validated `/archive` request, before the guild is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveArgs {
    pub channel_id: String,
    pub limit: u64,
    pub window: DateWindow,
}

pub fn parse_archive_args(text: &str, now: DateTime<Utc>) -> Result<ArchiveArgs, JobError> {
    let mut tokens = text.split_whitespace();
    let channel_id = tokens
        .next()
        .map(normalize_channel)
        .ok_or_else(|| JobError::InvalidChannel(String::new()))?;
    if channel_id.is_empty() || !channel_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(JobError::InvalidChannel(channel_id));
    }

    let mut limit = None;
    let mut start = None;
    let mut end = None;
    for token in tokens {
        match token.split_once('=') {
            Some(("limit", value)) => limit = Some(parse_limit(value)?),
            Some(("start" | "start_date", value)) => start = Some(parse_day(value, false)?),
            Some(("end" | "end_date", value)) => end = Some(parse_day(value, true)?),
            Some(_) => return Err(JobError::UnknownOption(token.to_string())),
            None if token.contains('-') => {
                if start.is_none() {
                    start = Some(parse_day(token, false)?);
                } else if end.is_none() {
                    end = Some(parse_day(token, true)?);
                } else {
                    return Err(JobError::InvalidDate(token.to_string()));
                }
            }
            None => limit = Some(parse_limit(token)?),
        }
    }

    if start.is_some() && end.is_none() {
        end = Some(now);
    }

    Ok(ArchiveArgs {
        channel_id,
        limit: limit.unwrap_or(DEFAULT_LIMIT),
        window: DateWindow::new(start, end)?,
    })
}

fn normalize_channel(raw: &str) -> String {
    raw.trim_start_matches("<#").trim_end_matches('>').to_string()
}

fn parse_limit(raw: &str) -> Result<u64, JobError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(JobError::ZeroLimit),
        Ok(limit) => Ok(limit),
        Err(_) => Err(JobError::InvalidLimit(raw.to_string())),
    }
}

/// Start days begin at midnight UTC; end days run to their last millisecond.
fn parse_day(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, JobError> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| JobError::InvalidDate(raw.to_string()))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| JobError::InvalidDate(raw.to_string()))
}

pub fn format_user_display(user: &User) -> String {
    if let Some(username) = &user.username {
        format!("@{}", username)
    } else {
        let mut parts = Vec::new();
        parts.push(user.first_name.as_str());
        if let Some(last) = &user.last_name {
            parts.push(last.as_str());
        }
        let name = parts.join(" ").trim().to_string();
        if name.is_empty() {
            "Unknown".to_string()
        } else {
            name
        }
    }
}
