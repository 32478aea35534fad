use chrono::{DateTime, Utc};
use teloxide::types::{ChatId, UserId};
use thiserror::Error;

/// Limit applied when the requester does not name one.
pub const DEFAULT_LIMIT: u64 = 999_999;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("limit must be a positive number")]
    ZeroLimit,
    #[error("end date {end} must be after start date {start}")]
    InvertedWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("invalid channel id: {0}")]
    InvalidChannel(String),
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid limit {0:?}")]
    InvalidLimit(String),
    #[error("unknown option {0:?}")]
    UnknownOption(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self, JobError> {
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                return Err(JobError::InvertedWindow { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Whole days between start and end, counting an open end as `now`.
    pub fn whole_days(&self, now: DateTime<Utc>) -> Option<u64> {
        let start = self.start?;
        let end = self.end.unwrap_or(now);
        Some(u64::try_from((end - start).num_days()).unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub display: String,
}

/// A queued request to extract one channel's messages.
///
/// Built once by the command boundary and never mutated afterwards; the
/// dispatcher consumes it exactly once.
#[derive(Debug, Clone)]
pub struct Job {
    pub guild_id: String,
    pub channel_id: String,
    pub weight: u64,
    pub limit: u64,
    pub window: DateWindow,
    pub requester: Requester,
    pub reply_to: ChatId,
    pub requested_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        guild_id: String,
        channel_id: String,
        limit: u64,
        window: DateWindow,
        requester: Requester,
        reply_to: ChatId,
        now: DateTime<Utc>,
    ) -> Result<Self, JobError> {
        if limit == 0 {
            return Err(JobError::ZeroLimit);
        }
        Ok(Self {
            guild_id,
            channel_id,
            weight: compute_weight(limit, &window, now),
            limit,
            window,
            requester,
            reply_to,
            requested_at: now,
        })
    }
}

/// Scheduling cost: the day span of the window, capped by the limit.
pub fn compute_weight(limit: u64, window: &DateWindow, now: DateTime<Utc>) -> u64 {
    match window.whole_days(now) {
        Some(days) => days.min(limit),
        None => limit,
    }
}
