use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{Job, Requester};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub message_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A finished extraction, items ascending by `created_at`.
#[derive(Debug, Clone)]
pub struct ArchiveRecord {
    pub guild_id: String,
    pub channel_id: String,
    pub archived_at: DateTime<Utc>,
    pub requested_by: Requester,
    pub items: Vec<ExtractedItem>,
}

impl ArchiveRecord {
    pub fn from_job(job: &Job, items: Vec<ExtractedItem>, archived_at: DateTime<Utc>) -> Self {
        Self {
            guild_id: job.guild_id.clone(),
            channel_id: job.channel_id.clone(),
            archived_at,
            requested_by: job.requester.clone(),
            items,
        }
    }

    pub fn oldest(&self) -> Option<&ExtractedItem> {
        self.items.first()
    }

    pub fn newest(&self) -> Option<&ExtractedItem> {
        self.items.last()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub queued: usize,
    pub busy: bool,
}
