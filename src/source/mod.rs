pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::ExtractedItem;

pub use http::HttpMessageSource;

/// One message as the store returns it, before filtering.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub is_automated: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<RawMessage> for ExtractedItem {
    fn from(raw: RawMessage) -> Self {
        Self {
            message_id: raw.id,
            author_id: raw.author_id,
            author_name: raw.author_name,
            content: raw.content,
            created_at: raw.timestamp,
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("message store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("message store returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// A paginated, newest-first message history.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Returns up to `limit` messages strictly older than `before`, newest
    /// first. An empty page means the history is exhausted.
    async fn fetch_page(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<RawMessage>, SourceError>;

    async fn resolve_guild(&self, _channel_id: &str) -> Result<Option<String>, SourceError> {
        Ok(None)
    }
}
