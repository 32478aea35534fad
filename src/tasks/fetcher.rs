use std::sync::Arc;

use crate::{
    domain::{DateWindow, ExtractedItem},
    source::{MessageSource, SourceError},
};

/// Largest page the message store serves per request.
pub const MAX_PAGE_SIZE: u8 = 100;

/// Walks a channel's history backward from the newest message.
pub struct PaginatedFetcher {
    source: Arc<dyn MessageSource>,
    page_size: u8,
}

impl PaginatedFetcher {
    pub fn new(source: Arc<dyn MessageSource>, page_size: u8) -> Self {
        Self { source, page_size }
    }

    /// Collects up to `limit` qualifying messages inside `window`, newest first.
    ///
    /// Paging stops at the first message older than the window start, at the
    /// limit, or on an empty page. Messages newer than the window end are
    /// skipped without stopping, since older in-window messages may follow.
    pub async fn fetch(
        &self,
        channel_id: &str,
        limit: u64,
        window: &DateWindow,
    ) -> Result<Vec<ExtractedItem>, SourceError> {
        let mut accepted = Vec::new();
        let mut before: Option<String> = None;
        let mut pages = 0u32;

        'pages: while (accepted.len() as u64) < limit {
            let page = self
                .source
                .fetch_page(channel_id, before.as_deref(), self.page_size)
                .await?;
            pages += 1;

            let Some(cursor) = page.last().map(|msg| msg.id.clone()) else {
                break;
            };

            for message in page {
                if window.start.is_some_and(|start| message.timestamp < start) {
                    tracing::debug!(
                        target: "fetcher",
                        channel_id,
                        message_id = %message.id,
                        "reached window start; stopping"
                    );
                    break 'pages;
                }
                if window.end.is_some_and(|end| message.timestamp > end) {
                    continue;
                }
                if message.is_automated || message.content.is_empty() {
                    continue;
                }
                accepted.push(ExtractedItem::from(message));
                if accepted.len() as u64 >= limit {
                    break 'pages;
                }
            }

            before = Some(cursor);
        }

        tracing::debug!(
            target: "fetcher",
            channel_id,
            pages,
            accepted = accepted.len(),
            "fetch finished"
        );
        Ok(accepted)
    }
}
