//! In-memory collaborators for pipeline and dispatcher tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use teloxide::types::{ChatId, UserId};
use tempfile::TempDir;

use crate::{
    db::{ArchiveStore, StoreError},
    domain::{ArchiveRecord, DateWindow, Job, Requester},
    infrastructure::notifier::{Attachment, DeliveryError, Notifier},
    source::{MessageSource, RawMessage, SourceError},
    tasks::{export::Exporter, fetcher::PaginatedFetcher, pipeline::ArchivePipeline},
};

pub const REPLY_CHAT: ChatId = ChatId(-100);
pub const REQUESTER: UserId = UserId(7);

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// A message `secs` seconds after 2024-01-01.
pub fn raw(id: &str, secs: i64, content: &str) -> RawMessage {
    RawMessage {
        id: id.into(),
        author_id: "42".into(),
        author_name: "alice".into(),
        is_automated: false,
        content: content.into(),
        timestamp: epoch() + chrono::Duration::seconds(secs),
    }
}

pub fn job(channel: &str, limit: u64) -> Job {
    Job::new(
        "guild".into(),
        channel.into(),
        limit,
        DateWindow::default(),
        Requester {
            user_id: REQUESTER,
            display: "@tester".into(),
        },
        REPLY_CHAT,
        epoch(),
    )
    .unwrap()
}

#[derive(Default)]
pub struct FakeSource {
    histories: Mutex<HashMap<String, Vec<RawMessage>>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
    delay: Mutex<Option<Duration>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_history(&self, channel: &str, mut messages: Vec<RawMessage>) {
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.histories.lock().insert(channel.to_string(), messages);
    }

    pub fn fail_channel(&self, channel: &str) {
        self.failing.lock().insert(channel.to_string());
    }

    /// Requests for `channel` panic instead of answering.
    pub fn panic_channel(&self, channel: &str) {
        self.panicking.lock().insert(channel.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Cursors of every page request, in order.
    pub fn requests(&self) -> Vec<Option<String>> {
        self.requests.lock().iter().map(|(_, b)| b.clone()).collect()
    }

    /// Channels in the order their first page was requested.
    pub fn channels_started(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter(|(_, before)| before.is_none())
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn page(&self, channel: &str, before: Option<&str>, limit: u8) -> Result<Vec<RawMessage>, SourceError> {
        if self.failing.lock().contains(channel) {
            return Err(SourceError::Status {
                status: 500,
                body: "boom".into(),
            });
        }
        let histories = self.histories.lock();
        let Some(history) = histories.get(channel) else {
            return Ok(Vec::new());
        };
        let start = match before {
            Some(cursor) => history
                .iter()
                .position(|m| m.id == cursor)
                .map_or(history.len(), |i| i + 1),
            None => 0,
        };
        Ok(history
            .iter()
            .skip(start)
            .take(usize::from(limit))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageSource for FakeSource {
    async fn fetch_page(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<RawMessage>, SourceError> {
        self.requests
            .lock()
            .push((channel_id.to_string(), before.map(str::to_string)));
        let panics = self.panicking.lock().contains(channel_id);
        if panics {
            panic!("message store exploded for {channel_id}");
        }

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.page(channel_id, before, limit);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
pub struct MemoryStore {
    persisted: Mutex<Vec<ArchiveRecord>>,
    deleted: Mutex<Vec<i64>>,
    fail_persist: AtomicBool,
}

impl MemoryStore {
    pub fn persisted(&self) -> Vec<ArchiveRecord> {
        self.persisted.lock().clone()
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.deleted.lock().clone()
    }

    pub fn fail_persist(&self) {
        self.fail_persist.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArchiveStore for MemoryStore {
    async fn persist(&self, record: &ArchiveRecord) -> Result<i64, StoreError> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        let mut persisted = self.persisted.lock();
        persisted.push(record.clone());
        Ok(persisted.len() as i64)
    }

    async fn delete(&self, record_id: i64) -> Result<(), StoreError> {
        self.deleted.lock().push(record_id);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Sent {
    Direct {
        user: UserId,
        text: String,
        attachment: Option<Vec<u8>>,
    },
    Chat {
        chat: ChatId,
        text: String,
        attachment: Option<Vec<u8>>,
    },
}

impl Sent {
    pub fn text(&self) -> &str {
        match self {
            Sent::Direct { text, .. } | Sent::Chat { text, .. } => text,
        }
    }

    pub fn attachment_json(&self) -> Option<serde_json::Value> {
        let bytes = match self {
            Sent::Direct { attachment, .. } | Sent::Chat { attachment, .. } => attachment.as_ref()?,
        };
        serde_json::from_slice(bytes).ok()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    fail_direct: AtomicBool,
    fail_chat_attachments: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn fail_direct(&self) {
        self.fail_direct.store(true, Ordering::SeqCst);
    }

    pub fn fail_chat_attachments(&self) {
        self.fail_chat_attachments.store(true, Ordering::SeqCst);
    }
}

fn read_attachment(attachment: Option<&Attachment>) -> Option<Vec<u8>> {
    attachment.map(|file| std::fs::read(&file.path).unwrap_or_default())
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_direct(
        &self,
        user: UserId,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), DeliveryError> {
        if self.fail_direct.load(Ordering::SeqCst) {
            return Err(DeliveryError::Unavailable("direct messages disabled".into()));
        }
        self.sent.lock().push(Sent::Direct {
            user,
            text: text.to_string(),
            attachment: read_attachment(attachment),
        });
        Ok(())
    }

    async fn send_to_chat(
        &self,
        chat: ChatId,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), DeliveryError> {
        if attachment.is_some() && self.fail_chat_attachments.load(Ordering::SeqCst) {
            return Err(DeliveryError::Unavailable("uploads disabled".into()));
        }
        self.sent.lock().push(Sent::Chat {
            chat,
            text: text.to_string(),
            attachment: read_attachment(attachment),
        });
        Ok(())
    }
}

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub pipeline: ArchivePipeline,
    pub export_dir: TempDir,
}

impl Harness {
    pub fn export_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.export_dir.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
    }
}

pub fn harness(retain_records: bool) -> Harness {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let export_dir = tempfile::tempdir().unwrap();
    let pipeline = ArchivePipeline::new(
        PaginatedFetcher::new(source.clone(), 100),
        store.clone(),
        notifier.clone(),
        Exporter::new(export_dir.path()),
        retain_records,
        chrono_tz::UTC,
    );
    Harness {
        source,
        store,
        notifier,
        pipeline,
        export_dir,
    }
}
