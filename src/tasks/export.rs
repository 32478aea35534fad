use std::{
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::{Builder, NamedTempFile};

use crate::{
    domain::{ArchiveRecord, ExtractedItem},
    infrastructure::notifier::Attachment,
};

/// Writes archive records as JSON files under one directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
}

/// A JSON export on disk. The file is removed on [`ExportArtifact::close`] or drop.
#[derive(Debug)]
pub struct ExportArtifact {
    file: NamedTempFile,
    file_name: String,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    guild_id: &'a str,
    channel_id: &'a str,
    archived_at: DateTime<Utc>,
    requested_by: &'a str,
    requested_by_id: u64,
    message_count: usize,
    messages: &'a [ExtractedItem],
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Serializes on the blocking pool; large archives take a while to write.
    pub async fn export(&self, record: Arc<ArchiveRecord>) -> io::Result<ExportArtifact> {
        let exporter = self.clone();
        tokio::task::spawn_blocking(move || exporter.write(&record))
            .await
            .map_err(io::Error::other)?
    }

    pub fn write(&self, record: &ArchiveRecord) -> io::Result<ExportArtifact> {
        let file_name = format!(
            "archive-{}-{}.json",
            record.channel_id,
            record.archived_at.format("%Y%m%d-%H%M%S")
        );
        let file = Builder::new()
            .prefix("archive-")
            .suffix(".json")
            .tempfile_in(&self.dir)?;

        let document = ExportDocument {
            guild_id: &record.guild_id,
            channel_id: &record.channel_id,
            archived_at: record.archived_at,
            requested_by: &record.requested_by.display,
            requested_by_id: record.requested_by.user_id.0,
            message_count: record.items.len(),
            messages: &record.items,
        };

        let mut writer = BufWriter::new(file.as_file());
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.flush()?;
        drop(writer);

        Ok(ExportArtifact { file, file_name })
    }
}

impl ExportArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn attachment(&self) -> Attachment {
        Attachment {
            path: self.path().to_path_buf(),
            file_name: self.file_name.clone(),
        }
    }

    pub fn close(self) -> io::Result<()> {
        self.file.close()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use teloxide::types::UserId;

    use super::*;
    use crate::domain::Requester;

    fn record() -> ArchiveRecord {
        let item = |id: &str, secs: i64| ExtractedItem {
            message_id: id.into(),
            author_id: "1".into(),
            author_name: "alice".into(),
            content: id.into(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        };
        ArchiveRecord {
            guild_id: "g".into(),
            channel_id: "123".into(),
            archived_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            requested_by: Requester {
                user_id: UserId(9),
                display: "@bob".into(),
            },
            items: vec![item("a", 1), item("b", 3)],
        }
    }

    #[test]
    fn writes_items_oldest_first_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();

        let artifact = Exporter::new(dir.path()).write(&record()).unwrap();
        assert_eq!(artifact.file_name(), "archive-123-20240301-123000.json");

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(artifact.path()).unwrap()).unwrap();
        assert_eq!(json["message_count"], 2);
        assert_eq!(json["requested_by"], "@bob");
        assert_eq!(json["messages"][0]["content"], "a");
        assert_eq!(json["messages"][1]["content"], "b");

        let path = artifact.path().to_path_buf();
        artifact.close().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn export_writes_on_the_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let record = Arc::new(record());

        let artifact = Exporter::new(dir.path())
            .export(record.clone())
            .await
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(artifact.path()).unwrap()).unwrap();
        assert_eq!(json["channel_id"], "123");
        assert_eq!(json["message_count"], record.items.len());
        assert_eq!(Arc::strong_count(&record), 1);
    }

    #[tokio::test]
    async fn export_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");

        let err = Exporter::new(missing).export(Arc::new(record())).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
