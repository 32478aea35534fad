use std::convert::TryFrom;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, sqlite::SqlitePool};
use thiserror::Error;

use crate::domain::ArchiveRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("archive record {0} not found")]
    NotFound(i64),
}

/// Durable home for finished archives.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn persist(&self, record: &ArchiveRecord) -> Result<i64, StoreError>;
    async fn delete(&self, record_id: i64) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct ArchiveRepository {
    pool: SqlitePool,
}

impl ArchiveRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Drops every archive created before `cutoff`. Returns how many went.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        query(
            r#"DELETE FROM archived_messages
               WHERE archive_id IN (SELECT id FROM archives WHERE archived_at < ?1)"#,
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        let removed = query(r#"DELETE FROM archives WHERE archived_at < ?1"#)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed)
    }
}

#[async_trait]
impl ArchiveStore for ArchiveRepository {
    async fn persist(&self, record: &ArchiveRecord) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let archive_id = query(
            r#"INSERT INTO archives (guild_id, channel_id, archived_at, requested_by_id, requested_by)
                VALUES (?1, ?2, ?3, ?4, ?5)"#,
        )
        .bind(&record.guild_id)
        .bind(&record.channel_id)
        .bind(record.archived_at)
        .bind(i64::try_from(record.requested_by.user_id.0).unwrap_or(i64::MAX))
        .bind(&record.requested_by.display)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (position, item) in record.items.iter().enumerate() {
            query(
                r#"INSERT INTO archived_messages
                    (archive_id, position, message_id, author_id, author_tag, content, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            )
            .bind(archive_id)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(&item.message_id)
            .bind(&item.author_id)
            .bind(&item.author_name)
            .bind(&item.content)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(
            target: "db",
            archive_id,
            channel_id = %record.channel_id,
            messages = record.items.len(),
            "archive persisted"
        );
        Ok(archive_id)
    }

    async fn delete(&self, record_id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        query(r#"DELETE FROM archived_messages WHERE archive_id = ?1"#)
            .bind(record_id)
            .execute(&mut *tx)
            .await?;
        let affected = query(r#"DELETE FROM archives WHERE id = ?1"#)
            .bind(record_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::NotFound(record_id));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use sqlx::{query_as, sqlite::SqlitePoolOptions};
    use teloxide::types::UserId;

    use super::*;
    use crate::domain::{ExtractedItem, Requester};

    async fn repository() -> ArchiveRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_schema(&pool).await.unwrap();
        ArchiveRepository::new(pool)
    }

    fn record(archived_at: DateTime<Utc>) -> ArchiveRecord {
        let item = |id: &str, secs: i64| ExtractedItem {
            message_id: id.into(),
            author_id: "42".into(),
            author_name: "alice".into(),
            content: format!("text {id}"),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        };
        ArchiveRecord {
            guild_id: "g1".into(),
            channel_id: "c1".into(),
            archived_at,
            requested_by: Requester {
                user_id: UserId(7),
                display: "@tester".into(),
            },
            items: vec![item("a", 1), item("b", 3)],
        }
    }

    async fn count(repo: &ArchiveRepository, sql: &str) -> i64 {
        let (n,): (i64,) = query_as(sql).fetch_one(&repo.pool).await.unwrap();
        n
    }

    #[tokio::test]
    async fn persist_keeps_item_order_and_delete_removes_everything() {
        let repo = repository().await;
        let id = repo.persist(&record(Utc::now())).await.unwrap();

        let ids: Vec<(String,)> = query_as(
            "SELECT message_id FROM archived_messages WHERE archive_id = ?1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&repo.pool)
        .await
        .unwrap();
        assert_eq!(ids, vec![("a".to_string(),), ("b".to_string(),)]);

        repo.delete(id).await.unwrap();
        assert_eq!(count(&repo, "SELECT COUNT(*) FROM archives").await, 0);
        assert_eq!(count(&repo, "SELECT COUNT(*) FROM archived_messages").await, 0);
    }

    #[tokio::test]
    async fn deleting_unknown_record_reports_not_found() {
        let repo = repository().await;
        assert!(matches!(repo.delete(99).await, Err(StoreError::NotFound(99))));
    }

    #[tokio::test]
    async fn purge_only_touches_old_archives() {
        let repo = repository().await;
        let now = Utc::now();
        repo.persist(&record(now - Duration::days(40))).await.unwrap();
        repo.persist(&record(now)).await.unwrap();

        let removed = repo.purge_older_than(now - Duration::days(30)).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(count(&repo, "SELECT COUNT(*) FROM archives").await, 1);
        assert_eq!(count(&repo, "SELECT COUNT(*) FROM archived_messages").await, 2);
    }
}
