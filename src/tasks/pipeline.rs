use std::{io, sync::Arc};

use chrono::Utc;
use chrono_tz::Tz;
use teloxide::types::ChatId;
use thiserror::Error;
use tokio::time::Instant;

use crate::{
    db::{ArchiveStore, StoreError},
    domain::{ArchiveRecord, Job},
    infrastructure::notifier::{Attachment, DeliveryError, Notifier},
    source::SourceError,
    tasks::{
        collector::OrderedCollector,
        export::Exporter,
        fetcher::PaginatedFetcher,
        summary::{escape_html, ArchiveSummary},
    },
};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("could not read the channel history ({0})")]
    Fetch(#[from] SourceError),
    #[error("could not store the archive ({0})")]
    Persist(#[source] StoreError),
    #[error("could not write the export file ({0})")]
    Export(#[source] io::Error),
    #[error("could not deliver the archive (direct: {direct}; channel: {fallback})")]
    Delivery {
        direct: DeliveryError,
        fallback: DeliveryError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryRoute {
    Direct,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered { items: usize, route: DeliveryRoute },
    Empty,
    Failed,
}

/// Runs one job end to end: fetch, sort, persist, export, deliver.
pub struct ArchivePipeline {
    fetcher: PaginatedFetcher,
    store: Arc<dyn ArchiveStore>,
    notifier: Arc<dyn Notifier>,
    exporter: Exporter,
    retain_records: bool,
    timezone: Tz,
}

impl ArchivePipeline {
    pub fn new(
        fetcher: PaginatedFetcher,
        store: Arc<dyn ArchiveStore>,
        notifier: Arc<dyn Notifier>,
        exporter: Exporter,
        retain_records: bool,
        timezone: Tz,
    ) -> Self {
        Self {
            fetcher,
            store,
            notifier,
            exporter,
            retain_records,
            timezone,
        }
    }

    /// Never fails: every error ends as a failure notice to the requester.
    pub async fn run(&self, job: Job) -> JobOutcome {
        let started = Instant::now();
        tracing::info!(
            target: "dispatcher",
            channel_id = %job.channel_id,
            weight = job.weight,
            limit = job.limit,
            requester = %job.requester.display,
            "processing archive job"
        );

        match self.execute(&job).await {
            Ok(outcome) => {
                tracing::info!(
                    target: "dispatcher",
                    channel_id = %job.channel_id,
                    ?outcome,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "archive job finished"
                );
                outcome
            }
            Err(err) => {
                tracing::error!(
                    target: "dispatcher",
                    channel_id = %job.channel_id,
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "archive job failed"
                );
                self.report_failure(&job.channel_id, job.reply_to, &err.to_string())
                    .await;
                JobOutcome::Failed
            }
        }
    }

    pub async fn report_failure(&self, channel_id: &str, reply_to: ChatId, reason: &str) {
        let text = format!(
            "Failed to archive channel <code>{}</code>: {}",
            escape_html(channel_id),
            escape_html(reason)
        );
        if let Err(err) = self.notifier.send_to_chat(reply_to, &text, None).await {
            tracing::warn!(
                target: "dispatcher",
                error = %err,
                chat_id = reply_to.0,
                "failed to send failure notice"
            );
        }
    }

    async fn execute(&self, job: &Job) -> Result<JobOutcome, ArchiveError> {
        let fetched = self
            .fetcher
            .fetch(&job.channel_id, job.limit, &job.window)
            .await?;

        if fetched.is_empty() {
            let text = format!(
                "No messages matched the request for channel <code>{}</code>; nothing to archive.",
                escape_html(&job.channel_id)
            );
            if let Err(err) = self.notifier.send_to_chat(job.reply_to, &text, None).await {
                tracing::warn!(
                    target: "dispatcher",
                    error = %err,
                    chat_id = job.reply_to.0,
                    "failed to send empty-result notice"
                );
            }
            return Ok(JobOutcome::Empty);
        }

        let mut collector = OrderedCollector::new();
        collector.extend(fetched);
        let record = Arc::new(ArchiveRecord::from_job(job, collector.drain(), Utc::now()));

        let record_id = self
            .store
            .persist(&record)
            .await
            .map_err(ArchiveError::Persist)?;

        let artifact = match self.exporter.export(record.clone()).await {
            Ok(artifact) => artifact,
            Err(err) => {
                self.release_record(record_id).await;
                return Err(ArchiveError::Export(err));
            }
        };

        let summary = ArchiveSummary::new(&record, &job.window).render(self.timezone);
        let route = self.deliver(job, &summary, &artifact.attachment()).await;

        self.release_record(record_id).await;
        let file_name = artifact.file_name().to_string();
        if let Err(err) = artifact.close() {
            tracing::warn!(
                target: "dispatcher",
                file = %file_name,
                error = %err,
                "failed to remove export file"
            );
        }

        Ok(JobOutcome::Delivered {
            items: record.items.len(),
            route: route?,
        })
    }

    /// Direct message first, the request's chat as fallback.
    async fn deliver(
        &self,
        job: &Job,
        summary: &str,
        attachment: &Attachment,
    ) -> Result<DeliveryRoute, ArchiveError> {
        let direct = match self
            .notifier
            .send_direct(job.requester.user_id, summary, Some(attachment))
            .await
        {
            Ok(()) => return Ok(DeliveryRoute::Direct),
            Err(err) => err,
        };

        tracing::warn!(
            target: "dispatcher",
            error = %direct,
            user_id = job.requester.user_id.0,
            "direct delivery failed; posting to channel"
        );

        let text = format!(
            "{summary}\n\n<i>Could not message {} directly, so the archive is posted here.</i>",
            escape_html(&job.requester.display)
        );
        match self
            .notifier
            .send_to_chat(job.reply_to, &text, Some(attachment))
            .await
        {
            Ok(()) => Ok(DeliveryRoute::Channel),
            Err(fallback) => Err(ArchiveError::Delivery { direct, fallback }),
        }
    }

    async fn release_record(&self, record_id: i64) {
        if self.retain_records {
            return;
        }
        if let Err(err) = self.store.delete(record_id).await {
            tracing::warn!(
                target: "db",
                record_id,
                error = %err,
                "failed to delete transient archive record"
            );
        }
    }
}
