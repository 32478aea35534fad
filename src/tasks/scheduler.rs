use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::db::ArchiveRepository;

/// Registers retention purges of stored archives on each cron spec.
pub async fn configure_purge_jobs(
    cron_specs: &[String],
    repository: Arc<ArchiveRepository>,
    retention_days: u32,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    for spec in cron_specs {
        let label = spec.clone();
        let repository = repository.clone();
        let job = Job::new_async(spec.as_str(), move |_id, _l| {
            let repository = repository.clone();
            let cron_label = label.clone();
            Box::pin(async move {
                let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
                match repository.purge_older_than(cutoff).await {
                    Ok(removed) => tracing::info!(
                        target: "scheduler",
                        cron = %cron_label,
                        removed,
                        "archive retention purge finished"
                    ),
                    Err(err) => tracing::error!(
                        target: "scheduler",
                        cron = %cron_label,
                        error = %err,
                        "archive retention purge failed"
                    ),
                }
            })
        })?;
        scheduler.add(job).await?;
        tracing::info!(target: "scheduler", cron = %spec, "retention purge registered");
    }
    scheduler.start().await?;
    Ok(scheduler)
}
