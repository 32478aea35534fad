use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono_tz::Tz;
use reqwest::Client;
use teloxide::prelude::*;
use tokio::time::{sleep, timeout};
use tokio_cron_scheduler::JobScheduler;

use crate::{
    config::AppConfig,
    db::{self, ArchiveRepository},
    infrastructure::{
        directories::ResolvedPaths,
        notifier::{notify_admin_group, TelegramNotifier},
        shutdown::Shutdown,
    },
    source::{HttpMessageSource, MessageSource},
    tasks::{
        dispatcher::Dispatcher, export::Exporter, fetcher::PaginatedFetcher,
        pipeline::ArchivePipeline, scheduler::configure_purge_jobs,
    },
    telegram::TelegramService,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ArchiverApp {
    _paths: ResolvedPaths,
    scheduler: Option<JobScheduler>,
    dispatcher: Arc<Dispatcher>,
    telegram: TelegramService,
    repository: Arc<ArchiveRepository>,
    shutdown: Shutdown,
    config: Arc<AppConfig>,
    bot: Bot,
}

impl ArchiverApp {
    pub async fn initialize(
        config: AppConfig,
        paths: ResolvedPaths,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| anyhow!("invalid timezone {}", config.timezone))?;

        let pool = db::init_pool(&paths.db_path).await?;
        let repository = Arc::new(ArchiveRepository::new(pool));

        let http_client = Client::builder()
            .user_agent(format!("channel-archiver/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let source: Arc<dyn MessageSource> = Arc::new(HttpMessageSource::new(
            http_client,
            config.source.clone(),
        ));

        let bot = Bot::new(&config.telegram_bot_token);
        let notifier = Arc::new(TelegramNotifier::new(bot.clone()));

        let pipeline = ArchivePipeline::new(
            PaginatedFetcher::new(source.clone(), config.source.page_size),
            repository.clone(),
            notifier,
            Exporter::new(&paths.exports_dir),
            config.archive.retain_records,
            timezone,
        );
        let dispatcher = Dispatcher::new(pipeline, shutdown.subscribe());

        let telegram = TelegramService::new(bot.clone(), dispatcher.clone(), source);

        let scheduler = if config.archive.retain_records {
            Some(
                configure_purge_jobs(
                    &config.archive.purge_crons,
                    repository.clone(),
                    config.archive.retention_days,
                )
                .await?,
            )
        } else {
            None
        };

        Ok(Self {
            _paths: paths,
            scheduler,
            dispatcher,
            telegram,
            repository,
            shutdown,
            config,
            bot,
        })
    }

    pub async fn run(self) -> Result<()> {
        let ArchiverApp {
            _paths: _,
            scheduler,
            dispatcher,
            telegram,
            repository,
            shutdown,
            config,
            bot,
        } = self;

        tracing::info!(target: "lifecycle", "channel archiver started");
        notify_admin_group(&bot, config.as_ref(), "Channel archiver started.").await;

        let mut shutdown_listener = shutdown.subscribe();
        let mut telegram_future = Box::pin(telegram.run(shutdown.subscribe()));
        let mut telegram_completed = false;

        tokio::select! {
            _ = shutdown_listener.notified() => {
                tracing::info!(target: "lifecycle", "shutdown signal received");
            }
            res = &mut telegram_future => {
                telegram_completed = true;
                if let Err(err) = res {
                    tracing::error!(target: "telegram", ?err, "Telegram dispatcher failed");
                } else {
                    tracing::info!(target: "telegram", "Telegram dispatcher stopped");
                }
            }
        }

        shutdown.trigger();

        if !telegram_completed {
            match timeout(SHUTDOWN_TIMEOUT, &mut telegram_future).await {
                Ok(Err(err)) => {
                    tracing::error!(target: "telegram", ?err, "Telegram dispatcher failed while stopping");
                }
                Ok(Ok(())) => {}
                Err(_) => tracing::warn!(
                    target: "telegram",
                    "Telegram dispatcher did not stop within {:?}; forcing exit",
                    SHUTDOWN_TIMEOUT
                ),
            }
        }

        if let Some(mut scheduler) = scheduler {
            match timeout(SHUTDOWN_TIMEOUT, scheduler.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(target: "scheduler", ?err, "scheduler shutdown failed"),
                Err(_) => tracing::warn!(
                    target: "scheduler",
                    "scheduler did not stop within {:?}",
                    SHUTDOWN_TIMEOUT
                ),
            }
        }

        if timeout(SHUTDOWN_TIMEOUT, wait_until_idle(&dispatcher))
            .await
            .is_err()
        {
            tracing::warn!(
                target: "dispatcher",
                "running archive job did not finish within {:?}; abandoning it",
                SHUTDOWN_TIMEOUT
            );
        }

        if timeout(SHUTDOWN_TIMEOUT, repository.close()).await.is_err() {
            tracing::warn!(
                target: "db",
                "archive store did not close within {:?}",
                SHUTDOWN_TIMEOUT
            );
        }

        tracing::info!(target: "lifecycle", "channel archiver stopped");
        notify_admin_group(&bot, config.as_ref(), "Channel archiver stopped.").await;
        Ok(())
    }
}

async fn wait_until_idle(dispatcher: &Dispatcher) {
    while dispatcher.snapshot().busy {
        sleep(IDLE_POLL_INTERVAL).await;
    }
}
