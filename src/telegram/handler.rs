use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use teloxide::{
    dispatching::Dispatcher,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    requests::Requester as _,
    types::{Message, ParseMode},
    update_listeners,
    utils::command::BotCommands,
};

use crate::{
    domain::{Job, Requester},
    infrastructure::shutdown::ShutdownListener,
    source::MessageSource,
    tasks::{dispatcher::Dispatcher as JobDispatcher, summary::escape_html},
};

use super::{
    types::{AppState, BotResult, GeneralCommand},
    utils::{format_user_display, parse_archive_args, ArchiveArgs, ARCHIVE_USAGE},
};

/// Guild placeholder for channels that do not belong to one.
const DIRECT_GUILD: &str = "@me";

pub struct TelegramService {
    bot: Bot,
    state: Arc<AppState>,
}

impl TelegramService {
    pub fn new(
        bot: Bot,
        dispatcher: Arc<JobDispatcher>,
        source: Arc<dyn MessageSource>,
    ) -> Self {
        let state = Arc::new(AppState {
            dispatcher,
            source,
        });
        Self { bot, state }
    }

    pub async fn run(&self, mut shutdown: ShutdownListener) -> Result<()> {
        self.sync_commands().await?;
        let me = self.bot.get_me().await?;
        tracing::info!(
            target: "telegram",
            bot_id = me.id.0,
            username = ?me.username,
            "connected to Telegram"
        );

        let handler = Update::filter_message().branch(
            dptree::entry()
                .filter_command::<GeneralCommand>()
                .endpoint(Self::on_command),
        );

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![self.state.clone()])
            .default_handler(|update| async move {
                tracing::debug!(target: "telegram", ?update, "unhandled update");
            })
            .build();

        let listener = update_listeners::polling_default(self.bot.clone()).await;
        let error_handler = LoggingErrorHandler::with_custom_text("update listener error");

        let shutdown_token = dispatcher.shutdown_token();
        let mut dispatcher_future =
            Box::pin(dispatcher.dispatch_with_listener(listener, error_handler));
        let mut dispatcher_finished = false;

        tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!(target: "telegram", "stopping Telegram dispatcher");
                if let Ok(wait) = shutdown_token.shutdown() {
                    wait.await;
                }
            }
            _ = &mut dispatcher_future => {
                dispatcher_finished = true;
                tracing::info!(target: "telegram", "Telegram dispatcher finished");
            }
        }

        if !dispatcher_finished {
            dispatcher_future.await;
        }

        Ok(())
    }

    async fn on_command(
        bot: Bot,
        msg: Message,
        cmd: GeneralCommand,
        state: Arc<AppState>,
    ) -> BotResult<()> {
        match cmd {
            GeneralCommand::Start => {
                bot.send_message(
                    msg.chat.id,
                    "Hi! I archive channel histories into JSON files.\nSend /help to see how.",
                )
                .await?;
            }
            GeneralCommand::Help => {
                bot.send_message(msg.chat.id, ARCHIVE_USAGE)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
            GeneralCommand::Status => {
                let snapshot = state.dispatcher.snapshot();
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "Archiver status\n- running: {}\n- waiting: {}",
                        if snapshot.busy { "yes" } else { "no" },
                        snapshot.queued
                    ),
                )
                .await?;
            }
            GeneralCommand::Archive(args) => {
                Self::on_archive(&bot, &msg, &args, &state).await?;
            }
        }
        Ok(())
    }

    async fn on_archive(
        bot: &Bot,
        msg: &Message,
        raw_args: &str,
        state: &AppState,
    ) -> BotResult<()> {
        let now = Utc::now();
        let ArchiveArgs {
            channel_id,
            limit,
            window,
        } = match parse_archive_args(raw_args, now) {
            Ok(args) => args,
            Err(err) => {
                bot.send_message(
                    msg.chat.id,
                    format!("{}\n\n{}", escape_html(&err.to_string()), ARCHIVE_USAGE),
                )
                .parse_mode(ParseMode::Html)
                .await?;
                return Ok(());
            }
        };

        let Some(from) = msg.from.as_ref() else {
            bot.send_message(msg.chat.id, "Archive requests must come from a user.")
                .await?;
            return Ok(());
        };

        let guild_id = match state.source.resolve_guild(&channel_id).await {
            Ok(guild) => guild.unwrap_or_else(|| DIRECT_GUILD.to_string()),
            Err(err) => {
                tracing::warn!(
                    target: "telegram",
                    channel_id = %channel_id,
                    error = %err,
                    "failed to resolve channel"
                );
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "Could not look up channel <code>{}</code>: {}",
                        escape_html(&channel_id),
                        escape_html(&err.to_string())
                    ),
                )
                .parse_mode(ParseMode::Html)
                .await?;
                return Ok(());
            }
        };

        let requester = Requester {
            user_id: from.id,
            display: format_user_display(from),
        };
        let job = match Job::new(
            guild_id,
            channel_id,
            limit,
            window,
            requester,
            msg.chat.id,
            now,
        ) {
            Ok(job) => job,
            Err(err) => {
                bot.send_message(msg.chat.id, err.to_string()).await?;
                return Ok(());
            }
        };

        let channel = escape_html(&job.channel_id);
        let reply = match state.dispatcher.submit(job) {
            Ok(submission) if submission.started => format!(
                "Archiving channel <code>{channel}</code> now. The file will be sent to you when it is ready."
            ),
            Ok(submission) => format!(
                "Archive of channel <code>{channel}</code> queued. {} job(s) waiting.",
                submission.queued
            ),
            Err(err) => format!(
                "Archive of channel <code>{channel}</code> not accepted: {}",
                escape_html(&err.to_string())
            ),
        };
        bot.send_message(msg.chat.id, reply)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn sync_commands(&self) -> BotResult<()> {
        self.bot
            .set_my_commands(GeneralCommand::bot_commands())
            .await?;
        tracing::info!(target: "telegram", "bot commands synchronized");
        Ok(())
    }
}
