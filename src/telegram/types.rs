use std::sync::Arc;

use teloxide::utils::command::BotCommands;

use crate::{source::MessageSource, tasks::dispatcher::Dispatcher};

pub type BotResult<T> = Result<T, teloxide::RequestError>;

pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub source: Arc<dyn MessageSource>,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum GeneralCommand {
    #[command(description = "introduce the bot")]
    Start,
    #[command(description = "show archive usage")]
    Help,
    #[command(description = "show queue status")]
    Status,
    #[command(description = "archive a channel: /archive <channel_id> [limit] [start] [end]")]
    Archive(String),
}
