use std::path::PathBuf;

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{InputFile, ParseMode},
    ApiError, RequestError,
};
use thiserror::Error;

use crate::config::AppConfig;

/// A file to send alongside a notification.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Telegram(#[from] RequestError),
    #[error("recipient unavailable: {0}")]
    Unavailable(String),
}

impl DeliveryError {
    /// Separates recipients that refuse bot messages from transport failures.
    fn from_direct(err: RequestError) -> Self {
        match err {
            RequestError::Api(
                api @ (ApiError::BotBlocked
                | ApiError::CantInitiateConversation
                | ApiError::UserDeactivated
                | ApiError::ChatNotFound),
            ) => DeliveryError::Unavailable(api.to_string()),
            other => DeliveryError::Telegram(other),
        }
    }
}

/// Outbound transport for job results.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Private message to the requesting user.
    async fn send_direct(
        &self,
        user: UserId,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), DeliveryError>;

    /// Post into the chat the request came from.
    async fn send_to_chat(
        &self,
        chat: ChatId,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), DeliveryError>;
}

pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), DeliveryError> {
        match attachment {
            Some(file) => {
                let document =
                    InputFile::file(file.path.clone()).file_name(file.file_name.clone());
                self.bot
                    .send_document(chat, document)
                    .caption(text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
            None => {
                self.bot
                    .send_message(chat, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_direct(
        &self,
        user: UserId,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), DeliveryError> {
        match self.send(ChatId::from(user), text, attachment).await {
            Err(DeliveryError::Telegram(err)) => Err(DeliveryError::from_direct(err)),
            other => other,
        }
    }

    async fn send_to_chat(
        &self,
        chat: ChatId,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<(), DeliveryError> {
        self.send(chat, text, attachment).await
    }
}

/// Sends a message to the configured admin group, logging a warning on failure.
pub async fn notify_admin_group(bot: &Bot, config: &AppConfig, text: &str) {
    if let Some(admin_group_id) = config.admin_group_id {
        if admin_group_id == 0 {
            return;
        }
        if let Err(err) = bot
            .send_message(ChatId(admin_group_id), text)
            .parse_mode(ParseMode::Html)
            .await
        {
            tracing::warn!(
                target: "telegram",
                error = %err,
                admin_group_id,
                "failed to send admin notification"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_or_unreachable_users_are_unavailable() {
        for api in [
            ApiError::BotBlocked,
            ApiError::CantInitiateConversation,
            ApiError::UserDeactivated,
            ApiError::ChatNotFound,
        ] {
            let err = DeliveryError::from_direct(RequestError::Api(api));
            assert!(matches!(err, DeliveryError::Unavailable(_)), "{err}");
        }
    }

    #[test]
    fn other_failures_stay_transport_errors() {
        let err = DeliveryError::from_direct(RequestError::Api(ApiError::MessageTextIsEmpty));
        assert!(matches!(err, DeliveryError::Telegram(_)));
    }
}
