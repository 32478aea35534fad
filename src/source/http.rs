use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::AUTHORIZATION, Client, Response};
use serde::Deserialize;

use crate::config::SourceConfig;

use super::{MessageSource, RawMessage, SourceError};

/// REST client for a Discord-compatible channel message API.
#[derive(Clone)]
pub struct HttpMessageSource {
    http: Client,
    config: SourceConfig,
}

impl HttpMessageSource {
    pub fn new(http: Client, config: SourceConfig) -> Self {
        Self { http, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, SourceError> {
        let response = self
            .http
            .get(self.endpoint(path))
            .header(AUTHORIZATION, format!("Bot {}", self.config.api_token))
            .query(query)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn fetch_page(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<RawMessage>, SourceError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }

        let response = self
            .get(&format!("channels/{channel_id}/messages"), &query)
            .await?;
        let page: Vec<ApiMessage> = response.json().await?;

        tracing::trace!(
            target: "source",
            channel_id,
            before,
            received = page.len(),
            "page received"
        );
        Ok(page.into_iter().map(RawMessage::from).collect())
    }

    async fn resolve_guild(&self, channel_id: &str) -> Result<Option<String>, SourceError> {
        let response = self.get(&format!("channels/{channel_id}"), &[]).await?;
        let channel: ApiChannel = response.json().await?;
        Ok(channel.guild_id)
    }
}

#[derive(Debug, Deserialize)]
struct ApiChannel {
    guild_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    #[serde(default)]
    content: String,
    timestamp: DateTime<Utc>,
    author: ApiAuthor,
}

#[derive(Debug, Deserialize)]
struct ApiAuthor {
    id: String,
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
    #[serde(default)]
    bot: bool,
}

impl ApiAuthor {
    fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(disc) if disc != "0" => format!("{}#{}", self.username, disc),
            _ => self.username.clone(),
        }
    }
}

impl From<ApiMessage> for RawMessage {
    fn from(msg: ApiMessage) -> Self {
        Self {
            author_name: msg.author.tag(),
            id: msg.id,
            author_id: msg.author.id,
            is_automated: msg.author.bot,
            content: msg.content,
            timestamp: msg.timestamp,
        }
    }
}
