//! Telegram Bot API gateways.
//!
//! Both gateways share one [`BotClient`] that calls `sendMessage`. A user
//! is messaged through their private chat; a channel post is a message to
//! the channel's chat ID, which requires the bot to be a channel admin.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::gateway::{DispatchError, NotificationGateway, PostingGateway, PublishedPost};
use crate::domain::{ChannelId, UserId};

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    result: Option<SentMessage>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Minimal Bot API client.
#[derive(Debug, Clone)]
pub struct BotClient {
    http: Client,
    endpoint: String,
}

impl BotClient {
    /// Creates a client for `token` against `api_base`
    /// (normally `https://api.telegram.org`).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Setup`] if the HTTP client cannot be built.
    pub fn new(api_base: &str, token: &str) -> Result<Self, DispatchError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DispatchError::Setup(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/bot{token}", api_base.trim_end_matches('/')),
        })
    }

    /// Sends `text` to `chat_id` and returns the message ID.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Transport`] on network errors, `429` and `5xx`.
    /// - [`DispatchError::Rejected`] when the Bot API answers `ok: false`.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, DispatchError> {
        let response = self
            .http
            .post(format!("{}/sendMessage", self.endpoint))
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(DispatchError::Transport(format!("bot api returned {status}")));
        }

        let body: BotResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Transport(e.without_url().to_string()))?;
        match (body.ok, body.result) {
            (true, Some(sent)) => Ok(sent.message_id),
            (true, None) => Err(DispatchError::Transport(
                "bot api returned no message".to_string(),
            )),
            (false, _) => Err(DispatchError::Rejected(
                body.description.unwrap_or_else(|| status.to_string()),
            )),
        }
    }
}

/// Notifies users through their private chat with the bot.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Arc<BotClient>,
}

impl TelegramNotifier {
    /// Wraps a shared client.
    #[must_use]
    pub fn new(client: Arc<BotClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationGateway for TelegramNotifier {
    async fn notify(&self, user_id: UserId, text: &str) -> Result<(), DispatchError> {
        self.client.send_message(user_id.get(), text).await.map(|_| ())
    }
}

/// Publishes creatives as channel messages.
#[derive(Debug, Clone)]
pub struct TelegramPoster {
    client: Arc<BotClient>,
}

impl TelegramPoster {
    /// Wraps a shared client.
    #[must_use]
    pub fn new(client: Arc<BotClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PostingGateway for TelegramPoster {
    async fn publish(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> Result<PublishedPost, DispatchError> {
        let message_id = self.client.send_message(channel_id.get(), content).await?;
        Ok(PublishedPost {
            message_id: Some(message_id),
            posted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_embeds_token() {
        let Ok(client) = BotClient::new("https://api.telegram.org/", "123:abc") else {
            panic!("client should build");
        };
        assert_eq!(client.endpoint, "https://api.telegram.org/bot123:abc");
        assert!(!DispatchError::Setup("tls".into()).is_retryable());
    }

    #[test]
    fn bot_error_body_parses() {
        let body: Result<BotResponse, _> = serde_json::from_str(
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        );
        assert!(matches!(
            body,
            Ok(BotResponse { ok: false, result: None, description: Some(_) })
        ));
    }

    #[test]
    fn bot_success_body_parses() {
        let body: Result<BotResponse, _> = serde_json::from_str(
            r#"{"ok":true,"result":{"message_id":42,"chat":{"id":-100}}}"#,
        );
        assert!(matches!(
            body,
            Ok(BotResponse { ok: true, result: Some(SentMessage { message_id: 42 }), .. })
        ));
    }
}
