//! Telegram Bot API messenger.
//!
//! Sends through `sendMessage` (JSON) and `sendPhoto` (multipart) to the chat configured in
//! `telegram.chat_id`. The bot token is part of every request path, so transport errors are
//! stripped of their URL before they are surfaced.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::Messenger;
use crate::config::TelegramConfig;
use crate::errors::{Error, Result};

const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramMessenger {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
    chat_id: i64,
}

impl TelegramMessenger {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let bot_token = config
            .bot_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Config {
                message: "telegram.bot_token is not set".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build Telegram HTTP client: {}", e.without_url()),
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.as_str().trim_end_matches('/').to_string(),
            bot_token,
            chat_id: config.chat_id,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    async fn execute(&self, operation: &str, request: reqwest::RequestBuilder) -> Result<()> {
        let send_error = |message: String| Error::Send {
            operation: operation.to_string(),
            message,
        };

        let response = request.send().await.map_err(|e| send_error(e.without_url().to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| send_error(e.without_url().to_string()))?;

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(reply) if reply.ok && status.is_success() => {
                tracing::debug!(status = status.as_u16(), chat_id = self.chat_id, operation, "Telegram request completed");
                Ok(())
            }
            Ok(reply) => Err(send_error(format!(
                "status {}: {}",
                status,
                reply.description.as_deref().unwrap_or("no description")
            ))),
            Err(_) => Err(send_error(format!("status {status}: unexpected response body"))),
        }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    #[tracing::instrument(skip_all, fields(text_len = text.len()))]
    async fn send_text(&self, text: &str) -> Result<()> {
        let request = self.client.post(self.method_url("sendMessage")).json(&SendMessageRequest {
            chat_id: self.chat_id,
            text,
        });

        self.execute("send text message", request).await
    }

    #[tracing::instrument(skip_all, fields(photo_len = photo.len(), display_name = %display_name))]
    async fn send_photo(&self, photo: Vec<u8>, display_name: &str) -> Result<()> {
        let part = Part::bytes(photo)
            .file_name(display_name.to_string())
            .mime_str(PHOTO_CONTENT_TYPE)
            .map_err(|e| Error::Send {
                operation: "send photo".to_string(),
                message: e.without_url().to_string(),
            })?;

        let form = Form::new().text("chat_id", self.chat_id.to_string()).part("photo", part);
        let request = self.client.post(self.method_url("sendPhoto")).multipart(form);

        self.execute("send photo", request).await
    }
}
