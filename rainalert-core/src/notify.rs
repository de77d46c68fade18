use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt::Debug;
use tracing::instrument;

use crate::provider::truncate_body;

const TELEGRAM_BASE_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotifyError {
    #[error("network error while sending notification: {0}")]
    Network(String),
    #[error("messaging channel rejected credentials: {0}")]
    AuthFailure(String),
    #[error("messaging channel refused the message: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        // The URL contains the bot token.
        NotifyError::Network(err.without_url().to_string())
    }
}

/// Delivers rendered text to the user.
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Sends through the Telegram Bot API `sendMessage` method.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    http: Client,
    base_url: String,
}

// Keep the bot token out of logs.
impl Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("chat_id", &self.chat_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String, http: Client) -> Self {
        Self {
            bot_token,
            chat_id,
            http,
            base_url: TELEGRAM_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(bot_token: &str, chat_id: &str, base_url: &str) -> Self {
        Self {
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            http: Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);

        let res = self
            .http
            .post(&url)
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "Markdown"),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        let parsed = serde_json::from_str::<TelegramResponse>(&body).ok();
        let detail = parsed
            .as_ref()
            .and_then(|r| r.description.clone())
            .unwrap_or_else(|| truncate_body(&body));

        // Telegram answers 404 for an unknown bot token.
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
            return Err(NotifyError::AuthFailure(detail));
        }

        match parsed {
            Some(TelegramResponse { ok: true, .. }) if status.is_success() => {
                tracing::info!("notification sent");
                Ok(())
            }
            _ => Err(NotifyError::Rejected(format!("{status}: {detail}"))),
        }
    }
}

/// Writes the message to stdout instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        println!("{text}");
        Ok(())
    }
}
