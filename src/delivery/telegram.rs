use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument, trace};

use crate::config::TelegramConfig;

use super::{MessageFormat, NotificationChannel, SendError};

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API `sendMessage`
///
/// The request URL carries the bot token, so it never appears in errors or
/// debug output.
#[derive(Clone)]
pub struct TelegramChannel {
    client: Client,
    url: String,
    chat_id: String,
}

impl fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            url: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        }
    }
}

fn classify(status: StatusCode, description: String) -> SendError {
    if description.to_lowercase().contains("can't parse entities") {
        return SendError::FormattingRejected(description);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => SendError::Transient(description),
        s if s.is_server_error() => SendError::Transient(format!("{s}: {description}")),
        s => SendError::Permanent(format!("{s}: {description}")),
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    #[instrument(skip(self, text), fields(len = text.chars().count()))]
    async fn send(&self, text: &str, format: MessageFormat) -> Result<(), SendError> {
        let message = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: match format {
                MessageFormat::Markdown => Some("Markdown"),
                MessageFormat::Plain => None,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| SendError::Transient(e.without_url().to_string()))?;

        let status = response.status();
        let body: ApiResponse = response.json().await.unwrap_or_default();

        if status.is_success() && body.ok {
            trace!("telegram accepted message");
            return Ok(());
        }

        let description = body
            .description
            .unwrap_or_else(|| "no description".to_string());
        error!("Telegram message failed with status {status}: {description}");
        Err(classify(status, description))
    }
}
