//! In-order delivery of report chunks
//!
//! Each chunk goes through the [`RetryPolicy`]. A channel that rejects the
//! rich formatting gets the same chunk once more as plain text. The first chunk
//! that cannot be delivered stops the run: later chunks are never sent ahead of
//! an earlier one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use crate::retry::RetryPolicy;

pub mod telegram;

pub use telegram::TelegramChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    Markdown,
    Plain,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SendError {
    /// The channel could not parse the rich formatting
    #[error("formatting rejected: {0}")]
    FormattingRejected(String),
    /// Network trouble or rate limiting, worth another try
    #[error("transient send failure: {0}")]
    Transient(String),
    #[error("send failed: {0}")]
    Permanent(String),
}

impl SendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::Transient(_))
    }
}

/// Where reports end up
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, text: &str, format: MessageFormat) -> Result<(), SendError>;
}

/// Prints chunks to stdout instead of sending them
#[derive(Debug, Default)]
pub struct ConsoleChannel;

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    async fn send(&self, text: &str, _format: MessageFormat) -> Result<(), SendError> {
        println!("{text}");
        println!("----");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub delivered: usize,
    pub total: usize,
    /// Why delivery stopped early
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn is_complete(&self) -> bool {
        self.delivered == self.total
    }
}

pub struct Deliverer {
    channel: Arc<dyn NotificationChannel>,
    retry: RetryPolicy,
    chunk_delay: Duration,
}

impl Deliverer {
    pub fn new(channel: Arc<dyn NotificationChannel>, retry: RetryPolicy, chunk_delay: Duration) -> Self {
        Self {
            channel,
            retry,
            chunk_delay,
        }
    }

    async fn send_with_retry(&self, chunk: &str, format: MessageFormat) -> Result<(), SendError> {
        self.retry
            .run(|| self.channel.send(chunk, format), SendError::is_retryable)
            .await
    }

    async fn send_chunk(&self, chunk: &str) -> Result<(), SendError> {
        match self.send_with_retry(chunk, MessageFormat::Markdown).await {
            Err(SendError::FormattingRejected(reason)) => {
                warn!("markdown rejected ({reason}), retrying as plain text");
                self.send_with_retry(chunk, MessageFormat::Plain).await
            }
            other => other,
        }
    }

    /// Send `chunks` in order, stopping at the first chunk that cannot be
    /// delivered
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    pub async fn deliver(&self, chunks: &[String]) -> DeliveryOutcome {
        let total = chunks.len();

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }

            if let Err(e) = self.send_chunk(chunk).await {
                error!(
                    "report delivery failed at chunk {}/{total}, {index} of {total} delivered: {e}",
                    index + 1
                );
                return DeliveryOutcome {
                    delivered: index,
                    total,
                    error: Some(e.to_string()),
                };
            }
            debug!("sent chunk {}/{total}", index + 1);
        }

        info!("report delivered in {total} chunk(s)");
        DeliveryOutcome {
            delivered: total,
            total,
            error: None,
        }
    }
}
