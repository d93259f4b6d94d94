//! Telegram adapter (teloxide).
//!
//! This crate implements the `chatmodel-core` ReplyPort over the Telegram Bot
//! API and feeds text messages into the chat handler.

use async_trait::async_trait;

use teloxide::prelude::*;

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use chatmodel_core::{domain::ChannelId, errors::Error, messaging::port::ReplyPort, Result};

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(channel: &ChannelId) -> Result<teloxide::types::ChatId> {
        channel
            .0
            .parse::<i64>()
            .map(teloxide::types::ChatId)
            .map_err(|_| Error::Messaging(format!("not a telegram chat id: {channel}")))
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Messaging(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl ReplyPort for TelegramMessenger {
    async fn send_text(&self, channel: &ChannelId, text: &str) -> Result<()> {
        let chat_id = Self::tg_chat(channel)?;
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.with_retry(|| self.bot.send_message(chat_id, chunk.clone()))
                .await?;
        }
        Ok(())
    }
}

/// Split `text` into chunks of at most `limit` characters, preferring line
/// boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len <= limit {
            current.push_str(line);
            current_len = line_len;
            continue;
        }

        // Hard-split a single overlong line.
        let chars: Vec<char> = line.chars().collect();
        for piece in chars.chunks(limit) {
            if piece.len() == limit {
                chunks.push(piece.iter().collect());
            } else {
                current = piece.iter().collect();
                current_len = piece.len();
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
