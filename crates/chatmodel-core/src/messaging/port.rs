use async_trait::async_trait;

use crate::{domain::ChannelId, Result};

/// Hexagonal port for sending replies into a host channel.
///
/// Telegram is the first implementation; any host that can post plain text to
/// a channel fits behind it.
#[async_trait]
pub trait ReplyPort: Send + Sync {
    async fn send_text(&self, channel: &ChannelId, text: &str) -> Result<()>;
}
