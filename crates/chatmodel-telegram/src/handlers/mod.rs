//! Telegram update handlers.
//!
//! Commands are tried first; anything they don't claim goes through the chat
//! handler (trigger gate, usage limit, model turn).

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use chatmodel_core::domain::{ChannelId, InboundMessage, UserId};

use crate::router::AppState;

mod commands;

pub async fn handle_message(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(from) = msg.from() else {
        return Ok(());
    };

    let inbound = InboundMessage {
        user_id: UserId(from.id.0.to_string()),
        channel_id: ChannelId(msg.chat.id.0.to_string()),
        bot_id: state.bot_id.clone(),
        content: text.to_string(),
    };

    let guard = state.user_locks.lock_user(&inbound.user_id).await;

    let earlier = commands::handle_command(&inbound, &state);
    match state
        .handler
        .handle(&inbound, earlier, state.replies.as_ref())
        .await
    {
        Ok(outcome) => {
            tracing::debug!(user = %inbound.user_id, ?outcome, "message handled");
        }
        Err(e) => {
            tracing::error!(
                user = %inbound.user_id,
                channel = %inbound.channel_id,
                error = %e,
                "failed to handle message"
            );
        }
    }

    state.user_locks.release(&inbound.user_id, guard).await;
    Ok(())
}
