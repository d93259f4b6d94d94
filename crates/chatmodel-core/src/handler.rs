use std::{future::Future, sync::Arc};

use crate::{
    config::{Config, FailedTurnPolicy},
    context_store::ContextStore,
    conversation::{self, ConversationTurn},
    domain::{InboundMessage, UserId},
    errors::Error,
    messaging::port::ReplyPort,
    model::client::ModelAdapter,
    trigger::{self, RejectReason, TriggerDecision},
    usage::UsageLimiter,
    Result,
};

pub const THINKING_TEXT: &str = "Thinking...";
pub const CLEARED_TEXT: &str = "Your conversation history has been cleared.";

/// What the middleware did with one inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum HandleOutcome {
    /// An earlier handler already answered it.
    Consumed,
    /// The trigger gate declined it.
    Skipped(RejectReason),
    /// The user is out of messages for today; a notice was sent.
    LimitReached,
    /// A reply (model answer or apology) was sent.
    Replied(String),
}

/// Orchestrates one conversational turn: context, model call, persistence.
pub struct ChatHandler {
    cfg: Arc<Config>,
    adapter: Arc<dyn ModelAdapter>,
    contexts: ContextStore,
    usage: UsageLimiter,
}

impl ChatHandler {
    pub fn new(
        cfg: Arc<Config>,
        adapter: Arc<dyn ModelAdapter>,
        contexts: ContextStore,
        usage: UsageLimiter,
    ) -> Self {
        Self {
            cfg,
            adapter,
            contexts,
            usage,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Middleware entry point for a message no command claimed.
    ///
    /// `next` resolves to `true` when an earlier handler consumed the message.
    pub async fn handle<N>(
        &self,
        msg: &InboundMessage,
        next: N,
        replies: &dyn ReplyPort,
    ) -> Result<HandleOutcome>
    where
        N: Future<Output = bool> + Send,
    {
        if next.await {
            return Ok(HandleOutcome::Consumed);
        }

        let content = match trigger::should_trigger(msg, &self.cfg.trigger) {
            TriggerDecision::Accept(content) => content,
            TriggerDecision::Reject(reason) => return Ok(HandleOutcome::Skipped(reason)),
        };

        let allowed = match self
            .usage
            .check_and_consume(&msg.user_id, &self.cfg.usage_limit)
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!(user = %msg.user_id, error = %e, "usage check failed");
                let text = apology(&e);
                replies.send_text(&msg.channel_id, &text).await?;
                return Ok(HandleOutcome::Replied(text));
            }
        };
        if !allowed {
            let notice = limit_notice(self.cfg.usage_limit.max_messages_per_user);
            replies.send_text(&msg.channel_id, &notice).await?;
            return Ok(HandleOutcome::LimitReached);
        }

        if self.cfg.show_thinking_message {
            if let Err(e) = replies.send_text(&msg.channel_id, THINKING_TEXT).await {
                tracing::warn!(channel = %msg.channel_id, error = %e, "failed to send thinking message");
            }
        }

        let reply = self.respond(&msg.user_id, &content).await;
        replies.send_text(&msg.channel_id, &reply).await?;
        Ok(HandleOutcome::Replied(reply))
    }

    /// Run one turn and return the text to show the user.
    ///
    /// Never fails: model and storage errors become an apology.
    pub async fn respond(&self, user_id: &UserId, content: &str) -> String {
        match self.converse(user_id, content).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    user = %user_id,
                    error = %e,
                    provider_failure = e.is_provider_failure(),
                    "turn failed"
                );
                apology(&e)
            }
        }
    }

    async fn converse(&self, user_id: &UserId, content: &str) -> Result<String> {
        let mut turns = self.contexts.load(user_id).await?;
        conversation::push_user_turn(&mut turns, content);
        let evicted = conversation::enforce_cap(&mut turns, self.cfg.context_size);
        conversation::ensure_system_prompt(&mut turns, &self.cfg.system_prompt);

        tracing::debug!(
            user = %user_id,
            turns = turns.len(),
            evicted,
            model_type = %self.adapter.model_type(),
            "invoking model"
        );

        // Whichever finishes first wins; on timeout the request future is dropped.
        let timeout = self.cfg.response_timeout;
        let result = match tokio::time::timeout(
            timeout,
            self.adapter.generate_response(&turns, &user_id.0),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout.as_secs())),
        };

        match result {
            Ok(reply) => {
                turns.push(ConversationTurn::assistant(reply.clone()));
                conversation::enforce_cap(&mut turns, self.cfg.context_size);
                self.contexts.save(user_id, &turns).await?;
                Ok(reply)
            }
            Err(e) => {
                if self.cfg.failed_turn_policy == FailedTurnPolicy::Keep {
                    self.keep_unanswered(user_id, &turns).await;
                }
                Err(e)
            }
        }
    }

    /// Persist a window ending in an unanswered user turn, unless it would not
    /// fit the cap (only possible with `context_size == 0`).
    async fn keep_unanswered(&self, user_id: &UserId, turns: &[ConversationTurn]) {
        if turns.len() > conversation::max_len(self.cfg.context_size) {
            tracing::debug!(user = %user_id, turns = turns.len(), "unanswered turn does not fit window; discarding");
            return;
        }
        if let Err(e) = self.contexts.save(user_id, turns).await {
            tracing::warn!(user = %user_id, error = %e, "failed to keep unanswered turn");
        }
    }

    /// The clear-context command.
    pub async fn clear_context(&self, user_id: &UserId) -> Result<String> {
        self.contexts.clear(user_id).await?;
        tracing::info!(user = %user_id, "context cleared");
        Ok(CLEARED_TEXT.to_string())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.adapter.dispose().await
    }
}

fn apology(err: &Error) -> String {
    format!("Sorry, I couldn't come up with a reply: {err}")
}

fn limit_notice(max: u32) -> String {
    format!("You have used all {max} messages for today. Please try again tomorrow.")
}
