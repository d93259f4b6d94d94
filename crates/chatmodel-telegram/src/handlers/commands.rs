use chatmodel_core::{config::Config, domain::InboundMessage};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn help_text(cfg: &Config) -> String {
    let mut out = String::from(
        "I'm a chat bot backed by a language model.\n\n\
         /clear - forget our conversation so far\n\
         /help - show this message",
    );
    if let Some(prefix) = cfg.trigger.prefix.as_deref().filter(|p| !p.is_empty()) {
        out.push_str(&format!("\n\nStart your message with \"{prefix}\" to talk to me."));
    }
    if cfg.usage_limit.enabled {
        out.push_str(&format!(
            "\n\nEach user can send {} messages per day.",
            cfg.usage_limit.max_messages_per_user
        ));
    }
    out
}

/// Handle a bot command. Resolves to `true` when the message was claimed.
pub async fn handle_command(msg: &InboundMessage, state: &AppState) -> bool {
    if !msg.content.trim_start().starts_with('/') {
        return false;
    }
    let (cmd, _args) = parse_command(&msg.content);

    let reply = match cmd.as_str() {
        "clear" | "reset" => match state.handler.clear_context(&msg.user_id).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                tracing::error!(user = %msg.user_id, error = %e, "failed to clear context");
                format!("Sorry, I couldn't clear the conversation: {e}")
            }
        },
        "help" | "start" => help_text(&state.cfg),
        _ => return false,
    };

    if let Err(e) = state.replies.send_text(&msg.channel_id, &reply).await {
        tracing::warn!(channel = %msg.channel_id, error = %e, "failed to send command reply");
    }
    true
}
