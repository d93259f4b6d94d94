//! Anthropic adapter (Messages API).
//!
//! The system turn travels in the top-level `system` field; the remaining turns
//! are sent as `user`/`assistant` messages to `POST {endpoint}/messages`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chatmodel_core::{
    conversation::{ConversationTurn, Role},
    errors::Error,
    model::{
        client::ModelAdapter,
        http,
        types::{AdapterConfig, ModelType, BLOCKED_RESPONSE_TEXT},
    },
    Result,
};

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
pub const API_VERSION: &str = "2023-06-01";

const PROVIDER: &str = "anthropic";

#[derive(Debug, Serialize, PartialEq)]
pub struct WireMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata<'a>>,
}

#[derive(Debug, Serialize)]
struct Metadata<'a> {
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AnthropicAdapter {
    cfg: AdapterConfig,
    url: String,
    model: String,
    http: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(cfg: AdapterConfig) -> Result<Self> {
        cfg.require_api_key(PROVIDER)?;
        let url = format!("{}/messages", cfg.endpoint_or(DEFAULT_ENDPOINT));
        let model = cfg.model_or(DEFAULT_MODEL);
        let http = http::build_client(cfg.timeout)?;
        Ok(Self {
            cfg,
            url,
            model,
            http,
        })
    }
}

/// Split out the system prompt; fold every other role into user/assistant.
pub fn format_messages(turns: &[ConversationTurn]) -> (Option<String>, Vec<WireMessage<'_>>) {
    let mut system: Vec<&str> = Vec::new();
    let mut messages = Vec::with_capacity(turns.len());

    for turn in turns {
        match turn.role {
            Role::System => system.push(&turn.content),
            Role::Assistant => messages.push(WireMessage {
                role: "assistant",
                content: &turn.content,
            }),
            _ => messages.push(WireMessage {
                role: "user",
                content: &turn.content,
            }),
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, messages)
}

#[async_trait]
impl ModelAdapter for AnthropicAdapter {
    fn model_type(&self) -> ModelType {
        ModelType::Claude
    }

    async fn generate_response(&self, turns: &[ConversationTurn], caller: &str) -> Result<String> {
        let (system, messages) = format_messages(turns);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.cfg.max_tokens,
            temperature: self.cfg.temperature,
            system,
            messages,
            metadata: (!caller.is_empty()).then_some(Metadata { user_id: caller }),
        };

        let resp = self
            .http
            .post(&self.url)
            .header("x-api-key", self.cfg.api_key.trim())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_send_error(PROVIDER, e, self.cfg.timeout))?;

        let text = http::read_body(PROVIDER, resp, self.cfg.timeout).await?;
        let parsed: MessagesResponse = http::decode(PROVIDER, &text)?;
        extract_reply(parsed)
    }
}

fn extract_reply(resp: MessagesResponse) -> Result<String> {
    if resp.stop_reason.as_deref() == Some("refusal") {
        tracing::warn!(provider = PROVIDER, "response blocked by safety refusal");
        return Ok(BLOCKED_RESPONSE_TEXT.to_string());
    }

    let text: String = resp
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidResponse(format!(
            "{PROVIDER}: no text content in response"
        )));
    }
    Ok(text.to_string())
}
