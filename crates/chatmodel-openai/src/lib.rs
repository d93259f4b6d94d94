//! OpenAI adapter (chat completions).
//!
//! Sends the canonical turn sequence unchanged to `POST {endpoint}/chat/completions`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chatmodel_core::{
    conversation::ConversationTurn,
    errors::Error,
    model::{
        client::ModelAdapter,
        http,
        types::{AdapterConfig, ModelType, BLOCKED_RESPONSE_TEXT},
    },
    Result,
};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const PROVIDER: &str = "openai";

#[derive(Debug, Serialize, PartialEq)]
pub struct WireMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Clone, Debug)]
pub struct OpenAiAdapter {
    cfg: AdapterConfig,
    url: String,
    model: String,
    http: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(cfg: AdapterConfig) -> Result<Self> {
        cfg.require_api_key(PROVIDER)?;
        let url = format!("{}/chat/completions", cfg.endpoint_or(DEFAULT_ENDPOINT));
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

/// OpenAI accepts system/user/assistant roles directly.
pub fn format_messages(turns: &[ConversationTurn]) -> Vec<WireMessage<'_>> {
    turns
        .iter()
        .map(|t| WireMessage {
            role: t.role.as_str(),
            content: &t.content,
        })
        .collect()
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn model_type(&self) -> ModelType {
        ModelType::OpenAi
    }

    async fn generate_response(&self, turns: &[ConversationTurn], caller: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: format_messages(turns),
            temperature: self.cfg.temperature,
            max_tokens: self.cfg.max_tokens,
            user: (!caller.is_empty()).then_some(caller),
        };

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(self.cfg.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_send_error(PROVIDER, e, self.cfg.timeout))?;

        let text = http::read_body(PROVIDER, resp, self.cfg.timeout).await?;
        let parsed: ChatResponse = http::decode(PROVIDER, &text)?;
        extract_reply(parsed)
    }
}

fn extract_reply(resp: ChatResponse) -> Result<String> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidResponse(format!("{PROVIDER}: no choices in response")))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        tracing::warn!(provider = PROVIDER, "response blocked by content filter");
        return Ok(BLOCKED_RESPONSE_TEXT.to_string());
    }

    let content = choice
        .message
        .and_then(|m| m.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if content.is_empty() {
        return Err(Error::InvalidResponse(format!(
            "{PROVIDER}: empty message content"
        )));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter_for(server: &MockServer) -> OpenAiAdapter {
        OpenAiAdapter::new(AdapterConfig {
            api_key: "sk-test".to_string(),
            api_endpoint: Some(format!("{}/v1/", server.uri())),
            model_name: None,
            temperature: 0.3,
            max_tokens: 64,
            ..AdapterConfig::default()
        })
        .unwrap()
    }

    fn turns() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::system("be brief"),
            ConversationTurn::user("hi"),
        ]
    }

    #[test]
    fn format_messages_passes_turns_through() {
        let t = vec![
            ConversationTurn::system("S"),
            ConversationTurn::user("u1"),
            ConversationTurn::assistant("a1"),
            ConversationTurn::user("u2"),
        ];
        let wire = format_messages(&t);
        assert_eq!(wire.len(), 4);
        assert_eq!(
            wire[0],
            WireMessage {
                role: "system",
                content: "S"
            }
        );
        assert_eq!(wire[2].role, "assistant");
        assert_eq!(wire[3].content, "u2");
    }

    #[test]
    fn missing_key_fails_at_construction() {
        let err = OpenAiAdapter::new(AdapterConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn returns_trimmed_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": DEFAULT_MODEL,
                "max_tokens": 64,
                "user": "u1",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "  hello!\n"},
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = adapter_for(&server)
            .generate_response(&turns(), "u1")
            .await
            .unwrap();
        assert_eq!(reply, "hello!");
    }

    #[tokio::test]
    async fn content_filter_maps_to_blocked_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": null},
                    "finish_reason": "content_filter"
                }]
            })))
            .mount(&server)
            .await;

        let reply = adapter_for(&server)
            .generate_response(&turns(), "u1")
            .await
            .unwrap();
        assert_eq!(reply, BLOCKED_RESPONSE_TEXT);
    }

    #[tokio::test]
    async fn rate_limit_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit reached", "type": "requests"}
            })))
            .mount(&server)
            .await;

        let err = adapter_for(&server)
            .generate_response(&turns(), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited));
    }

    #[tokio::test]
    async fn exhausted_quota_is_not_a_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "message": "You exceeded your current quota, please check your plan and billing details.",
                    "type": "insufficient_quota",
                    "code": "insufficient_quota"
                }
            })))
            .mount(&server)
            .await;

        let err = adapter_for(&server)
            .generate_response(&turns(), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded(m) if m.contains("exceeded your current quota")));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(json!({
                        "choices": [{"message": {"content": "late"}, "finish_reason": "stop"}]
                    })),
            )
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new(AdapterConfig {
            api_key: "sk-test".to_string(),
            api_endpoint: Some(format!("{}/v1/", server.uri())),
            timeout: Duration::from_millis(200),
            ..AdapterConfig::default()
        })
        .unwrap();

        let err = adapter.generate_response(&turns(), "u1").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_provider_failure());
    }

    #[tokio::test]
    async fn bad_key_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}
            })))
            .mount(&server)
            .await;

        let err = adapter_for(&server)
            .generate_response(&turns(), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(m) if m.contains("Incorrect API key")));
    }

    #[tokio::test]
    async fn malformed_payloads_are_invalid_responses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = adapter_for(&server)
            .generate_response(&turns(), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = adapter_for(&server)
            .generate_response(&turns(), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }
}
