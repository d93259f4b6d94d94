//! Gemini adapter (`generateContent`).
//!
//! Gemini has no system role and expects contents to alternate user/model
//! starting with user. The system prompt is sent as a leading user turn that
//! the model "acknowledges".

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

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

const PROVIDER: &str = "gemini";
const SYSTEM_ACK: &str = "Understood. I will follow these instructions.";
const FILLER_USER: &str = "Hello.";
const BLOCKED_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST"];

#[derive(Debug, Serialize, PartialEq)]
pub struct Content<'a> {
    pub role: &'static str,
    pub parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Part<'a> {
    pub text: &'a str,
}

impl<'a> Content<'a> {
    fn new(role: &'static str, text: &'a str) -> Self {
        Self {
            role,
            parts: vec![Part { text }],
        }
    }

    pub fn text(&self) -> String {
        self.parts.iter().map(|p| p.text).collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GeminiAdapter {
    cfg: AdapterConfig,
    url: String,
    http: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(cfg: AdapterConfig) -> Result<Self> {
        cfg.require_api_key(PROVIDER)?;
        let url = format!(
            "{}/models/{}:generateContent",
            cfg.endpoint_or(DEFAULT_ENDPOINT),
            cfg.model_or(DEFAULT_MODEL)
        );
        let http = http::build_client(cfg.timeout)?;
        Ok(Self { cfg, url, http })
    }
}

/// Map canonical turns onto Gemini `contents`.
///
/// Any role other than user becomes `model`. The result always starts with a
/// user entry.
pub fn format_contents(turns: &[ConversationTurn]) -> Vec<Content<'_>> {
    let mut contents = Vec::with_capacity(turns.len() + 2);
    for turn in turns {
        match turn.role {
            Role::System => {
                contents.push(Content::new("user", &turn.content));
                contents.push(Content::new("model", SYSTEM_ACK));
            }
            Role::User => contents.push(Content::new("user", &turn.content)),
            _ => contents.push(Content::new("model", &turn.content)),
        }
    }

    if contents.first().map(|c| c.role) != Some("user") {
        contents.insert(0, Content::new("user", FILLER_USER));
    }
    contents
}

#[async_trait]
impl ModelAdapter for GeminiAdapter {
    fn model_type(&self) -> ModelType {
        ModelType::Gemini
    }

    async fn generate_response(&self, turns: &[ConversationTurn], caller: &str) -> Result<String> {
        // Gemini has no per-request end-user field.
        tracing::debug!(provider = PROVIDER, caller, turns = turns.len(), "generating");

        let body = GenerateRequest {
            contents: format_contents(turns),
            generation_config: GenerationConfig {
                temperature: self.cfg.temperature,
                max_output_tokens: self.cfg.max_tokens,
            },
        };

        let resp = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", self.cfg.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_send_error(PROVIDER, e, self.cfg.timeout))?;

        let text = http::read_body(PROVIDER, resp, self.cfg.timeout).await?;
        let parsed: GenerateResponse = http::decode(PROVIDER, &text)?;
        extract_reply(parsed)
    }
}

fn extract_reply(resp: GenerateResponse) -> Result<String> {
    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        tracing::warn!(provider = PROVIDER, reason = %reason, "prompt blocked");
        return Ok(BLOCKED_RESPONSE_TEXT.to_string());
    }

    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidResponse(format!("{PROVIDER}: no candidates in response")))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKED_FINISH_REASONS.contains(&reason) {
            tracing::warn!(provider = PROVIDER, reason, "response blocked");
            return Ok(BLOCKED_RESPONSE_TEXT.to_string());
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidResponse(format!(
            "{PROVIDER}: candidate has no text"
        )));
    }
    Ok(text.to_string())
}
