//! HTTP plumbing shared by the provider adapters: client construction, error
//! classification and payload decoding.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::{errors::Error, Result};

const BODY_SNIPPET_CHARS: usize = 300;

/// Phrases providers use for exhausted quota or billing, as opposed to
/// short-term rate limiting.
const QUOTA_SIGNALS: &[&str] = &[
    "insufficient_quota",
    "exceeded your current quota",
    "quota exceeded",
    "credit balance is too low",
    "billing",
];

/// Phrases providers use for a bad key on non-401 statuses.
const INVALID_KEY_SIGNALS: &[&str] = &[
    "invalid_api_key",
    "api_key_invalid",
    "api key not valid",
    "invalid x-api-key",
    "incorrect api key",
    "authentication_error",
];

pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("chatmodel/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config(format!("failed to build http client: {e}")))
}

/// Map a transport failure (no HTTP status) into the error taxonomy.
pub fn map_send_error(provider: &str, err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        return Error::Timeout(timeout.as_secs());
    }
    if err.is_decode() {
        return Error::InvalidResponse(format!("{provider}: {err}"));
    }
    Error::Provider(format!("{provider} request failed: {err}"))
}

/// Read the body of a response, classifying non-2xx statuses.
pub async fn read_body(
    provider: &str,
    resp: reqwest::Response,
    timeout: Duration,
) -> Result<String> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| map_send_error(provider, e, timeout))?;

    if !status.is_success() {
        let err = classify_failure(provider, status, &body);
        tracing::error!(
            provider,
            status = status.as_u16(),
            body = %snippet(&body),
            "model request failed"
        );
        return Err(err);
    }

    Ok(body)
}

/// Classify a non-2xx provider response.
pub fn classify_failure(provider: &str, status: StatusCode, body: &str) -> Error {
    let message = provider_message(body).unwrap_or_else(|| snippet(body));
    let haystack = body.to_lowercase();
    let has = |signals: &[&str]| signals.iter().any(|s| haystack.contains(s));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS if has(QUOTA_SIGNALS) => Error::QuotaExceeded(message),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited,
        StatusCode::PAYMENT_REQUIRED => Error::QuotaExceeded(message),
        _ if has(INVALID_KEY_SIGNALS) => Error::Unauthorized(message),
        _ if has(QUOTA_SIGNALS) => Error::QuotaExceeded(message),
        _ => Error::Provider(format!("{provider} returned {status}: {message}")),
    }
}

/// Decode a provider payload; any mismatch is an `InvalidResponse`.
pub fn decode<T: DeserializeOwned>(provider: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(provider, error = %e, body = %snippet(body), "malformed provider payload");
        Error::InvalidResponse(format!("{provider}: {e}"))
    })
}

/// `error.message` as used by OpenAI, Anthropic and Gemini error payloads.
fn provider_message(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    let err = v.get("error")?;
    err.get("message")
        .and_then(|m| m.as_str())
        .or_else(|| err.as_str())
        .map(|s| s.to_string())
}

pub fn snippet(s: &str) -> String {
    if s.chars().count() <= BODY_SNIPPET_CHARS {
        return s.to_string();
    }
    format!("{}...", s.chars().take(BODY_SNIPPET_CHARS).collect::<String>())
}
