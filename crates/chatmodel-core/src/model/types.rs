use std::{fmt, str::FromStr, time::Duration};

use crate::{config::ModelSettings, errors::Error, Result};

/// Fixed reply used when a provider blocks a response for safety reasons.
pub const BLOCKED_RESPONSE_TEXT: &str =
    "Sorry, I can't help with that request because it was blocked by the model's content filter.";

/// Default per-request timeout applied by adapters.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The provider backend selected by `MODEL_TYPE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelType {
    OpenAi,
    Claude,
    Gemini,
    Custom,
}

impl ModelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::OpenAi => "openai",
            ModelType::Claude => "claude",
            ModelType::Gemini => "gemini",
            ModelType::Custom => "custom",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ModelType::OpenAi),
            "claude" | "anthropic" => Ok(ModelType::Claude),
            "gemini" => Ok(ModelType::Gemini),
            "custom" => Ok(ModelType::Custom),
            other => Err(Error::Config(format!(
                "unknown MODEL_TYPE `{other}` (expected openai, claude, gemini or custom)"
            ))),
        }
    }
}

/// Settings one adapter instance is built with. Never mutated afterwards.
#[derive(Clone, Debug)]
pub struct AdapterConfig {
    pub api_key: String,
    /// Base URL override; each provider has its own default.
    pub api_endpoint: Option<String>,
    /// Model override; each provider has its own default.
    pub model_name: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl AdapterConfig {
    pub fn from_settings(settings: &ModelSettings, timeout: Duration) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            api_endpoint: settings.api_endpoint.clone(),
            model_name: settings.model_name.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout,
        }
    }

    /// Fails fast when no API key was configured.
    pub fn require_api_key(&self, provider: &str) -> Result<&str> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(Error::Config(format!("{provider} adapter requires an API key")));
        }
        Ok(key)
    }

    /// Endpoint with trailing slashes removed, or the provider default.
    pub fn endpoint_or(&self, default: &str) -> String {
        self.api_endpoint
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn model_or(&self, default: &str) -> String {
        self.model_name
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_endpoint: None,
            model_name: None,
            temperature: 0.7,
            max_tokens: 1024,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_types() {
        assert_eq!("OpenAI".parse::<ModelType>().unwrap(), ModelType::OpenAi);
        assert_eq!("claude".parse::<ModelType>().unwrap(), ModelType::Claude);
        assert_eq!(" gemini ".parse::<ModelType>().unwrap(), ModelType::Gemini);
        assert!("llama".parse::<ModelType>().is_err());
    }

    #[test]
    fn blank_key_is_rejected() {
        let cfg = AdapterConfig {
            api_key: "   ".to_string(),
            ..AdapterConfig::default()
        };
        assert!(matches!(cfg.require_api_key("openai"), Err(Error::Config(_))));
    }

    #[test]
    fn endpoint_defaults_and_trims() {
        let mut cfg = AdapterConfig::default();
        assert_eq!(cfg.endpoint_or("https://x/v1"), "https://x/v1");
        cfg.api_endpoint = Some("http://localhost:8080/".to_string());
        assert_eq!(cfg.endpoint_or("https://x/v1"), "http://localhost:8080");
    }
}
