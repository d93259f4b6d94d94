use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use chrono::NaiveTime;

use crate::{errors::Error, model::types::ModelType, Result};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant chatting with users of a \
messaging app. Keep answers concise and friendly.";

/// Typed configuration for the middleware.
///
/// Loaded from the environment (plus an optional `.env` file). Immutable once
/// built; pieces of it are handed to the components that need them.
#[derive(Clone, Debug)]
pub struct Config {
    pub model: ModelSettings,
    pub system_prompt: String,
    /// User/assistant pairs retained per user.
    pub context_size: usize,
    pub response_timeout: Duration,
    pub trigger: TriggerSettings,
    pub show_thinking_message: bool,
    pub failed_turn_policy: FailedTurnPolicy,
    pub usage_limit: UsageLimitSettings,

    // Host / storage
    pub telegram_bot_token: Option<String>,
    pub data_file: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ModelSettings {
    pub model_type: ModelType,
    pub api_key: String,
    pub api_endpoint: Option<String>,
    pub model_name: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Name of a registered custom adapter (only with `ModelType::Custom`).
    pub custom_adapter: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TriggerSettings {
    /// Acceptance probability in percent, 0..=100.
    pub ratio: f64,
    pub prefix: Option<String>,
    pub private: bool,
    pub group: bool,
}

#[derive(Clone, Debug)]
pub struct UsageLimitSettings {
    pub enabled: bool,
    pub max_messages_per_user: u32,
    /// Accepted for compatibility; resets happen on calendar-date change only.
    pub reset_time: NaiveTime,
}

/// What happens to the user turn when the model call fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailedTurnPolicy {
    /// Persist nothing; the stored context is left as it was before the call.
    Discard,
    /// Persist the unanswered user turn; the next message is merged into it.
    Keep,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            ratio: 100.0,
            prefix: None,
            private: true,
            group: true,
        }
    }
}

impl Default for UsageLimitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_messages_per_user: 50,
            reset_time: NaiveTime::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup (environment, map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Lookup(&lookup);

        // Model
        let model_type = match env.str("MODEL_TYPE") {
            Some(raw) => raw.parse::<ModelType>()?,
            None => ModelType::OpenAi,
        };
        let custom_adapter = env.str("CUSTOM_MODEL_ADAPTER");
        if model_type == ModelType::Custom && custom_adapter.is_none() {
            return Err(Error::Config(
                "CUSTOM_MODEL_ADAPTER is required when MODEL_TYPE=custom".to_string(),
            ));
        }

        let api_key = env.str("API_KEY").unwrap_or_default();
        if api_key.is_empty() && model_type != ModelType::Custom {
            return Err(Error::Config(
                "API_KEY environment variable is required".to_string(),
            ));
        }

        let temperature = env.f64("TEMPERATURE")?.unwrap_or(0.7);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::Config(format!(
                "TEMPERATURE must be between 0 and 2, got {temperature}"
            )));
        }

        let max_tokens = env.u64("MAX_TOKENS")?.unwrap_or(1024);
        if max_tokens == 0 || max_tokens > u64::from(u32::MAX) {
            return Err(Error::Config(format!(
                "MAX_TOKENS must be a positive 32-bit value, got {max_tokens}"
            )));
        }

        let model = ModelSettings {
            model_type,
            api_key,
            api_endpoint: env.str("API_ENDPOINT"),
            model_name: env.str("MODEL_NAME"),
            temperature: temperature as f32,
            max_tokens: max_tokens as u32,
            custom_adapter,
        };

        // Conversation
        let system_prompt = env
            .str("SYSTEM_PROMPT")
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let context_size = env.u64("CONTEXT_SIZE")?.unwrap_or(10) as usize;

        let timeout_secs = env.u64("RESPONSE_TIMEOUT")?.unwrap_or(60);
        if timeout_secs == 0 {
            return Err(Error::Config(
                "RESPONSE_TIMEOUT must be at least 1 second".to_string(),
            ));
        }
        let response_timeout = Duration::from_secs(timeout_secs);

        let failed_turn_policy = match env.str("FAILED_TURN_POLICY").as_deref() {
            None | Some("discard") => FailedTurnPolicy::Discard,
            Some("keep") => FailedTurnPolicy::Keep,
            Some(other) => {
                return Err(Error::Config(format!(
                    "FAILED_TURN_POLICY must be `discard` or `keep`, got `{other}`"
                )))
            }
        };

        // Trigger
        let defaults = TriggerSettings::default();
        let ratio = env.f64("TRIGGER_RATIO")?.unwrap_or(defaults.ratio);
        if !(0.0..=100.0).contains(&ratio) {
            return Err(Error::Config(format!(
                "TRIGGER_RATIO must be between 0 and 100, got {ratio}"
            )));
        }
        let trigger = TriggerSettings {
            ratio,
            prefix: env.str("TRIGGER_PREFIX"),
            private: env.bool("TRIGGER_PRIVATE")?.unwrap_or(defaults.private),
            group: env.bool("TRIGGER_GROUP")?.unwrap_or(defaults.group),
        };

        // Usage limits
        let defaults = UsageLimitSettings::default();
        let reset_time = match env.str("USAGE_LIMIT_RESET_TIME") {
            Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|e| {
                Error::Config(format!("USAGE_LIMIT_RESET_TIME must be HH:MM ({raw}): {e}"))
            })?,
            None => defaults.reset_time,
        };
        let max_messages = env
            .u64("USAGE_LIMIT_MAX_MESSAGES_PER_USER")?
            .unwrap_or(u64::from(defaults.max_messages_per_user));
        let usage_limit = UsageLimitSettings {
            enabled: env.bool("USAGE_LIMIT_ENABLED")?.unwrap_or(defaults.enabled),
            max_messages_per_user: u32::try_from(max_messages).unwrap_or(u32::MAX),
            reset_time,
        };
        if usage_limit.enabled && usage_limit.reset_time != NaiveTime::default() {
            tracing::warn!(
                reset_time = %usage_limit.reset_time,
                "USAGE_LIMIT_RESET_TIME is not enforced; usage resets when the calendar date changes"
            );
        }

        Ok(Self {
            model,
            system_prompt,
            context_size,
            response_timeout,
            trigger,
            show_thinking_message: env.bool("SHOW_THINKING_MESSAGE")?.unwrap_or(false),
            failed_turn_policy,
            usage_limit,
            telegram_bot_token: env.str("TELEGRAM_BOT_TOKEN"),
            data_file: env.str("DATA_FILE").map(PathBuf::from),
        })
    }
}

struct Lookup<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Lookup<'_> {
    /// Trimmed, non-empty value.
    fn str(&self, key: &str) -> Option<String> {
        (self.0)(key).and_then(non_empty)
    }

    fn bool(&self, key: &str) -> Result<Option<bool>> {
        self.str(key)
            .map(|s| match s.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(Error::Config(format!("{key} must be true or false ({s})"))),
            })
            .transpose()
    }

    fn u64(&self, key: &str) -> Result<Option<u64>> {
        self.str(key)
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|e| Error::Config(format!("{key} must be an integer ({s}): {e}")))
            })
            .transpose()
    }

    fn f64(&self, key: &str) -> Result<Option<f64>> {
        self.str(key)
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|e| Error::Config(format!("{key} must be a number ({s}): {e}")))
            })
            .transpose()
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("API_KEY", "sk-test")]).unwrap();
        assert_eq!(cfg.model.model_type, ModelType::OpenAi);
        assert_eq!(cfg.context_size, 10);
        assert_eq!(cfg.response_timeout, Duration::from_secs(60));
        assert_eq!(cfg.trigger.ratio, 100.0);
        assert!(cfg.trigger.private && cfg.trigger.group);
        assert!(!cfg.usage_limit.enabled);
        assert_eq!(cfg.failed_turn_policy, FailedTurnPolicy::Discard);
        assert!(cfg.telegram_bot_token.is_none());
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let err = load(&[("MODEL_TYPE", "claude")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn custom_requires_an_adapter_name_but_no_key() {
        assert!(load(&[("MODEL_TYPE", "custom")]).is_err());
        let cfg = load(&[("MODEL_TYPE", "custom"), ("CUSTOM_MODEL_ADAPTER", "echo")]).unwrap();
        assert_eq!(cfg.model.custom_adapter.as_deref(), Some("echo"));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(load(&[("API_KEY", "k"), ("TEMPERATURE", "2.5")]).is_err());
        assert!(load(&[("API_KEY", "k"), ("TRIGGER_RATIO", "101")]).is_err());
        assert!(load(&[("API_KEY", "k"), ("RESPONSE_TIMEOUT", "0")]).is_err());
        assert!(load(&[("API_KEY", "k"), ("CONTEXT_SIZE", "-1")]).is_err());
        assert!(load(&[("API_KEY", "k"), ("USAGE_LIMIT_RESET_TIME", "25:00")]).is_err());
        assert!(load(&[("API_KEY", "k"), ("FAILED_TURN_POLICY", "maybe")]).is_err());
    }

    #[test]
    fn misspelled_flags_are_rejected() {
        let err = load(&[("API_KEY", "k"), ("TRIGGER_GROUP", "flase")]).unwrap_err();
        assert!(matches!(err, Error::Config(m) if m.contains("TRIGGER_GROUP")));
        assert!(load(&[("API_KEY", "k"), ("USAGE_LIMIT_ENABLED", "enabled")]).is_err());

        let cfg = load(&[
            ("API_KEY", "k"),
            ("TRIGGER_GROUP", "OFF"),
            ("TRIGGER_PRIVATE", "0"),
            ("SHOW_THINKING_MESSAGE", "Yes"),
        ])
        .unwrap();
        assert!(!cfg.trigger.group);
        assert!(!cfg.trigger.private);
        assert!(cfg.show_thinking_message);
    }

    #[test]
    fn parses_full_surface() {
        let cfg = load(&[
            ("MODEL_TYPE", "gemini"),
            ("API_KEY", "g-key"),
            ("API_ENDPOINT", "http://localhost:9000"),
            ("MODEL_NAME", "gemini-pro"),
            ("SYSTEM_PROMPT", "Be brief."),
            ("CONTEXT_SIZE", "3"),
            ("TEMPERATURE", "1.5"),
            ("RESPONSE_TIMEOUT", "15"),
            ("TRIGGER_RATIO", "25"),
            ("TRIGGER_PREFIX", "!ai"),
            ("TRIGGER_PRIVATE", "false"),
            ("TRIGGER_GROUP", "yes"),
            ("SHOW_THINKING_MESSAGE", "1"),
            ("FAILED_TURN_POLICY", "keep"),
            ("USAGE_LIMIT_ENABLED", "true"),
            ("USAGE_LIMIT_MAX_MESSAGES_PER_USER", "3"),
            ("USAGE_LIMIT_RESET_TIME", "04:30"),
            ("DATA_FILE", "/tmp/chatmodel.json"),
        ])
        .unwrap();

        assert_eq!(cfg.model.model_type, ModelType::Gemini);
        assert_eq!(cfg.model.api_endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(cfg.model.model_name.as_deref(), Some("gemini-pro"));
        assert_eq!(cfg.system_prompt, "Be brief.");
        assert_eq!(cfg.context_size, 3);
        assert!((cfg.model.temperature - 1.5).abs() < f32::EPSILON);
        assert_eq!(cfg.response_timeout, Duration::from_secs(15));
        assert_eq!(cfg.trigger.ratio, 25.0);
        assert_eq!(cfg.trigger.prefix.as_deref(), Some("!ai"));
        assert!(!cfg.trigger.private);
        assert!(cfg.trigger.group);
        assert!(cfg.show_thinking_message);
        assert_eq!(cfg.failed_turn_policy, FailedTurnPolicy::Keep);
        assert!(cfg.usage_limit.enabled);
        assert_eq!(cfg.usage_limit.max_messages_per_user, 3);
        assert_eq!(
            cfg.usage_limit.reset_time,
            NaiveTime::from_hms_opt(4, 30, 0).unwrap()
        );
        assert_eq!(cfg.data_file, Some(PathBuf::from("/tmp/chatmodel.json")));
    }
}
