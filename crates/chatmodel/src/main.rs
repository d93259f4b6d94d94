use std::sync::Arc;

use async_trait::async_trait;

use chatmodel_anthropic::AnthropicAdapter;
use chatmodel_gemini::GeminiAdapter;
use chatmodel_openai::OpenAiAdapter;

use chatmodel_core::{
    config::Config,
    context_store::ContextStore,
    conversation::{ConversationTurn, Role},
    handler::ChatHandler,
    model::{
        client::ModelAdapter,
        registry::AdapterRegistry,
        types::{AdapterConfig, ModelType},
    },
    storage::{Database, JsonFileDatabase, MemoryDatabase},
    usage::UsageLimiter,
};

/// Offline adapter that repeats the latest user turn. Select it with
/// `MODEL_TYPE=custom` and `CUSTOM_MODEL_ADAPTER=echo`.
struct EchoAdapter;

#[async_trait]
impl ModelAdapter for EchoAdapter {
    fn model_type(&self) -> ModelType {
        ModelType::Custom
    }

    async fn generate_response(
        &self,
        turns: &[ConversationTurn],
        _caller: &str,
    ) -> chatmodel_core::Result<String> {
        let last = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.trim())
            .unwrap_or_default();
        Ok(format!("echo: {last}"))
    }
}

fn registry() -> AdapterRegistry {
    let mut reg = AdapterRegistry::new();
    reg.register_builtin(ModelType::OpenAi, |cfg: AdapterConfig| {
        Ok(Arc::new(OpenAiAdapter::new(cfg)?) as Arc<dyn ModelAdapter>)
    })
    .register_builtin(ModelType::Claude, |cfg: AdapterConfig| {
        Ok(Arc::new(AnthropicAdapter::new(cfg)?) as Arc<dyn ModelAdapter>)
    })
    .register_builtin(ModelType::Gemini, |cfg: AdapterConfig| {
        Ok(Arc::new(GeminiAdapter::new(cfg)?) as Arc<dyn ModelAdapter>)
    })
    .register_custom("echo", |_cfg: AdapterConfig| {
        Ok(Arc::new(EchoAdapter) as Arc<dyn ModelAdapter>)
    });
    reg
}

#[tokio::main]
async fn main() -> Result<(), chatmodel_core::Error> {
    chatmodel_core::logging::init("chatmodel")?;

    let cfg = Arc::new(Config::load()?);
    let adapter = registry().resolve(&cfg.model, cfg.response_timeout)?;

    let db: Arc<dyn Database> = match &cfg.data_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "using json file storage");
            Arc::new(JsonFileDatabase::open(path).await?)
        }
        None => {
            tracing::warn!("DATA_FILE not set; conversation state will not survive restarts");
            Arc::new(MemoryDatabase::new())
        }
    };

    let handler = Arc::new(ChatHandler::new(
        cfg.clone(),
        adapter,
        ContextStore::new(db.clone()),
        UsageLimiter::new(db),
    ));

    let run = chatmodel_telegram::router::run_polling(cfg, handler.clone()).await;

    if let Err(e) = handler.shutdown().await {
        tracing::warn!(error = %e, "failed to dispose model adapter");
    }

    run.map_err(|e| chatmodel_core::Error::Messaging(format!("telegram bot failed: {e}")))
}
