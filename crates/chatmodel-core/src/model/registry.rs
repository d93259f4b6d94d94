use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::{config::ModelSettings, errors::Error, Result};

use super::{
    client::ModelAdapter,
    types::{AdapterConfig, ModelType},
};

/// Builds an adapter from its immutable configuration.
pub type AdapterFactory =
    Arc<dyn Fn(AdapterConfig) -> Result<Arc<dyn ModelAdapter>> + Send + Sync>;

/// Explicit registration point for model adapters.
///
/// The built-in providers are registered by the embedding program; anything
/// else is a named custom adapter selected with `CUSTOM_MODEL_ADAPTER`.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    builtin: HashMap<ModelType, AdapterFactory>,
    custom: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_builtin<F>(&mut self, model_type: ModelType, factory: F) -> &mut Self
    where
        F: Fn(AdapterConfig) -> Result<Arc<dyn ModelAdapter>> + Send + Sync + 'static,
    {
        self.builtin.insert(model_type, Arc::new(factory));
        self
    }

    pub fn register_custom<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(AdapterConfig) -> Result<Arc<dyn ModelAdapter>> + Send + Sync + 'static,
    {
        self.custom.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn custom_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.custom.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Build the adapter selected by `settings`.
    pub fn resolve(
        &self,
        settings: &ModelSettings,
        timeout: Duration,
    ) -> Result<Arc<dyn ModelAdapter>> {
        let factory = match settings.model_type {
            ModelType::Custom => {
                let name = settings.custom_adapter.as_deref().ok_or_else(|| {
                    Error::Config("custom model type requires CUSTOM_MODEL_ADAPTER".to_string())
                })?;
                self.custom.get(name).ok_or_else(|| {
                    Error::Config(format!(
                        "no custom adapter registered as `{name}` (known: {})",
                        self.custom_names().join(", ")
                    ))
                })?
            }
            other => self.builtin.get(&other).ok_or_else(|| {
                Error::Config(format!("no adapter registered for model type `{other}`"))
            })?,
        };

        let adapter = factory(AdapterConfig::from_settings(settings, timeout))?;
        tracing::info!(model_type = %settings.model_type, "model adapter ready");
        Ok(adapter)
    }
}
