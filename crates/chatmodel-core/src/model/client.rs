use async_trait::async_trait;

use crate::{conversation::ConversationTurn, Result};

use super::types::ModelType;

/// A provider-specific translator between the canonical turn sequence and one
/// provider's wire protocol.
///
/// Implementations issue exactly one request per call (no retries) and keep
/// provider quirks (system prompt placement, role names, auth headers, finish
/// reasons) out of the message handler.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    fn model_type(&self) -> ModelType;

    /// Send `turns` to the provider and return the trimmed reply text.
    ///
    /// `caller` identifies the end user for provider-side abuse tracking.
    async fn generate_response(&self, turns: &[ConversationTurn], caller: &str) -> Result<String>;

    /// Release held resources. Most adapters have nothing to release.
    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}
