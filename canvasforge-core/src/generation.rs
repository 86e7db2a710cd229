//! Text-to-UI generation collaborator.

use crate::error::ProviderError;
use canvasforge_tree::GenerationPayload;
use std::future::Future;

/// Turns a prompt into components, layout and per-component details.
pub trait GenerationProvider: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<GenerationPayload, ProviderError>> + Send;
}

/// Replays one fixed payload regardless of prompt. Useful offline and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    payload: GenerationPayload,
}

impl StaticProvider {
    pub fn new(payload: GenerationPayload) -> Self {
        Self { payload }
    }

    pub fn from_json(json: &str) -> Result<Self, ProviderError> {
        serde_json::from_str(json)
            .map(Self::new)
            .map_err(|e| ProviderError(format!("invalid generation payload: {}", e)))
    }
}

impl GenerationProvider for StaticProvider {
    async fn generate(&self, prompt: &str) -> Result<GenerationPayload, ProviderError> {
        tracing::debug!(prompt, components = self.payload.components.len(), "replaying static payload");
        Ok(self.payload.clone())
    }
}
