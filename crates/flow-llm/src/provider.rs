use async_trait::async_trait;
use flow_core::{GenerationError, GenerationRequest, GenerationResult};

pub type Result<T, E = GenerationError> = std::result::Result<T, E>;

/// An external text-generation service.
///
/// Implementations receive the bare model id (namespace already stripped by
/// the router) and must not retry on their own.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Stable provider name used for routing and error reports (`gemini`, `openai`).
    fn name(&self) -> &str;

    /// Whether `GenerationOptions::search_enabled` can be honored.
    fn supports_search(&self) -> bool {
        false
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult>;
}
