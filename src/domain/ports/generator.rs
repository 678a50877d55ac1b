use async_trait::async_trait;

use crate::domain::errors::GenerationError;
use crate::domain::models::GenerationRequest;

/// Port for direct foundation-model invocation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Invoke `model_id` with an assembled request and return the generated
    /// text.
    async fn generate(
        &self,
        model_id: &str,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError>;
}
