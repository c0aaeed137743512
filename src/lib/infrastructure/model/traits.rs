//! Model traits

use super::types::{GenerationResult, GenerationStream, ModelError, ModelRequest};
use async_trait::async_trait;

/// Trait for individual model clients
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Get the client ID
    fn id(&self) -> &str;

    /// Whether `chat_stream` yields output incrementally.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Send a chat request and wait for the settled answer
    async fn chat(&self, request: ModelRequest) -> Result<GenerationResult, ModelError>;

    /// Send a chat request and receive partial answers as they arrive
    async fn chat_stream(&self, _request: ModelRequest) -> Result<GenerationStream, ModelError> {
        Err(ModelError::StreamingUnsupported {
            provider: self.id().to_string(),
        })
    }
}
