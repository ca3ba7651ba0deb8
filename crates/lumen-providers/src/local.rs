//! Locally reachable inference server (llama.cpp / Ollama style).
//!
//! Speaks the same OpenAI-compatible wire format as the hosted backend but
//! requires no API key: `list_models` is attempted with whatever config is
//! present, so an unconfigured panel can still discover a local server.

use crate::{ChunkStream, OpenAiCompatProvider, Provider, ProviderError};
use async_trait::async_trait;
use lumen_types::{CompletionRequest, ModelInfo, ProviderConfig};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

pub struct LocalProvider {
    inner: OpenAiCompatProvider,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self {
            inner: OpenAiCompatProvider::with_endpoint("local", DEFAULT_BASE_URL, false),
        }
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn id(&self) -> &str {
        "local"
    }

    fn requires_api_key(&self) -> bool {
        false
    }

    async fn list_models(&self, config: &ProviderConfig) -> Result<Vec<ModelInfo>, ProviderError> {
        self.inner.list_models(config).await
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.inner.complete(request).await
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChunkStream, ProviderError> {
        self.inner.complete_streaming(request).await
    }
}
