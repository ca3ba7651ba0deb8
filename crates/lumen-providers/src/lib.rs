//! Provider Adapter: N distinct AI backends behind one capability pair.
//!
//! Every provider can enumerate models and run a (possibly streamed)
//! completion given messages + credentials + options. Concrete providers
//! differ only in endpoint shape, auth header construction, and response
//! parsing, never in the call contract.

pub mod anthropic;
pub mod local;
pub mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use local::LocalProvider;
pub use openai_compat::OpenAiCompatProvider;

use async_trait::async_trait;
use futures::Stream;
use lumen_types::{CompletionRequest, ModelInfo, ModelList, ProviderConfig, StreamChunk};
use std::sync::Arc;
use thiserror::Error;

/// Errors a provider call can produce. `MissingCredential` is raised
/// before any network traffic so it stays distinguishable from auth
/// rejections by the remote end.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no API key configured for provider '{0}'")]
    MissingCredential(String),
    #[error("request to {provider} failed: {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },
    #[error("stream error from {provider}: {message}")]
    Stream { provider: String, message: String },
}

/// Ordered stream of text fragments for one request.
pub type ChunkStream = Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send + Unpin>;

/// Unified capability interface over all AI backends.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider id ("anthropic", "openai", "local").
    fn id(&self) -> &str;

    /// Whether this provider needs an API key at all. Locally reachable
    /// servers do not.
    fn requires_api_key(&self) -> bool;

    /// Enumerate the models this backend offers.
    async fn list_models(&self, config: &ProviderConfig) -> Result<Vec<ModelInfo>, ProviderError>;

    /// Single-shot completion: full assistant text in one reply.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    /// Streamed completion: ordered chunks tagged with the request id.
    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChunkStream, ProviderError>;
}

/// Resolve a provider id to its implementation.
pub fn provider_for(provider_id: &str) -> Option<Arc<dyn Provider>> {
    match provider_id {
        "anthropic" => Some(Arc::new(AnthropicProvider::new())),
        "openai" => Some(Arc::new(OpenAiCompatProvider::new())),
        "local" => Some(Arc::new(LocalProvider::new())),
        _ => None,
    }
}

/// All registered provider ids, in panel display order.
pub fn provider_ids() -> &'static [&'static str] {
    &["anthropic", "openai", "local"]
}

/// Model listing with every failure folded into the result shape.
///
/// Network errors, malformed bodies, and auth rejections all come back as
/// `{ success: false, error }`; nothing here ever throws into the Mode
/// Controller or the panel.
pub async fn list_models_normalized(provider_id: &str, config: &ProviderConfig) -> ModelList {
    let provider = match provider_for(provider_id) {
        Some(p) => p,
        None => return ModelList::failed(format!("unknown provider '{}'", provider_id)),
    };
    match provider.list_models(config).await {
        Ok(models) => ModelList::ok(models),
        Err(e) => ModelList::failed(e.to_string()),
    }
}

/// Fail fast when a key-requiring provider has no key configured.
pub(crate) fn require_api_key<'a>(
    provider_id: &str,
    config: &'a ProviderConfig,
) -> Result<&'a str, ProviderError> {
    config
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ProviderError::MissingCredential(provider_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_provider_id_is_a_failed_list() {
        let out = list_models_normalized("replicant", &ProviderConfig::default()).await;
        assert!(!out.success);
        assert!(out.models.is_empty());
        assert!(out.error.unwrap().contains("replicant"));
    }

    #[tokio::test]
    async fn missing_key_fails_fast_without_network() {
        let provider = AnthropicProvider::new();
        let err = provider
            .list_models(&ProviderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential(_)));
    }

    #[test]
    fn factory_resolves_registered_ids() {
        for id in provider_ids() {
            let provider = provider_for(id).unwrap();
            assert_eq!(provider.id(), *id);
        }
        assert!(provider_for("nonesuch").is_none());
    }

    #[test]
    fn only_local_provider_skips_key_requirement() {
        assert!(AnthropicProvider::new().requires_api_key());
        assert!(OpenAiCompatProvider::new().requires_api_key());
        assert!(!LocalProvider::new().requires_api_key());
    }
}
