//! OpenAI-compatible chat completions client.
//!
//! Covers the hosted key-based backend ("openai") and, parameterized with
//! no key requirement, the locally reachable inference server (see
//! [`crate::local`]). The wire format is the `/v1/chat/completions` +
//! `/v1/models` shape most inference servers speak.

use crate::{require_api_key, ChunkStream, Provider, ProviderError};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use lumen_types::{CompletionRequest, Message, ModelInfo, ProviderConfig, Role, StreamChunk};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiCompatProvider {
    provider_id: &'static str,
    default_base_url: &'static str,
    needs_key: bool,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new() -> Self {
        Self::with_endpoint("openai", DEFAULT_BASE_URL, true)
    }

    pub(crate) fn with_endpoint(
        provider_id: &'static str,
        default_base_url: &'static str,
        needs_key: bool,
    ) -> Self {
        Self {
            provider_id,
            default_base_url,
            needs_key,
            client: reqwest::Client::new(),
        }
    }

    fn base_url(&self, config: &ProviderConfig) -> String {
        config
            .base_url
            .as_deref()
            .unwrap_or(self.default_base_url)
            .trim_end_matches('/')
            .to_string()
    }

    fn api_key<'a>(&self, config: &'a ProviderConfig) -> Result<Option<&'a str>, ProviderError> {
        if self.needs_key {
            require_api_key(self.provider_id, config).map(Some)
        } else {
            Ok(config.api_key.as_deref().filter(|k| !k.is_empty()))
        }
    }

    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let (role, content) = match msg.role {
                    Role::Assistant => ("assistant", msg.content.clone()),
                    Role::User => ("user", msg.content.clone()),
                    Role::ToolResult => ("user", format!("Tool result:\n{}", msg.content)),
                };
                serde_json::json!({ "role": role, "content": content })
            })
            .collect()
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let api_key = self.api_key(&request.credentials)?;
        let url = format!("{}/v1/chat/completions", self.base_url(&request.credentials));

        let mut body = serde_json::json!({
            "model": request.model_id,
            "messages": Self::convert_messages(&request.messages),
            "max_tokens": request.options.max_tokens,
            "temperature": request.options.temperature,
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }

        let _ = lumen_logging::log_request_to_file(self.provider_id, &url, &body, api_key);

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                provider: self.provider_id.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: self.provider_id.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Parse one `data: {json}` SSE line. `[DONE]` ends the stream; lines
    /// that are not data lines or do not parse carry nothing.
    fn parse_sse_line(line: &str) -> Option<SseEvent> {
        let data = line.strip_prefix("data: ")?;
        if data.trim() == "[DONE]" {
            return Some(SseEvent::Done);
        }
        let json = serde_json::from_str::<Value>(data).ok()?;
        let choice = json["choices"].get(0)?;
        if let Some(text) = choice["delta"]["content"].as_str() {
            if !text.is_empty() {
                return Some(SseEvent::Delta(text.to_string()));
            }
        }
        if choice["finish_reason"].as_str().is_some() {
            return Some(SseEvent::Done);
        }
        None
    }
}

impl Default for OpenAiCompatProvider {
    fn default() -> Self {
        Self::new()
    }
}

enum SseEvent {
    Delta(String),
    Done,
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        self.provider_id
    }

    fn requires_api_key(&self) -> bool {
        self.needs_key
    }

    async fn list_models(&self, config: &ProviderConfig) -> Result<Vec<ModelInfo>, ProviderError> {
        let api_key = self.api_key(config)?;
        let url = format!("{}/v1/models", self.base_url(config));

        let mut builder = self.client.get(&url);
        if let Some(key) = api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| ProviderError::Network {
            provider: self.provider_id.to_string(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: self.provider_id.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                provider: self.provider_id.to_string(),
                message: e.to_string(),
            })?;

        let data = body["data"]
            .as_array()
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: self.provider_id.to_string(),
                message: "missing 'data' array".to_string(),
            })?;

        Ok(data
            .iter()
            .filter_map(|item| item["id"].as_str())
            .map(ModelInfo::new)
            .collect())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let response = self.send(request, false).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                provider: self.provider_id.to_string(),
                message: e.to_string(),
            })?;

        body["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: self.provider_id.to_string(),
                message: "no choices in response".to_string(),
            })
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChunkStream, ProviderError> {
        let response = self.send(request, true).await?;
        let request_id = request.id;
        let provider_id = self.provider_id;
        let byte_stream = response.bytes_stream();

        let stream = stream! {
            let mut byte_stream = byte_stream;
            let mut line_buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        let chunk_str = String::from_utf8_lossy(&chunk);
                        for ch in chunk_str.chars() {
                            if ch == '\n' {
                                let line = std::mem::take(&mut line_buffer);
                                match Self::parse_sse_line(&line) {
                                    Some(SseEvent::Delta(delta)) => {
                                        yield Ok(StreamChunk { request_id, delta });
                                    }
                                    Some(SseEvent::Done) => return,
                                    None => {}
                                }
                            } else {
                                line_buffer.push(ch);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(ProviderError::Stream {
                            provider: provider_id.to_string(),
                            message: e.to_string(),
                        });
                        return;
                    }
                }
            }

            if !line_buffer.is_empty() {
                if let Some(SseEvent::Delta(delta)) = Self::parse_sse_line(&line_buffer) {
                    yield Ok(StreamChunk { request_id, delta });
                }
            }
        };

        Ok(Box::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_line_yields_text() {
        let line = r#"data: {"choices":[{"delta":{"content":"lo"},"finish_reason":null}]}"#;
        match OpenAiCompatProvider::parse_sse_line(line) {
            Some(SseEvent::Delta(text)) => assert_eq!(text, "lo"),
            _ => panic!("expected a delta"),
        }
    }

    #[test]
    fn done_marker_ends_stream() {
        assert!(matches!(
            OpenAiCompatProvider::parse_sse_line("data: [DONE]"),
            Some(SseEvent::Done)
        ));
        let finished = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert!(matches!(
            OpenAiCompatProvider::parse_sse_line(finished),
            Some(SseEvent::Done)
        ));
    }

    #[test]
    fn non_data_lines_carry_nothing() {
        assert!(OpenAiCompatProvider::parse_sse_line(": keep-alive").is_none());
        assert!(OpenAiCompatProvider::parse_sse_line("data: {broken").is_none());
        assert!(OpenAiCompatProvider::parse_sse_line("").is_none());
    }
}
