//! Anthropic messages API client.

use crate::{require_api_key, ChunkStream, Provider, ProviderError};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use lumen_types::{CompletionRequest, Message, ModelInfo, ProviderConfig, RequestId, Role};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn base_url(config: &ProviderConfig) -> String {
        config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    /// Anthropic only accepts user/assistant roles; tool results travel as
    /// user turns with a marker prefix.
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

    fn build_body(request: &CompletionRequest, stream: bool) -> Value {
        let mut body = serde_json::json!({
            "model": request.model_id,
            "messages": Self::convert_messages(&request.messages),
            "max_tokens": request.options.max_tokens,
            "temperature": request.options.temperature,
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let api_key = require_api_key("anthropic", &request.credentials)?;
        let url = format!("{}/v1/messages", Self::base_url(&request.credentials));
        let body = Self::build_body(request, stream);

        let _ = lumen_logging::log_request_to_file("anthropic", &url, &body, Some(api_key));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                provider: "anthropic".to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: "anthropic".to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Parse a single SSE line and return the text delta it carries, if any.
    ///
    /// `content_block_delta` carries streamed text, `content_block_start`
    /// occasionally carries an initial fragment, `message_stop` ends the
    /// stream. Everything else (ping, message_start, content_block_stop) is
    /// ignored.
    fn parse_sse_line(line: &str) -> SseEvent {
        let Some(data) = line.strip_prefix("data: ") else {
            return SseEvent::Ignore;
        };

        let Ok(json) = serde_json::from_str::<Value>(data) else {
            return SseEvent::Ignore;
        };

        match json["type"].as_str() {
            Some("content_block_delta") => {
                if let Some(text) = json["delta"]["text"].as_str() {
                    return SseEvent::Delta(text.to_string());
                }
                SseEvent::Ignore
            }
            Some("content_block_start") => {
                if let Some(text) = json["content_block"]["text"].as_str() {
                    if !text.is_empty() {
                        return SseEvent::Delta(text.to_string());
                    }
                }
                SseEvent::Ignore
            }
            Some("message_stop") => SseEvent::Done,
            Some("error") => {
                let message = json["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error")
                    .to_string();
                SseEvent::Error(message)
            }
            _ => SseEvent::Ignore,
        }
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

enum SseEvent {
    Delta(String),
    Done,
    Error(String),
    Ignore,
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    async fn list_models(&self, config: &ProviderConfig) -> Result<Vec<ModelInfo>, ProviderError> {
        let api_key = require_api_key("anthropic", config)?;
        let url = format!("{}/v1/models", Self::base_url(config));

        let response = self
            .client
            .get(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                provider: "anthropic".to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: "anthropic".to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                provider: "anthropic".to_string(),
                message: e.to_string(),
            })?;

        let data = body["data"]
            .as_array()
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: "anthropic".to_string(),
                message: "missing 'data' array".to_string(),
            })?;

        Ok(data
            .iter()
            .filter_map(|item| {
                let id = item["id"].as_str()?;
                let mut info = ModelInfo::new(id);
                if let Some(name) = item["display_name"].as_str() {
                    info.display_name = name.to_string();
                }
                Some(info)
            })
            .collect())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let response = self.send(request, false).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                provider: "anthropic".to_string(),
                message: e.to_string(),
            })?;

        let content = body["content"]
            .as_array()
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: "anthropic".to_string(),
                message: "missing 'content' array".to_string(),
            })?;

        let mut text = String::new();
        for item in content {
            if item["type"] == "text" {
                if let Some(fragment) = item["text"].as_str() {
                    text.push_str(fragment);
                }
            }
        }
        Ok(text)
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChunkStream, ProviderError> {
        let response = self.send(request, true).await?;
        let request_id = request.id;
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
                                    SseEvent::Delta(delta) => {
                                        yield Ok(delta_chunk(request_id, delta));
                                    }
                                    SseEvent::Done => return,
                                    SseEvent::Error(message) => {
                                        yield Err(ProviderError::Stream {
                                            provider: "anthropic".to_string(),
                                            message,
                                        });
                                        return;
                                    }
                                    SseEvent::Ignore => {}
                                }
                            } else {
                                line_buffer.push(ch);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(ProviderError::Stream {
                            provider: "anthropic".to_string(),
                            message: e.to_string(),
                        });
                        return;
                    }
                }
            }

            // Trailing data without a final newline.
            if !line_buffer.is_empty() {
                if let SseEvent::Delta(delta) = Self::parse_sse_line(&line_buffer) {
                    yield Ok(delta_chunk(request_id, delta));
                }
            }
        };

        Ok(Box::new(Box::pin(stream)))
    }
}

fn delta_chunk(request_id: RequestId, delta: String) -> lumen_types::StreamChunk {
    lumen_types::StreamChunk { request_id, delta }
}
