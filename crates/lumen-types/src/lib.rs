//! Core types shared across the Lumen AI core.
//!
//! Everything that crosses a crate boundary lives here: conversation
//! messages, request identities, provider credential bags, stream chunks,
//! and tool outcomes.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Default cap on agent-loop turns for a single user-initiated task.
pub const DEFAULT_MAX_TOOL_TURNS: u32 = 25;

/// Default token budget for a completion.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// ============================================================================
// Request identity
// ============================================================================

/// Opaque unique token identifying one in-flight completion request.
///
/// Every stream event is tagged with the id of the request it belongs to;
/// receivers route (and discard stale events) by comparing identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Message roles understood by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "tool-result")]
    ToolResult,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::ToolResult => "tool-result",
        }
    }
}

/// An open-file snapshot attached to a message.
///
/// Captured at send time; never a live reference to the editor buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: String,
    pub language: String,
    pub content: String,
}

/// Helper to tolerate `null` content from loosely-behaved backends.
pub fn deserialize_string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        _ => Ok(String::new()),
    }
}

/// One conversation message. Insertion order is conversation order; the
/// core never reorders or deduplicates messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(deserialize_with = "deserialize_string_or_null", default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            role: Role::ToolResult,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

// ============================================================================
// Provider configuration and completion requests
// ============================================================================

/// Flat per-provider credential bag.
///
/// Passed by value on every call and never cached inside the core; the
/// surrounding settings subsystem owns persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            base_url: None,
        }
    }

    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: Some(url.into()),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_stream() -> bool {
    true
}

fn default_max_tool_turns() -> u32 {
    DEFAULT_MAX_TOOL_TURNS
}

/// Option bag attached to a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default = "default_max_tool_turns")]
    pub max_tool_turns: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: default_stream(),
            max_tool_turns: default_max_tool_turns(),
        }
    }
}

/// One completion request. Immutable once a session starts; the agent loop
/// creates a fresh request (with a fresh identity) for every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub id: RequestId,
    pub provider_id: String,
    pub model_id: String,
    pub messages: Vec<Message>,
    pub credentials: ProviderConfig,
    pub options: CompletionOptions,
}

impl CompletionRequest {
    pub fn new(
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
        messages: Vec<Message>,
        credentials: ProviderConfig,
        options: CompletionOptions,
    ) -> Self {
        Self {
            id: RequestId::new(),
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            messages,
            credentials,
            options,
        }
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// One partial text fragment for a request.
///
/// Chunks for a given identity are applied by concatenation in arrival
/// order; the transport guarantees in-order delivery per identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub request_id: RequestId,
    pub delta: String,
}

// ============================================================================
// Models
// ============================================================================

/// A model advertised by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
        }
    }
}

/// Normalized outcome of a model-list fetch. Failures are folded in here
/// rather than propagated; callers get a degraded-but-usable list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    pub success: bool,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl ModelList {
    pub fn ok(models: Vec<ModelInfo>) -> Self {
        Self {
            success: true,
            models,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            models: Vec::new(),
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Tool outcomes
// ============================================================================

/// Result of executing one tool against the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub content: String,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error.into()),
        }
    }

    /// The text folded into the transcript as a tool-result message:
    /// the operation's output on success, its error text otherwise.
    pub fn transcript_text(&self) -> &str {
        if self.success {
            &self.content
        } else {
            self.error.as_deref().unwrap_or("tool execution failed")
        }
    }
}
