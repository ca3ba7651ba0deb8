//! Autonomous tool-use agent loop.
//!
//! Each turn runs one completion session to its terminal state, scans the
//! final text for a tool directive, executes it against the workspace
//! collaborators, folds the result back into the conversation as a
//! tool-result message, and starts the next turn. The loop is bounded: a
//! model that keeps emitting tool calls terminates at the configured turn
//! limit with a distinct error, never silently.

pub mod parser;

pub use parser::{parse_tool_directive, strip_directive, ToolDirective};

use async_trait::async_trait;
use lumen_bridge::{channels, Bridge};
use lumen_session::{SessionError, SessionManager};
use lumen_types::{
    CompletionOptions, CompletionRequest, Message, ProviderConfig, ToolOutcome,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a run stopped without a plain-text answer. Every variant carries
/// the messages produced up to that point: tools may already have run
/// against the workspace, and the caller appends these so each executed
/// call stays visible in the transcript.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The turn counter reached the configured maximum. Surfaced to the
    /// user as its own outcome, not conflated with provider errors.
    #[error("agent stopped after reaching the {limit}-turn limit without a final answer")]
    TurnLimitExceeded {
        limit: u32,
        new_messages: Vec<Message>,
    },
    #[error("agent cancelled")]
    Cancelled { new_messages: Vec<Message> },
    #[error("{source}")]
    Session {
        source: SessionError,
        new_messages: Vec<Message>,
    },
}

impl AgentError {
    /// The partial transcript, consuming the error.
    pub fn into_new_messages(self) -> Vec<Message> {
        match self {
            AgentError::TurnLimitExceeded { new_messages, .. }
            | AgentError::Cancelled { new_messages }
            | AgentError::Session { new_messages, .. } => new_messages,
        }
    }
}

/// Seam through which the loop reaches workspace collaborators. The panel
/// wires this to boundary channels; tests script it directly.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool: &str, params: Value) -> ToolOutcome;
}

/// Executes tools by invoking host-side boundary channels.
///
/// The route table is the closed allow-list: a tool name with no route is
/// relayed to the model as a tool-not-found result, never a crash.
pub struct ChannelToolExecutor {
    bridge: Arc<Bridge>,
    routes: HashMap<String, &'static str>,
}

impl ChannelToolExecutor {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        let mut routes = HashMap::new();
        routes.insert("list_files".to_string(), channels::FS_LIST);
        routes.insert("read_file".to_string(), channels::FS_READ);
        routes.insert("write_file".to_string(), channels::FS_WRITE);
        Self { bridge, routes }
    }

    /// Register a route for a future tool.
    pub fn add_route(&mut self, tool: impl Into<String>, channel: &'static str) {
        self.routes.insert(tool.into(), channel);
    }
}

#[async_trait]
impl ToolExecutor for ChannelToolExecutor {
    async fn execute(&self, tool: &str, params: Value) -> ToolOutcome {
        let Some(channel) = self.routes.get(tool) else {
            let mut known: Vec<&str> = self.routes.keys().map(|s| s.as_str()).collect();
            known.sort();
            return ToolOutcome::error(format!(
                "Tool not found: '{}'. Available tools: {}",
                tool,
                known.join(", ")
            ));
        };

        match self.bridge.invoke(channel, params).await {
            Ok(value) => match serde_json::from_value::<ToolOutcome>(value) {
                Ok(outcome) => outcome,
                Err(e) => ToolOutcome::error(format!("Unreadable tool reply: {}", e)),
            },
            Err(e) => ToolOutcome::error(e.to_string()),
        }
    }
}

/// Provider/model/credential shape shared by every turn's request. A fresh
/// [`CompletionRequest`] (with a fresh identity) is built per turn.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub provider_id: String,
    pub model_id: String,
    pub credentials: ProviderConfig,
    pub options: CompletionOptions,
}

impl RequestTemplate {
    fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest::new(
            self.provider_id.clone(),
            self.model_id.clone(),
            messages,
            self.credentials.clone(),
            self.options.clone(),
        )
    }
}

/// What one agent run added to the conversation.
#[derive(Debug, Clone)]
pub struct AgentRun {
    /// Assistant and tool-result messages in the order they were produced.
    pub new_messages: Vec<Message>,
    /// The plain answer from the final turn.
    pub final_text: String,
}

pub struct AgentLoop {
    sessions: Arc<SessionManager>,
    executor: Arc<dyn ToolExecutor>,
}

impl AgentLoop {
    pub fn new(sessions: Arc<SessionManager>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { sessions, executor }
    }

    /// Run the loop until the model answers in plain text, the turn limit
    /// is hit, or the user cancels. Write failures are never retried here;
    /// they land in the transcript as tool results so the model can react
    /// and every attempted mutation stays auditable.
    pub async fn run(
        &self,
        template: &RequestTemplate,
        history: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<AgentRun, AgentError> {
        let max_turns = template.options.max_tool_turns;
        let mut messages = history;
        let mut new_messages = Vec::new();

        for _turn in 0..max_turns {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled { new_messages });
            }

            let request = template.request(messages.clone());
            let outcome = tokio::select! {
                outcome = self.sessions.run(&request) => outcome,
                _ = cancel.cancelled() => {
                    self.sessions.cancel_active();
                    return Err(AgentError::Cancelled { new_messages });
                }
            };
            let text = match outcome {
                Ok(text) => text,
                Err(SessionError::Cancelled) => {
                    return Err(AgentError::Cancelled { new_messages });
                }
                Err(source) => {
                    return Err(AgentError::Session {
                        source,
                        new_messages,
                    });
                }
            };

            let assistant = Message::assistant(text.clone());
            messages.push(assistant.clone());
            new_messages.push(assistant);

            let Some(directive) = parse_tool_directive(&text) else {
                // No actionable tool call: this is the final answer.
                return Ok(AgentRun {
                    new_messages,
                    final_text: text,
                });
            };

            let outcome = self
                .executor
                .execute(&directive.tool, directive.params.clone())
                .await;
            let tool_result = Message::tool_result(outcome.transcript_text());
            messages.push(tool_result.clone());
            new_messages.push(tool_result);
        }

        Err(AgentError::TurnLimitExceeded {
            limit: max_turns,
            new_messages,
        })
    }
}
