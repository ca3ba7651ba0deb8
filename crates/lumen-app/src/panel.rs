//! The chat panel: conversation state and the send flow.
//!
//! This is the UI-side half of the system. It owns the message history,
//! the active mode, and the provider/model selection, and talks to the
//! host only through the bridge. All of its mutations are driven by
//! [`ChatPanel::send`] and the setters; nothing here touches the
//! filesystem or the network directly.

use crate::config::AppConfig;
use lumen_agent::{
    parse_tool_directive, strip_directive, AgentError, AgentLoop, ChannelToolExecutor,
    RequestTemplate,
};
use lumen_bridge::{channels, Bridge};
use lumen_modes::Mode;
use lumen_session::{SessionManager, SessionState};
use lumen_types::{
    Attachment, CompletionOptions, CompletionRequest, Message, ModelInfo, ModelList,
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What one send produced, for the caller to render.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The model answered; the text was appended to the history.
    Replied(String),
    /// Empty input or an unavailable mode; nothing was sent and the
    /// input field keeps its text.
    NotSent(NotSentReason),
    /// The provider failed; an error note was appended to the history
    /// so the conversation stays readable.
    Failed(String),
    /// An agent run hit its turn bound without a plain-text answer.
    TurnLimit(u32),
    /// The user cancelled mid-flight.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotSentReason {
    EmptyInput,
    ModeUnavailable,
}

pub struct ChatPanel {
    bridge: Arc<Bridge>,
    sessions: Arc<SessionManager>,
    config: AppConfig,
    pub messages: Vec<Message>,
    pub mode: Mode,
    pub provider_id: String,
    pub model_id: String,
    pub options: CompletionOptions,
    pub context: Vec<Attachment>,
    pub input: String,
    pub models: Vec<ModelInfo>,
    cancel: CancellationToken,
}

impl ChatPanel {
    pub fn new(bridge: Arc<Bridge>, config: AppConfig) -> Self {
        let sessions = Arc::new(SessionManager::new(bridge.clone()));
        let provider_id = config.default_provider.clone();
        let model_id = config.default_model.clone();
        let options = config.completion_options();
        Self {
            bridge,
            sessions,
            config,
            messages: Vec::new(),
            mode: Mode::Ask,
            provider_id,
            model_id,
            options,
            context: Vec::new(),
            input: String::new(),
            models: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        // Only the framing of future sends changes; history stays intact.
        self.mode = mode;
    }

    pub fn set_provider(&mut self, provider_id: impl Into<String>) {
        self.provider_id = provider_id.into();
        self.models.clear();
    }

    pub fn set_model(&mut self, model_id: impl Into<String>) {
        self.model_id = model_id.into();
    }

    pub fn attach(&mut self, attachment: Attachment) {
        self.context.push(attachment);
    }

    pub fn clear_context(&mut self) {
        self.context.clear();
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
        self.sessions.cancel_active();
    }

    /// Live partial text of the in-flight response, for rendering.
    pub fn streaming_text(&self) -> Option<String> {
        match self.sessions.active_state() {
            Some(SessionState::Streaming) | Some(SessionState::Pending) => {
                self.sessions.active_text()
            }
            _ => None,
        }
    }

    fn template(&self) -> RequestTemplate {
        RequestTemplate {
            provider_id: self.provider_id.clone(),
            model_id: self.model_id.clone(),
            credentials: self.config.provider_config(&self.provider_id),
            options: self.options.clone(),
        }
    }

    /// Ask the host for the current provider's models. A failure degrades
    /// to an empty list; the panel stays interactive either way.
    pub async fn refresh_models(&mut self) -> ModelList {
        let args = json!({
            "provider_id": self.provider_id,
            "config": self.config.provider_config(&self.provider_id),
        });
        let list = match self.bridge.invoke(channels::MODELS_LIST, args).await {
            Ok(value) => serde_json::from_value::<ModelList>(value)
                .unwrap_or_else(|e| ModelList::failed(format!("Malformed model list: {}", e))),
            Err(e) => ModelList::failed(e.to_string()),
        };
        self.models = if list.success {
            list.models.clone()
        } else {
            Vec::new()
        };
        list
    }

    /// One user send, end to end. The input field is cleared only once
    /// the send is actually dispatched; a rejected send preserves it.
    pub async fn send(&mut self) -> SendOutcome {
        let input = self.input.trim().to_string();
        if input.is_empty() {
            return SendOutcome::NotSent(NotSentReason::EmptyInput);
        }
        if !self.mode.available(&self.context) {
            return SendOutcome::NotSent(NotSentReason::ModeUnavailable);
        }

        let outgoing = self.mode.compose(&input, &self.context);
        self.messages.extend(outgoing);
        self.input.clear();
        self.cancel = CancellationToken::new();

        if self.mode.allows_tools() {
            self.send_agent().await
        } else {
            self.send_single().await
        }
    }

    async fn send_single(&mut self) -> SendOutcome {
        let request = CompletionRequest::new(
            self.provider_id.clone(),
            self.model_id.clone(),
            self.messages.clone(),
            self.config.provider_config(&self.provider_id),
            self.options.clone(),
        );

        match self.sessions.run(&request).await {
            Ok(text) => {
                self.messages.push(Message::assistant(text.clone()));
                SendOutcome::Replied(text)
            }
            Err(lumen_session::SessionError::Cancelled) => SendOutcome::Cancelled,
            Err(e) => {
                let note = format!("[error] {}", e);
                self.messages.push(Message::assistant(note.clone()));
                SendOutcome::Failed(note)
            }
        }
    }

    async fn send_agent(&mut self) -> SendOutcome {
        let executor = Arc::new(ChannelToolExecutor::new(self.bridge.clone()));
        let agent = AgentLoop::new(self.sessions.clone(), executor);
        let outcome = agent
            .run(&self.template(), self.messages.clone(), &self.cancel)
            .await;

        // Tools may have mutated the workspace before the run stopped, so
        // the partial transcript is appended on every path.
        match outcome {
            Ok(run) => {
                self.push_agent_messages(run.new_messages);
                SendOutcome::Replied(run.final_text)
            }
            Err(AgentError::TurnLimitExceeded {
                limit,
                new_messages,
            }) => {
                self.push_agent_messages(new_messages);
                self.messages.push(Message::assistant(format!(
                    "[stopped] reached the {}-turn tool limit without a final answer",
                    limit
                )));
                SendOutcome::TurnLimit(limit)
            }
            Err(AgentError::Cancelled { new_messages }) => {
                self.push_agent_messages(new_messages);
                SendOutcome::Cancelled
            }
            Err(AgentError::Session {
                source,
                new_messages,
            }) => {
                self.push_agent_messages(new_messages);
                let note = format!("[error] {}", source);
                self.messages.push(Message::assistant(note.clone()));
                SendOutcome::Failed(note)
            }
        }
    }

    /// Append an agent run's messages, splicing the directive markup out
    /// of assistant turns. A turn that was nothing but a directive is
    /// dropped; its tool result still lands so the transcript shows what
    /// happened.
    fn push_agent_messages(&mut self, new_messages: Vec<Message>) {
        for mut msg in new_messages {
            if msg.role == lumen_types::Role::Assistant {
                if let Some(directive) = parse_tool_directive(&msg.content) {
                    msg.content = strip_directive(&msg.content, &directive);
                    if msg.content.is_empty() {
                        continue;
                    }
                }
            }
            self.messages.push(msg);
        }
    }
}
