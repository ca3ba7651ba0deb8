//! Mode Controller: the prompt-shaping strategy applied to a user send.
//!
//! Six closed modes; each is a pure function from (mode, user input,
//! attached context) to the outgoing message sequence. Switching modes
//! mid-conversation never rewrites prior messages, it only frames the next
//! send.

use lumen_types::{Attachment, Message};

/// The tool-use preamble for Agent mode. This is the one place the
/// directive wire grammar is described to the model; the parser in
/// lumen-agent is its counterpart.
const AGENT_INSTRUCTIONS: &str = "\
You can act on the workspace. To perform an action, emit exactly one \
directive in this form, then stop:

<tool>TOOL_NAME</tool><params>{\"key\": \"value\"}</params>

Available tools:
- list_files - params {\"path\": \"<directory>\"}: list files under a directory
- read_file - params {\"path\": \"<file>\"}: read a file's contents
- write_file - params {\"path\": \"<file>\", \"content\": \"<text>\"}: write a file

After each action you will receive its result and may continue with \
another directive or answer in plain text. Answer in plain text when the \
task is done.";

const PLAN_INSTRUCTIONS: &str = "\
Produce a structured, numbered plan for the task below. Do not execute \
any tools and do not emit tool directives; describe the steps only.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ask,
    Agent,
    Plan,
    Explain,
    Refactor,
    Generate,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Ask,
        Mode::Agent,
        Mode::Plan,
        Mode::Explain,
        Mode::Refactor,
        Mode::Generate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Ask => "ask",
            Mode::Agent => "agent",
            Mode::Plan => "plan",
            Mode::Explain => "explain",
            Mode::Refactor => "refactor",
            Mode::Generate => "generate",
        }
    }

    pub fn from_name(name: &str) -> Option<Mode> {
        match name.to_lowercase().as_str() {
            "ask" => Some(Mode::Ask),
            "agent" => Some(Mode::Agent),
            "plan" => Some(Mode::Plan),
            "explain" => Some(Mode::Explain),
            "refactor" => Some(Mode::Refactor),
            "generate" => Some(Mode::Generate),
            _ => None,
        }
    }

    /// Explain and Refactor only make sense against code context.
    pub fn requires_context(&self) -> bool {
        matches!(self, Mode::Explain | Mode::Refactor)
    }

    /// Precondition checked before a request is even constructed; a mode
    /// that is unavailable is inert in the UI, not a runtime error.
    pub fn available(&self, context: &[Attachment]) -> bool {
        !self.requires_context() || !context.is_empty()
    }

    /// Only Agent mode feeds the agent loop.
    pub fn allows_tools(&self) -> bool {
        matches!(self, Mode::Agent)
    }

    /// Input-field placeholder for the panel.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Mode::Ask => "Ask anything about your code...",
            Mode::Agent => "Describe a task to carry out in the workspace...",
            Mode::Plan => "Describe what to plan...",
            Mode::Explain => "What should be explained about the selection?",
            Mode::Refactor => "How should the selection be refactored?",
            Mode::Generate => "Describe the code to generate...",
        }
    }

    /// Build the outgoing message sequence for one user send. Pure: the
    /// conversation history is owned by the panel and untouched here.
    pub fn compose(&self, input: &str, context: &[Attachment]) -> Vec<Message> {
        let text = match self {
            Mode::Ask => {
                if context.is_empty() {
                    input.to_string()
                } else {
                    format!("{}\n\n{}", render_context(context), input)
                }
            }
            Mode::Agent => {
                if context.is_empty() {
                    format!("{}\n\nTask: {}", AGENT_INSTRUCTIONS, input)
                } else {
                    format!(
                        "{}\n\n{}\n\nTask: {}",
                        AGENT_INSTRUCTIONS,
                        render_context(context),
                        input
                    )
                }
            }
            Mode::Plan => format!("{}\n\n{}", PLAN_INSTRUCTIONS, input),
            Mode::Explain => format!(
                "Explain the following code.\n\n{}\n\n{}",
                render_context(context),
                input
            ),
            Mode::Refactor => format!(
                "Refactor the following code. Reply with the revised code and \
                 a short rationale.\n\n{}\n\n{}",
                render_context(context),
                input
            ),
            Mode::Generate => format!("Generate code for the following request.\n\n{}", input),
        };

        vec![Message::user(text).with_attachments(context.to_vec())]
    }
}

fn render_context(context: &[Attachment]) -> String {
    context
        .iter()
        .map(|a| format!("File: {}\n```{}\n{}\n```", a.path, a.language, a.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
