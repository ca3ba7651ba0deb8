//! End-to-end panel behavior over the in-process transport, with the
//! model side scripted and the file-system side real.

use lumen_app::{AppConfig, ChatPanel, NotSentReason, SendOutcome};
use lumen_bridge::{channels, Bridge, InProcessTransport};
use lumen_host::HostServices;
use lumen_modes::Mode;
use lumen_types::{Attachment, Role};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Replace the host's completion handler with one that streams scripted
/// responses, one per request, repeating the last. Everything else the
/// host installed (file channels, cancel, models) stays live.
fn script_completions(transport: &Arc<InProcessTransport>, responses: Vec<&str>) {
    let responses: Vec<String> = responses.into_iter().map(String::from).collect();
    let index = Arc::new(AtomicUsize::new(0));
    let emitter = transport.clone();
    transport.expose(channels::COMPLETION_REQUEST, move |args| {
        let emitter = emitter.clone();
        let responses = responses.clone();
        let index = index.clone();
        async move {
            let request_id = args["id"].as_str().unwrap_or_default().to_string();
            let i = index.fetch_add(1, Ordering::SeqCst).min(responses.len() - 1);
            let text = responses[i].clone();
            tokio::spawn(async move {
                emitter.emit(
                    channels::STREAM_CHUNK,
                    json!({ "request_id": request_id, "delta": text }),
                );
                tokio::task::yield_now().await;
                emitter.emit(channels::STREAM_DONE, json!({ "request_id": request_id }));
            });
            Ok(json!({ "accepted": true }))
        }
    });
}

fn panel_over(transport: &Arc<InProcessTransport>) -> ChatPanel {
    let config = AppConfig {
        default_provider: "local".to_string(),
        default_model: "test-model".to_string(),
        ..AppConfig::default()
    };
    ChatPanel::new(Bridge::new(transport.clone()), config)
}

#[tokio::test]
async fn ask_mode_appends_one_user_and_one_assistant_message() {
    let work = tempfile::tempdir().unwrap();
    let transport = InProcessTransport::new();
    let _host = HostServices::install(transport.clone(), work.path());
    script_completions(&transport, vec!["Hi! How can I help?"]);

    let mut panel = panel_over(&transport);
    panel.input = "Hello".to_string();
    let outcome = panel.send().await;

    assert_eq!(outcome, SendOutcome::Replied("Hi! How can I help?".to_string()));
    assert_eq!(panel.messages.len(), 2);
    assert_eq!(panel.messages[0].role, Role::User);
    assert_eq!(panel.messages[0].content, "Hello");
    assert_eq!(panel.messages[1].role, Role::Assistant);
    assert_eq!(panel.input, "");
}

#[tokio::test]
async fn empty_input_sends_nothing() {
    let transport = InProcessTransport::new();
    let mut panel = panel_over(&transport);
    panel.input = "   ".to_string();

    let outcome = panel.send().await;

    assert_eq!(outcome, SendOutcome::NotSent(NotSentReason::EmptyInput));
    assert!(panel.messages.is_empty());
}

#[tokio::test]
async fn explain_without_context_is_inert_and_preserves_input() {
    let transport = InProcessTransport::new();
    let mut panel = panel_over(&transport);
    panel.set_mode(Mode::Explain);
    panel.input = "what does this do".to_string();

    let outcome = panel.send().await;

    assert_eq!(outcome, SendOutcome::NotSent(NotSentReason::ModeUnavailable));
    assert!(panel.messages.is_empty());
    assert_eq!(panel.input, "what does this do");

    // Attaching context makes the same send go through.
    let work = tempfile::tempdir().unwrap();
    let _host = HostServices::install(transport.clone(), work.path());
    script_completions(&transport, vec!["It adds two numbers."]);
    panel.attach(Attachment {
        path: "src/lib.rs".to_string(),
        language: "rust".to_string(),
        content: "fn add(a: u32, b: u32) -> u32 { a + b }".to_string(),
    });
    let outcome = panel.send().await;
    assert_eq!(outcome, SendOutcome::Replied("It adds two numbers.".to_string()));
}

#[tokio::test]
async fn switching_provider_leaves_history_untouched() {
    let work = tempfile::tempdir().unwrap();
    let transport = InProcessTransport::new();
    let _host = HostServices::install(transport.clone(), work.path());
    script_completions(&transport, vec!["First answer."]);

    let mut panel = panel_over(&transport);
    panel.input = "Question one".to_string();
    panel.send().await;
    let before = panel.messages.clone();

    panel.set_provider("anthropic");
    panel.set_model("claude-sonnet-4");
    panel.set_mode(Mode::Plan);

    assert_eq!(panel.messages, before);
}

#[tokio::test]
async fn model_list_failure_leaves_panel_interactive() {
    let work = tempfile::tempdir().unwrap();
    let transport = InProcessTransport::new();
    let _host = HostServices::install(transport.clone(), work.path());
    script_completions(&transport, vec!["Still here."]);

    let mut panel = panel_over(&transport);
    // No key configured: anthropic model listing fails but never panics.
    panel.set_provider("anthropic");
    let list = panel.refresh_models().await;
    assert!(!list.success);
    assert!(panel.models.is_empty());

    panel.set_provider("local");
    panel.input = "ping".to_string();
    assert_eq!(panel.send().await, SendOutcome::Replied("Still here.".to_string()));
}

#[tokio::test]
async fn provider_failure_lands_in_history_as_an_error_note() {
    let work = tempfile::tempdir().unwrap();
    let transport = InProcessTransport::new();
    let _host = HostServices::install(transport.clone(), work.path());
    let emitter = transport.clone();
    transport.expose(channels::COMPLETION_REQUEST, move |args| {
        let emitter = emitter.clone();
        async move {
            let request_id = args["id"].as_str().unwrap_or_default().to_string();
            tokio::spawn(async move {
                emitter.emit(
                    channels::STREAM_ERROR,
                    json!({ "request_id": request_id, "error": "model overloaded" }),
                );
            });
            Ok(json!({ "accepted": true }))
        }
    });

    let mut panel = panel_over(&transport);
    panel.input = "Hello".to_string();
    let outcome = panel.send().await;

    assert!(matches!(outcome, SendOutcome::Failed(_)));
    let last = panel.messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert!(last.content.contains("model overloaded"));
}

#[tokio::test]
async fn agent_mode_writes_a_file_through_the_host() {
    let work = tempfile::tempdir().unwrap();
    let transport = InProcessTransport::new();
    let _host = HostServices::install(transport.clone(), work.path());
    script_completions(
        &transport,
        vec![
            "<tool>write_file</tool><params>{\"path\": \"notes.txt\", \"content\": \"hello from the agent\"}</params>",
            "Wrote notes.txt for you.",
        ],
    );

    let mut panel = panel_over(&transport);
    panel.set_mode(Mode::Agent);
    panel.input = "Create notes.txt".to_string();
    let outcome = panel.send().await;

    assert_eq!(outcome, SendOutcome::Replied("Wrote notes.txt for you.".to_string()));
    let written = std::fs::read_to_string(work.path().join("notes.txt")).unwrap();
    assert_eq!(written, "hello from the agent");

    // The directive-only assistant turn is spliced out; the tool result
    // and the final answer remain.
    let roles: Vec<Role> = panel.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::ToolResult, Role::Assistant]);
    assert_eq!(panel.messages.last().unwrap().content, "Wrote notes.txt for you.");
}

#[tokio::test]
async fn turn_limited_run_keeps_executed_tool_calls_in_the_transcript() {
    let work = tempfile::tempdir().unwrap();
    let transport = InProcessTransport::new();
    let _host = HostServices::install(transport.clone(), work.path());
    // Every turn writes the file again; the run can only end on the bound.
    script_completions(
        &transport,
        vec!["<tool>write_file</tool><params>{\"path\": \"notes.txt\", \"content\": \"first draft\"}</params>"],
    );

    let mut panel = panel_over(&transport);
    panel.set_mode(Mode::Agent);
    panel.options.max_tool_turns = 2;
    panel.input = "Write notes.txt".to_string();
    let outcome = panel.send().await;

    assert_eq!(outcome, SendOutcome::TurnLimit(2));
    // The workspace really was mutated, and the transcript says so: one
    // tool result per executed turn plus a visible stopped note.
    assert_eq!(
        std::fs::read_to_string(work.path().join("notes.txt")).unwrap(),
        "first draft"
    );
    let tool_results = panel
        .messages
        .iter()
        .filter(|m| m.role == Role::ToolResult)
        .count();
    assert_eq!(tool_results, 2);
    let last = panel.messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert!(last.content.contains("2-turn tool limit"));
}

#[tokio::test]
async fn agent_turn_limit_is_reported_distinctly() {
    let work = tempfile::tempdir().unwrap();
    let transport = InProcessTransport::new();
    let _host = HostServices::install(transport.clone(), work.path());
    script_completions(
        &transport,
        vec!["<tool>list_files</tool><params>{\"path\": \".\"}</params>"],
    );

    let mut panel = panel_over(&transport);
    panel.set_mode(Mode::Agent);
    panel.options.max_tool_turns = 3;
    panel.input = "Loop forever".to_string();
    let outcome = panel.send().await;

    assert_eq!(outcome, SendOutcome::TurnLimit(3));
}
