//! Agent loop behavior against a scripted host and scripted tools.

use async_trait::async_trait;
use lumen_agent::{AgentError, AgentLoop, ChannelToolExecutor, RequestTemplate, ToolExecutor};
use lumen_bridge::{channels, Bridge, InProcessTransport};
use lumen_session::SessionManager;
use lumen_types::{CompletionOptions, Message, ProviderConfig, Role, ToolOutcome};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Host stub whose "model" replies with the scripted texts in order,
/// repeating the last one once the script runs out.
fn scripted_host(responses: Vec<&str>) -> Arc<InProcessTransport> {
    let responses: Vec<String> = responses.into_iter().map(|s| s.to_string()).collect();
    let call = Arc::new(AtomicUsize::new(0));
    let transport = InProcessTransport::new();
    let emitter = transport.clone();
    transport.expose(channels::COMPLETION_REQUEST, move |args| {
        let emitter = emitter.clone();
        let responses = responses.clone();
        let call = call.clone();
        async move {
            let request_id = args["id"].as_str().unwrap_or_default().to_string();
            let index = call.fetch_add(1, Ordering::SeqCst).min(responses.len() - 1);
            let text = responses[index].clone();
            tokio::spawn(async move {
                emitter.emit(
                    channels::STREAM_CHUNK,
                    json!({ "request_id": request_id, "delta": text }),
                );
                emitter.emit(channels::STREAM_DONE, json!({ "request_id": request_id }));
            });
            Ok(json!({ "accepted": true }))
        }
    });
    transport
}

/// Tool executor that records calls and replies from a script.
struct ScriptedExecutor {
    calls: Mutex<Vec<(String, Value)>>,
    outcome: ToolOutcome,
}

impl ScriptedExecutor {
    fn new(outcome: ToolOutcome) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            outcome,
        })
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(&self, tool: &str, params: Value) -> ToolOutcome {
        self.calls.lock().unwrap().push((tool.to_string(), params));
        self.outcome.clone()
    }
}

fn template(max_tool_turns: u32) -> RequestTemplate {
    RequestTemplate {
        provider_id: "local".to_string(),
        model_id: "test-model".to_string(),
        credentials: ProviderConfig::default(),
        options: CompletionOptions {
            max_tool_turns,
            ..CompletionOptions::default()
        },
    }
}

const LIST_DIRECTIVE: &str =
    r#"Looking around. <tool>list_files</tool><params>{"path":"src"}</params>"#;

#[tokio::test]
async fn tool_call_then_plain_answer_converges() {
    let transport = scripted_host(vec![LIST_DIRECTIVE, "There are two files."]);
    let sessions = Arc::new(SessionManager::new(Bridge::new(transport)));
    let executor = ScriptedExecutor::new(ToolOutcome::success("src/main.rs\nsrc/lib.rs"));
    let agent = AgentLoop::new(sessions, executor.clone());

    let run = agent
        .run(
            &template(10),
            vec![Message::user("what files are there?")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(run.final_text, "There are two files.");
    // assistant (directive), tool-result, assistant (answer)
    assert_eq!(run.new_messages.len(), 3);
    assert_eq!(run.new_messages[0].role, Role::Assistant);
    assert_eq!(run.new_messages[1].role, Role::ToolResult);
    assert_eq!(run.new_messages[1].content, "src/main.rs\nsrc/lib.rs");
    assert_eq!(run.new_messages[2].role, Role::Assistant);

    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "list_files");
    assert_eq!(calls[0].1["path"], "src");
}

#[tokio::test]
async fn endless_tool_calls_stop_exactly_at_the_turn_limit() {
    let transport = scripted_host(vec![LIST_DIRECTIVE]);
    let sessions = Arc::new(SessionManager::new(Bridge::new(transport)));
    let executor = ScriptedExecutor::new(ToolOutcome::success("src/main.rs"));
    let agent = AgentLoop::new(sessions, executor.clone());

    let err = agent
        .run(
            &template(4),
            vec![Message::user("loop forever")],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let AgentError::TurnLimitExceeded {
        limit,
        new_messages,
    } = err
    else {
        panic!("expected the turn-limit error, got: {:?}", err);
    };
    assert_eq!(limit, 4);
    assert_eq!(executor.calls().len(), 4);

    // Every executed turn is in the partial transcript: four directive
    // turns, each followed by its tool result.
    assert_eq!(new_messages.len(), 8);
    assert_eq!(new_messages[0].role, Role::Assistant);
    assert_eq!(new_messages[1].role, Role::ToolResult);
    assert_eq!(new_messages[7].content, "src/main.rs");
}

#[tokio::test]
async fn unknown_tool_is_relayed_as_a_tool_result() {
    let transport = scripted_host(vec![
        r#"<tool>rm_rf</tool><params>{"path":"/"}</params>"#,
        "Understood, that tool does not exist.",
    ]);
    let bridge = Bridge::new(transport);
    let sessions = Arc::new(SessionManager::new(bridge.clone()));
    // Real channel executor: rm_rf has no route, so no channel is invoked.
    let executor = Arc::new(ChannelToolExecutor::new(bridge));
    let agent = AgentLoop::new(sessions, executor);

    let run = agent
        .run(
            &template(10),
            vec![Message::user("delete everything")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let tool_result = &run.new_messages[1];
    assert_eq!(tool_result.role, Role::ToolResult);
    assert!(tool_result.content.contains("Tool not found: 'rm_rf'"));
    assert!(tool_result.content.contains("list_files"));
}

#[tokio::test]
async fn failed_tool_lands_in_the_transcript_unretried() {
    let transport = scripted_host(vec![
        r#"<tool>read_file</tool><params>{"path":"gone.rs"}</params>"#,
        "The file is missing.",
    ]);
    let sessions = Arc::new(SessionManager::new(Bridge::new(transport)));
    let executor = ScriptedExecutor::new(ToolOutcome::error("File not found: gone.rs"));
    let agent = AgentLoop::new(sessions, executor.clone());

    let run = agent
        .run(
            &template(10),
            vec![Message::user("read gone.rs")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(executor.calls().len(), 1);
    assert_eq!(run.new_messages[1].content, "File not found: gone.rs");
    assert_eq!(run.final_text, "The file is missing.");
}

#[tokio::test]
async fn cancelled_loop_starts_no_further_turn() {
    let transport = scripted_host(vec![LIST_DIRECTIVE]);
    let sessions = Arc::new(SessionManager::new(Bridge::new(transport)));
    let executor = ScriptedExecutor::new(ToolOutcome::success("src/main.rs"));
    let agent = AgentLoop::new(sessions, executor.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = agent
        .run(&template(10), vec![Message::user("task")], &cancel)
        .await
        .unwrap_err();

    let AgentError::Cancelled { new_messages } = err else {
        panic!("expected the cancelled error, got: {:?}", err);
    };
    assert!(new_messages.is_empty());
    assert!(executor.calls().is_empty());
}
