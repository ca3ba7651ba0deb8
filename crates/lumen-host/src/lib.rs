//! Host-side services: the trusted end of the boundary.
//!
//! Binds the completion, model-listing, and workspace file channels onto
//! the transport. Completion runs are spawned tasks that push identity-
//! tagged chunk/done/error events; `completion:cancel` aborts the task for
//! one request id, best-effort.

use futures_util::StreamExt;
use lumen_bridge::{channels, InProcessTransport};
use lumen_providers::provider_for;
use lumen_tools::{ToolContext, ToolParameters, ToolRegistry};
use lumen_types::CompletionRequest;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct HostServices {
    transport: Arc<InProcessTransport>,
    registry: Arc<ToolRegistry>,
    context: ToolContext,
    in_flight: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl HostServices {
    /// Wire every host capability onto the transport and return the
    /// service handle.
    pub fn install(transport: Arc<InProcessTransport>, work_dir: impl Into<PathBuf>) -> Arc<Self> {
        let services = Arc::new(Self {
            transport,
            registry: Arc::new(ToolRegistry::with_builtins()),
            context: ToolContext::new(work_dir),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        });
        services.expose_completion();
        services.expose_cancel();
        services.expose_models();
        services.expose_file_tool(channels::FS_LIST, "list_files");
        services.expose_file_tool(channels::FS_READ, "read_file");
        services.expose_file_tool(channels::FS_WRITE, "write_file");
        services
    }

    fn expose_completion(self: &Arc<Self>) {
        let services = self.clone();
        self.transport
            .expose(channels::COMPLETION_REQUEST, move |args| {
                let services = services.clone();
                async move {
                    let request: CompletionRequest = serde_json::from_value(args)?;
                    services.spawn_completion(request);
                    Ok(json!({ "accepted": true }))
                }
            });
    }

    fn spawn_completion(self: &Arc<Self>, request: CompletionRequest) {
        let id = request.id.to_string();
        let cancel = CancellationToken::new();
        self.in_flight
            .lock()
            .unwrap()
            .insert(id.clone(), cancel.clone());

        let services = self.clone();
        tokio::spawn(async move {
            services.run_completion(&request, &id, &cancel).await;
            services.in_flight.lock().unwrap().remove(&id);
        });
    }

    async fn run_completion(&self, request: &CompletionRequest, id: &str, cancel: &CancellationToken) {
        let Some(provider) = provider_for(&request.provider_id) else {
            self.transport.emit(
                channels::STREAM_ERROR,
                json!({
                    "request_id": id,
                    "error": format!("unknown provider '{}'", request.provider_id),
                }),
            );
            return;
        };

        if request.options.stream {
            let stream = tokio::select! {
                outcome = provider.complete_streaming(request) => outcome,
                _ = cancel.cancelled() => return,
            };
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    self.transport.emit(
                        channels::STREAM_ERROR,
                        json!({ "request_id": id, "error": e.to_string() }),
                    );
                    return;
                }
            };

            loop {
                let next = tokio::select! {
                    chunk = stream.next() => chunk,
                    _ = cancel.cancelled() => return,
                };
                match next {
                    Some(Ok(chunk)) => {
                        self.transport.emit(
                            channels::STREAM_CHUNK,
                            json!({ "request_id": id, "delta": chunk.delta }),
                        );
                    }
                    Some(Err(e)) => {
                        self.transport.emit(
                            channels::STREAM_ERROR,
                            json!({ "request_id": id, "error": e.to_string() }),
                        );
                        return;
                    }
                    None => break,
                }
            }
            self.transport
                .emit(channels::STREAM_DONE, json!({ "request_id": id }));
        } else {
            let outcome = tokio::select! {
                outcome = provider.complete(request) => outcome,
                _ = cancel.cancelled() => return,
            };
            match outcome {
                Ok(text) => {
                    self.transport.emit(
                        channels::STREAM_CHUNK,
                        json!({ "request_id": id, "delta": text }),
                    );
                    self.transport
                        .emit(channels::STREAM_DONE, json!({ "request_id": id }));
                }
                Err(e) => {
                    self.transport.emit(
                        channels::STREAM_ERROR,
                        json!({ "request_id": id, "error": e.to_string() }),
                    );
                }
            }
        }
    }

    fn expose_cancel(self: &Arc<Self>) {
        let in_flight = self.in_flight.clone();
        self.transport
            .expose(channels::COMPLETION_CANCEL, move |args| {
                let in_flight = in_flight.clone();
                async move {
                    let id = args["request_id"].as_str().unwrap_or_default();
                    let aborted = match in_flight.lock().unwrap().remove(id) {
                        Some(token) => {
                            token.cancel();
                            true
                        }
                        None => false,
                    };
                    Ok(json!({ "aborted": aborted }))
                }
            });
    }

    fn expose_models(self: &Arc<Self>) {
        self.transport.expose(channels::MODELS_LIST, |args| async move {
            let provider_id = args["provider_id"].as_str().unwrap_or_default().to_string();
            let config = serde_json::from_value(args["config"].clone()).unwrap_or_default();
            let list = lumen_providers::list_models_normalized(&provider_id, &config).await;
            Ok(serde_json::to_value(list)?)
        });
    }

    fn expose_file_tool(self: &Arc<Self>, channel: &'static str, tool_name: &'static str) {
        let registry = self.registry.clone();
        let context = self.context.clone();
        self.transport.expose(channel, move |args: Value| {
            let registry = registry.clone();
            let context = context.clone();
            async move {
                let tool = registry
                    .get(tool_name)
                    .ok_or_else(|| anyhow::anyhow!("tool '{}' not registered", tool_name))?;
                let params = ToolParameters::from_value(args)?;
                let outcome = tool.execute(params, &context).await;
                Ok(serde_json::to_value(outcome)?)
            }
        });
    }
}
