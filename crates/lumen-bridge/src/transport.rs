//! Transport seam between the UI side and the host process.
//!
//! The real editor shell carries these calls over IPC; tests and the
//! bundled host wiring use [`InProcessTransport`]. The listener contract
//! mirrors the underlying IPC layer: removal works only by reference
//! identity of the exact wrapped closure that was registered, which is why
//! the [`Bridge`](crate::Bridge) keeps its own registration map.

use crate::BridgeError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The closure shape the transport registers for push events.
pub type WrappedListener = Arc<dyn Fn(&Value) + Send + Sync>;

type InvokeHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Request/response call to the host. Rejects when the channel is not
    /// exposed.
    async fn invoke(&self, channel: &str, args: Value) -> Result<Value, BridgeError>;

    /// Register a push-event listener.
    fn add_listener(&self, channel: &str, listener: WrappedListener);

    /// Remove a listener previously registered with [`add_listener`].
    /// Matching is by reference identity of the wrapped closure.
    fn remove_listener(&self, channel: &str, listener: &WrappedListener);
}

/// Tokio-based transport hosting both sides in one process.
///
/// Host code exposes invoke handlers and emits push events; the UI side
/// talks to it through the [`Bridge`](crate::Bridge).
pub struct InProcessTransport {
    handlers: Mutex<HashMap<String, InvokeHandler>>,
    listeners: Mutex<HashMap<String, Vec<WrappedListener>>>,
}

impl InProcessTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    /// Expose a request/response channel. Exposing the same channel twice
    /// replaces the handler.
    pub fn expose<F, Fut>(&self, channel: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: InvokeHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.handlers
            .lock()
            .unwrap()
            .insert(channel.to_string(), handler);
    }

    /// Push an event to every listener currently registered on `channel`,
    /// in registration order.
    pub fn emit(&self, channel: &str, payload: Value) {
        let listeners: Vec<WrappedListener> = {
            let map = self.listeners.lock().unwrap();
            map.get(channel).cloned().unwrap_or_default()
        };
        for listener in listeners {
            listener(&payload);
        }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn invoke(&self, channel: &str, args: Value) -> Result<Value, BridgeError> {
        let handler = {
            let map = self.handlers.lock().unwrap();
            map.get(channel).cloned()
        };
        let handler =
            handler.ok_or_else(|| BridgeError::ChannelUnavailable(channel.to_string()))?;

        handler(args).await.map_err(|e| BridgeError::Invoke {
            channel: channel.to_string(),
            message: e.to_string(),
        })
    }

    fn add_listener(&self, channel: &str, listener: WrappedListener) {
        self.listeners
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(listener);
    }

    fn remove_listener(&self, channel: &str, listener: &WrappedListener) {
        let mut map = self.listeners.lock().unwrap();
        if let Some(list) = map.get_mut(channel) {
            list.retain(|l| !Arc::ptr_eq(l, listener));
            if list.is_empty() {
                map.remove(channel);
            }
        }
    }
}
