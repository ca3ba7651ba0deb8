//! Boundary Bridge: the single channel by which the UI side invokes host
//! capabilities and subscribes to host-pushed events.
//!
//! Only explicitly exposed channels cross the boundary. Each `subscribe`
//! call returns its own revocation handle: the bridge keeps a map from
//! subscription id to the wrapped listener it registered on the transport,
//! because the transport can only remove a listener by reference identity
//! of the exact wrapped closure it was given.

pub mod channels;
pub mod transport;

pub use transport::{InProcessTransport, Transport, WrappedListener};

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;

/// Errors crossing the boundary. Never retried automatically: an
/// unavailable channel means the capability is gone for the session.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("host does not expose channel '{0}'")]
    ChannelUnavailable(String),
    #[error("invoke on '{channel}' failed: {message}")]
    Invoke { channel: String, message: String },
}

/// Handler for push events on a subscribed channel.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

struct Registration {
    channel: String,
    wrapped: WrappedListener,
}

/// UI-side bridge over a [`Transport`].
pub struct Bridge {
    transport: Arc<dyn Transport>,
    registrations: Mutex<HashMap<u64, Registration>>,
    next_subscription: AtomicU64,
}

impl Bridge {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            registrations: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        })
    }

    /// Request/response call. At most one reply per call; a channel the
    /// host does not expose rejects, and the bridge does not retry.
    pub async fn invoke(&self, channel: &str, args: Value) -> Result<Value, BridgeError> {
        self.transport.invoke(channel, args).await
    }

    /// Subscribe a handler to a push channel.
    ///
    /// Every call returns a distinct [`Subscription`]; revoking it removes
    /// exactly that registration, even when the same closure was subscribed
    /// twice or on several channels.
    pub fn subscribe(
        self: &Arc<Self>,
        channel: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let channel_name = channel.to_string();

        let wrapped: WrappedListener = if channels::is_stream_channel(channel) {
            let trace_channel = channel_name.clone();
            Arc::new(move |payload: &Value| {
                let request_id = payload
                    .get("request_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("-");
                let _ = lumen_logging::log_stream_event(&trace_channel, request_id, payload);
                handler(payload);
            })
        } else {
            Arc::new(move |payload: &Value| handler(payload))
        };

        self.transport.add_listener(channel, wrapped.clone());
        self.registrations.lock().unwrap().insert(
            id,
            Registration {
                channel: channel_name,
                wrapped,
            },
        );

        Subscription {
            id,
            bridge: Arc::downgrade(self),
        }
    }

    fn unsubscribe_id(&self, id: u64) {
        if let Some(reg) = self.registrations.lock().unwrap().remove(&id) {
            self.transport.remove_listener(&reg.channel, &reg.wrapped);
        }
    }

    #[cfg(test)]
    fn registration_count(&self) -> usize {
        self.registrations.lock().unwrap().len()
    }
}

/// Revocation handle returned by [`Bridge::subscribe`]. Revokes on drop.
pub struct Subscription {
    id: u64,
    bridge: Weak<Bridge>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.unsubscribe_id(self.id);
        }
    }
}
