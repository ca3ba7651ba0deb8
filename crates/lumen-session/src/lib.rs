//! Streaming Session Manager.
//!
//! Owns the lifecycle of one in-flight completion request: assigns it an
//! identity, applies ordered chunk/done/error events keyed by that identity,
//! and exposes a cancellation path. Only one session may be streaming per
//! panel; starting a new request supersedes (cancels) the active one.
//!
//! Cancellation is advisory to the host (best-effort abort via
//! `completion:cancel`) but authoritative on the UI side: once recorded, no
//! further chunk mutates state for that identity. Stale chunks from a
//! superseded session are discarded by identity tag, never by teardown
//! timing.

use lumen_bridge::{channels, Bridge, BridgeError, Subscription};
use lumen_types::{CompletionRequest, RequestId};
use serde_json::json;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] BridgeError),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("session cancelled")]
    Cancelled,
}

/// Session lifecycle states.
///
/// `Pending --start--> Streaming --chunk*--> Streaming --done--> Completed`;
/// `Streaming --error--> Errored`; `Pending|Streaming --cancel--> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Errored | SessionState::Cancelled
        )
    }
}

/// One in-flight request and its accumulating output. Owned exclusively by
/// the [`SessionManager`]; destroyed once terminal and observed.
struct Session {
    id: RequestId,
    buffer: String,
    state: SessionState,
    error: Option<String>,
}

impl Session {
    fn new(id: RequestId) -> Self {
        Self {
            id,
            buffer: String::new(),
            state: SessionState::Pending,
            error: None,
        }
    }
}

#[derive(Default)]
struct Slot {
    session: Option<Session>,
}

/// Manages the single active-session slot for one conversation panel.
pub struct SessionManager {
    bridge: Arc<Bridge>,
    slot: Arc<Mutex<Slot>>,
    notify: Arc<Notify>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SessionManager {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            slot: Arc::new(Mutex::new(Slot::default())),
            notify: Arc::new(Notify::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Run one request to its terminal state and return the accumulated
    /// text. A request already in flight is cancelled first: last write
    /// wins, there is no queue of pending sends.
    pub async fn run(&self, request: &CompletionRequest) -> Result<String, SessionError> {
        self.cancel_active();

        let id = request.id;
        {
            let mut slot = self.slot.lock().unwrap();
            slot.session = Some(Session::new(id));
        }
        self.install_subscriptions(id);

        let payload = serde_json::to_value(request)
            .map_err(|e| SessionError::Provider(format!("unserializable request: {}", e)))?;
        let started = self
            .bridge
            .invoke(channels::COMPLETION_REQUEST, payload)
            .await;

        if let Err(e) = started {
            self.release(id);
            return Err(e.into());
        }

        // The host accepted the request; chunks may already be flowing.
        self.transition(id, SessionState::Pending, SessionState::Streaming);

        let outcome = self.wait_terminal(id).await;
        self.release(id);
        outcome
    }

    /// Cancel whatever session is active. Authoritative locally: the buffer
    /// freezes immediately; the host abort is best-effort and asynchronous.
    pub fn cancel_active(&self) {
        let cancelled_id = {
            let mut slot = self.slot.lock().unwrap();
            match slot.session.as_mut() {
                Some(sess) if !sess.state.is_terminal() => {
                    sess.state = SessionState::Cancelled;
                    Some(sess.id)
                }
                _ => None,
            }
        };

        let Some(id) = cancelled_id else { return };

        self.subscriptions.lock().unwrap().clear();
        self.notify.notify_waiters();

        let bridge = self.bridge.clone();
        tokio::spawn(async move {
            let _ = bridge
                .invoke(
                    channels::COMPLETION_CANCEL,
                    json!({ "request_id": id.to_string() }),
                )
                .await;
        });
    }

    /// Text accumulated so far for the active session, for live display.
    pub fn active_text(&self) -> Option<String> {
        let slot = self.slot.lock().unwrap();
        slot.session.as_ref().map(|s| s.buffer.clone())
    }

    /// State of the active session, if any.
    pub fn active_state(&self) -> Option<SessionState> {
        let slot = self.slot.lock().unwrap();
        slot.session.as_ref().map(|s| s.state)
    }

    fn install_subscriptions(&self, id: RequestId) {
        let id_str = id.to_string();

        let chunk_sub = {
            let slot = self.slot.clone();
            let notify = self.notify.clone();
            let id_str = id_str.clone();
            self.bridge.subscribe(channels::STREAM_CHUNK, move |payload| {
                if payload["request_id"].as_str() != Some(id_str.as_str()) {
                    return;
                }
                let Some(delta) = payload["delta"].as_str() else {
                    return;
                };
                let mut slot = slot.lock().unwrap();
                if let Some(sess) = slot.session.as_mut() {
                    // Append-only, identity-checked; anything else is stale.
                    // A chunk can race the start acknowledgment, so a
                    // pending session is promoted rather than losing the
                    // fragment.
                    if sess.id == id && !sess.state.is_terminal() {
                        sess.state = SessionState::Streaming;
                        sess.buffer.push_str(delta);
                        notify.notify_waiters();
                    }
                }
            })
        };

        let done_sub = {
            let slot = self.slot.clone();
            let notify = self.notify.clone();
            let id_str = id_str.clone();
            self.bridge.subscribe(channels::STREAM_DONE, move |payload| {
                if payload["request_id"].as_str() != Some(id_str.as_str()) {
                    return;
                }
                let mut slot = slot.lock().unwrap();
                if let Some(sess) = slot.session.as_mut() {
                    if sess.id == id && !sess.state.is_terminal() {
                        sess.state = SessionState::Completed;
                        notify.notify_waiters();
                    }
                }
            })
        };

        let error_sub = {
            let slot = self.slot.clone();
            let notify = self.notify.clone();
            self.bridge.subscribe(channels::STREAM_ERROR, move |payload| {
                if payload["request_id"].as_str() != Some(id_str.as_str()) {
                    return;
                }
                let mut slot = slot.lock().unwrap();
                if let Some(sess) = slot.session.as_mut() {
                    if sess.id == id && !sess.state.is_terminal() {
                        sess.state = SessionState::Errored;
                        sess.error = Some(
                            payload["error"]
                                .as_str()
                                .unwrap_or("unknown stream error")
                                .to_string(),
                        );
                        notify.notify_waiters();
                    }
                }
            })
        };

        let mut subs = self.subscriptions.lock().unwrap();
        subs.clear();
        subs.push(chunk_sub);
        subs.push(done_sub);
        subs.push(error_sub);
    }

    fn transition(&self, id: RequestId, from: SessionState, to: SessionState) {
        let mut slot = self.slot.lock().unwrap();
        if let Some(sess) = slot.session.as_mut() {
            if sess.id == id && sess.state == from {
                sess.state = to;
            }
        }
    }

    async fn wait_terminal(&self, id: RequestId) -> Result<String, SessionError> {
        loop {
            let notified = self.notify.notified();
            {
                let slot = self.slot.lock().unwrap();
                match slot.session.as_ref() {
                    // Superseded by a newer request: treated as cancelled.
                    None => return Err(SessionError::Cancelled),
                    Some(sess) if sess.id != id => return Err(SessionError::Cancelled),
                    Some(sess) => match sess.state {
                        SessionState::Completed => return Ok(sess.buffer.clone()),
                        SessionState::Cancelled => return Err(SessionError::Cancelled),
                        SessionState::Errored => {
                            return Err(SessionError::Provider(
                                sess.error.clone().unwrap_or_default(),
                            ))
                        }
                        SessionState::Pending | SessionState::Streaming => {}
                    },
                }
            }
            notified.await;
        }
    }

    /// Drop the stream subscriptions once the terminal state has been
    /// observed. The terminal session itself stays readable (the panel may
    /// keep partial text on screen) until the next request replaces it.
    fn release(&self, id: RequestId) {
        let slot = self.slot.lock().unwrap();
        if slot.session.as_ref().map(|s| s.id) == Some(id) {
            drop(slot);
            self.subscriptions.lock().unwrap().clear();
        }
    }
}
