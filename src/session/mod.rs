//! Session Engine (C7, spec §4.7): the per-connection state machine plus
//! the Host/Consumer task bodies that drive it.

pub mod consumer;
pub mod host;
pub mod state;

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::device::PhysicalDeviceKind;
use crate::error::Error;
use state::{ClosedReason, SessionRole, SessionState};

/// 30 s deadline for a UI-driven authorization decision (spec §4.7).
pub const AUTH_PROMPT_DEADLINE_SECS: u64 = 30;
/// 5 s of no inbound bytes before sending a keepalive (spec §4.7 liveness).
pub const HEARTBEAT_SEND_AFTER_SILENCE_SECS: u64 = 5;
/// 2 s of no outbound bytes before sending a keepalive.
pub const HEARTBEAT_SEND_AFTER_IDLE_SECS: u64 = 2;
/// 10 s of no inbound bytes at all is a liveness failure.
pub const LIVENESS_TIMEOUT_SECS: u64 = 10;

/// What the Consumer side does with an `AuthorizationPrompt` once a human
/// (or an auto-decline fallback) answers it.
#[derive(Debug, Clone)]
pub enum AuthDecision {
    Accept { trust: bool },
    Decline,
}

/// Sent to the Supervisor's event channel when no policy auto-accepts a
/// peer (spec §4.7 step 3). The Session task blocks on `respond` with a
/// 30 s deadline of its own, independent of whatever the Supervisor does
/// with the event.
pub struct AuthorizationPrompt {
    pub prompt_id: String,
    pub peer_name: String,
    pub kind: PhysicalDeviceKind,
    pub respond: oneshot::Sender<AuthDecision>,
}

/// Bookkeeping view of one active session (spec §3 `Session`), shared
/// between the running task and the Supervisor registry.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub role: SessionRole,
    pub peer_name: Option<String>,
    pub device_path: Option<String>,
    pub state: SessionState,
    pub closed_reason: Option<ClosedReason>,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Thread-safe handle to a session's bookkeeping, updated by the running
/// task and read by the Supervisor/UI. `set_state` enforces spec §4.7's
/// transition table — an invalid request is a logic bug in the caller, so
/// it's rejected rather than silently coerced.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionInfo>>,
}

impl SessionHandle {
    pub fn new(session_id: String, role: SessionRole, device_path: Option<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInfo {
                session_id,
                role,
                peer_name: None,
                device_path,
                state: SessionState::Dialing,
                closed_reason: None,
                bytes_in: 0,
                bytes_out: 0,
            })),
        }
    }

    pub fn snapshot(&self) -> SessionInfo {
        self.inner.lock().clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn set_peer_name(&self, name: impl Into<String>) {
        self.inner.lock().peer_name = Some(name.into());
    }

    pub fn add_bytes_in(&self, n: u64) {
        self.inner.lock().bytes_in += n;
    }

    pub fn add_bytes_out(&self, n: u64) {
        self.inner.lock().bytes_out += n;
    }

    /// Transition to `next`. Returns a [`Error::Transient`] (not a protocol
    /// error — this is a programming invariant, not a peer's fault) if the
    /// table in `state.rs` disallows the move.
    pub fn set_state(&self, next: SessionState) -> crate::error::Result<()> {
        let mut guard = self.inner.lock();
        if !guard.state.can_transition_to(next) {
            return Err(Error::transient(
                guard.peer_name.clone(),
                format!("invalid session transition {:?} -> {next:?}", guard.state),
            ));
        }
        guard.state = next;
        Ok(())
    }

    /// External stop()/SIGTERM: force Draining from any pre-terminal state
    /// (spec §4.7 cancellation row).
    pub fn cancel_to_draining(&self) {
        let mut guard = self.inner.lock();
        if guard.state.can_cancel_to_draining() {
            guard.state = SessionState::Draining;
        }
    }

    pub fn close(&self, reason: ClosedReason) {
        let mut guard = self.inner.lock();
        guard.state = SessionState::Closed;
        guard.closed_reason = Some(reason);
    }
}

/// Tracks the last time bytes moved in each direction, for the liveness
/// rule in spec §4.7: keepalive after 5 s silence / 2 s idle, hard failure
/// after 10 s of total silence.
pub struct LivenessClock {
    pub last_inbound: Instant,
    pub last_outbound: Instant,
}

impl LivenessClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_inbound: now,
            last_outbound: now,
        }
    }

    pub fn mark_inbound(&mut self) {
        self.last_inbound = Instant::now();
    }

    pub fn mark_outbound(&mut self) {
        self.last_outbound = Instant::now();
    }

    pub fn should_send_keepalive(&self) -> bool {
        self.last_inbound.elapsed().as_secs() >= HEARTBEAT_SEND_AFTER_SILENCE_SECS
            && self.last_outbound.elapsed().as_secs() >= HEARTBEAT_SEND_AFTER_IDLE_SECS
    }

    pub fn is_dead(&self) -> bool {
        self.last_inbound.elapsed().as_secs() >= LIVENESS_TIMEOUT_SECS
    }
}

impl Default for LivenessClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_state_rejects_invalid_transition() {
        let handle = SessionHandle::new("s1".into(), SessionRole::Host, None);
        let err = handle.set_state(SessionState::Streaming).unwrap_err();
        assert_eq!(err.kind(), "transient");
        assert_eq!(handle.state(), SessionState::Dialing);
    }

    #[test]
    fn set_state_accepts_valid_transition() {
        let handle = SessionHandle::new("s1".into(), SessionRole::Host, None);
        handle.set_state(SessionState::Handshaking).unwrap();
        assert_eq!(handle.state(), SessionState::Handshaking);
    }

    #[test]
    fn cancel_to_draining_is_noop_from_terminal() {
        let handle = SessionHandle::new("s1".into(), SessionRole::Host, None);
        handle.close(ClosedReason::Clean);
        handle.cancel_to_draining();
        assert_eq!(handle.state(), SessionState::Closed);
    }
}
