//! The per-session state machine table (spec §4.7). Kept as a pure,
//! synchronous transition-validity check so the table itself is testable in
//! isolation from the async I/O that drives it (host.rs / consumer.rs).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Dialing,
    Handshaking,
    AwaitingAuth,
    Streaming,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionRole {
    Host,
    Consumer,
}

/// Why a session reached Closed, carried alongside the terminal state for
/// UI reporting (spec §7: "UI-visible messages identify the peer, the
/// device, and the kind").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosedReason {
    Clean,
    Error(String),
    Refused(String),
}

impl SessionState {
    /// `true` iff spec §4.7's table permits `self -> next`. Used both by
    /// [`super::Session::set_state`] at runtime and directly by tests
    /// asserting the table's shape (P properties in spec §8 depend on this
    /// being exhaustively correct, not just "probably fine").
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Dialing, Handshaking)
                | (Dialing, Closed)
                | (Handshaking, AwaitingAuth)
                | (Handshaking, Closed)
                | (AwaitingAuth, Streaming)
                | (AwaitingAuth, Closed)
                | (Streaming, Draining)
                | (Draining, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// External `stop()`/SIGTERM transitions any pre-terminal state straight
    /// to Draining (spec §4.7 cancellation row, §5 cancellation semantics).
    pub fn can_cancel_to_draining(self) -> bool {
        !self.is_terminal() && self != SessionState::Draining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn happy_path_sequence_is_all_valid_transitions() {
        let sequence = [Dialing, Handshaking, AwaitingAuth, Streaming, Draining, Closed];
        for pair in sequence.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{:?} -> {:?} should be valid",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn closed_is_terminal_and_accepts_nothing() {
        for state in [Dialing, Handshaking, AwaitingAuth, Streaming, Draining, Closed] {
            assert!(!Closed.can_transition_to(state));
        }
    }

    #[test]
    fn every_pre_terminal_state_can_cancel_to_draining() {
        for state in [Dialing, Handshaking, AwaitingAuth, Streaming] {
            assert!(state.can_cancel_to_draining());
        }
        assert!(!Draining.can_cancel_to_draining());
        assert!(!Closed.can_cancel_to_draining());
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!Dialing.can_transition_to(Streaming));
        assert!(!Handshaking.can_transition_to(Draining));
        assert!(!AwaitingAuth.can_transition_to(Handshaking));
    }
}
