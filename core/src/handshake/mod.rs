// Handshake module: per-role connection handshake over the BLE channel

pub mod machine;
pub mod session;
pub mod transition;

use crate::message::{CodecError, PeerIdentifier};
use crate::transport::Role;
use thiserror::Error;

pub use machine::HandshakeMachine;
pub use session::{HandshakeSession, HandshakeState, PendingRequest, SessionId};
pub use transition::{central_transition, peripheral_transition, Effect, SessionEvent, Step};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Handshake failures. None of them is fatal: the event is dropped and the
/// session keeps its previous state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HandshakeError {
    #[error("Unexpected {event} {}", describe_state(.state))]
    UnexpectedTransition {
        state: Option<HandshakeState>,
        event: String,
    },

    #[error("Already handshaking with {active}, ignoring connect to {requested}")]
    DuplicateConnectAttempt {
        active: PeerIdentifier,
        requested: PeerIdentifier,
    },

    #[error("Reply addressed to {received}, expected {expected}")]
    PeerMismatch {
        expected: PeerIdentifier,
        received: PeerIdentifier,
    },

    #[error("{operation} is not available to the {role} role")]
    WrongRole { operation: &'static str, role: Role },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

fn describe_state(state: &Option<HandshakeState>) -> String {
    match state {
        Some(state) => format!("in state {}", state),
        None => "with no session".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = HandshakeError::UnexpectedTransition {
            state: Some(HandshakeState::Accepted),
            event: "reject request".to_string(),
        };
        assert_eq!(error.to_string(), "Unexpected reject request in state Accepted");

        let error = HandshakeError::UnexpectedTransition {
            state: None,
            event: "message connection".to_string(),
        };
        assert_eq!(error.to_string(), "Unexpected message connection with no session");
    }
}
