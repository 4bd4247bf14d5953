// Handshake session: one attempt at bootstrapping a connection with one peer

use crate::message::{PeerIdentifier, WireMessage};
use crate::transport::Role;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token identifying one session instance.
///
/// Completions of asynchronous work carry the token they were started
/// under; a completion whose token no longer matches is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandshakeState {
    Discovered,
    Connecting,
    Connected,
    InvitationSent,
    Accepted,
    Rejected,
    Disconnected,
}

impl HandshakeState {
    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Accepted | HandshakeState::Rejected | HandshakeState::Disconnected
        )
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Discovered => "Discovered",
            HandshakeState::Connecting => "Connecting",
            HandshakeState::Connected => "Connected",
            HandshakeState::InvitationSent => "InvitationSent",
            HandshakeState::Accepted => "Accepted",
            HandshakeState::Rejected => "Rejected",
            HandshakeState::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}

/// A Peripheral-side connection request waiting for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingRequest {
    /// `connection <peer>`; the argument is echoed back in the reply
    Addressed(PeerIdentifier),
    /// `<STD>0`
    Standard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeSession {
    pub id: SessionId,
    pub role: Role,
    pub peer: PeerIdentifier,
    pub state: HandshakeState,
    /// Peripheral: the invitation has been scheduled. Never reset.
    pub invitation_scheduled: bool,
    /// Invitation sent (Peripheral) or being accepted (Central)
    pub invitation_url: Option<String>,
    /// Peripheral: the invitation line reached the channel
    pub invitation_delivered: bool,
    pub pending_request: Option<PendingRequest>,
    /// Accepting reply in flight. The session accepts once it is written.
    pub pending_acceptance: Option<WireMessage>,
}

impl HandshakeSession {
    pub fn new(id: SessionId, role: Role, peer: PeerIdentifier, state: HandshakeState) -> Self {
        Self {
            id,
            role,
            peer,
            state,
            invitation_scheduled: false,
            invitation_url: None,
            invitation_delivered: false,
            pending_request: None,
            pending_acceptance: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(HandshakeState::Accepted.is_terminal());
        assert!(HandshakeState::Rejected.is_terminal());
        assert!(HandshakeState::Disconnected.is_terminal());
        assert!(!HandshakeState::InvitationSent.is_terminal());
        assert!(!HandshakeState::Discovered.is_terminal());
    }

    #[test]
    fn test_new_session_defaults() {
        let session = HandshakeSession::new(
            SessionId::new(7),
            Role::Peripheral,
            PeerIdentifier::new("AA:BB:CC").expect("id"),
            HandshakeState::Connected,
        );
        assert_eq!(session.id.to_string(), "#7");
        assert!(!session.invitation_scheduled);
        assert!(session.invitation_url.is_none());
        assert!(session.pending_request.is_none());
        assert!(session.pending_acceptance.is_none());
        assert!(!session.invitation_delivered);
    }
}
