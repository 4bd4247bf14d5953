// Handshake machine: routes adapter events and async completions to the
// active session's transition table
//
// Owns at most one session per adapter. Terminal sessions stay readable
// until the next session replaces them. All methods are synchronous; the
// returned effects are for the driver to execute in order.

use super::session::{HandshakeSession, HandshakeState, SessionId};
use super::transition::{central_transition, peripheral_transition, Effect, SessionEvent};
use super::HandshakeError;
use crate::message::{decode_message, InvitationRecords, PeerIdentifier, WireMessage};
use crate::settings::{BootstrapSettings, CentralSettings, PeripheralSettings};
use crate::transport::{AdapterEvent, Role, ScanList, ScanStatus};
use tracing::{debug, info};

pub struct HandshakeMachine {
    role: Role,
    central: CentralSettings,
    peripheral: PeripheralSettings,
    session: Option<HandshakeSession>,
    scans: ScanList,
    last_session_id: u64,
}

impl HandshakeMachine {
    pub fn new(role: Role, central: CentralSettings, peripheral: PeripheralSettings) -> Self {
        Self {
            role,
            central,
            peripheral,
            session: None,
            scans: ScanList::new(),
            last_session_id: 0,
        }
    }

    pub fn from_settings(settings: &BootstrapSettings) -> Self {
        Self::new(settings.role, settings.central, settings.peripheral)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Latest session, terminal or not
    pub fn session(&self) -> Option<&HandshakeSession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> Option<HandshakeState> {
        self.session.as_ref().map(|s| s.state)
    }

    /// The session still in progress, if any
    pub fn active_session(&self) -> Option<&HandshakeSession> {
        self.session.as_ref().filter(|s| !s.is_terminal())
    }

    pub fn scan_results(&self) -> &ScanList {
        &self.scans
    }

    /// Whether completions for `id` still apply
    pub fn is_current(&self, id: SessionId) -> bool {
        self.active_session().map(|s| s.id) == Some(id)
    }

    fn open_session(&mut self, peer: PeerIdentifier, state: HandshakeState) -> SessionId {
        self.last_session_id += 1;
        let id = SessionId::new(self.last_session_id);
        info!("{} session {} opened with {}", self.role, id, peer);
        self.session = Some(HandshakeSession::new(id, self.role, peer, state));
        id
    }

    fn no_session(&self, event: &SessionEvent) -> HandshakeError {
        HandshakeError::UnexpectedTransition {
            state: self.state(),
            event: event.label(),
        }
    }

    fn apply(&mut self, event: SessionEvent) -> Result<Vec<Effect>, HandshakeError> {
        let session = match self.session.as_ref() {
            Some(session) => session,
            None => return Err(self.no_session(&event)),
        };

        let step = match self.role {
            Role::Central => central_transition(session, &self.central, event)?,
            Role::Peripheral => peripheral_transition(session, &self.peripheral, event)?,
        };

        if step.next.state != session.state {
            info!(
                "{} session {} with {}: {} -> {}",
                self.role, session.id, session.peer, session.state, step.next.state
            );
            if self.role == Role::Central && step.next.state == HandshakeState::Rejected {
                self.scans.set_status(&step.next.peer, ScanStatus::Rejected);
            }
        }

        self.session = Some(step.next);
        Ok(step.effects)
    }

    fn apply_for(
        &mut self,
        id: SessionId,
        event: SessionEvent,
    ) -> Result<Vec<Effect>, HandshakeError> {
        if !self.is_current(id) {
            debug!("Discarding {} for stale session {}", event.label(), id);
            return Ok(Vec::new());
        }
        self.apply(event)
    }

    // ------------------------------------------------------------------
    // Adapter events
    // ------------------------------------------------------------------

    pub fn handle_event(&mut self, event: AdapterEvent) -> Result<Vec<Effect>, HandshakeError> {
        match event {
            AdapterEvent::Discovered(peer) => self.on_discovered(peer),
            AdapterEvent::Connected(peer) => self.on_connected(peer),
            AdapterEvent::Disconnected(peer) => self.on_disconnected(peer),
            AdapterEvent::MessageReceived(line) => {
                let message = decode_message(&line)?;
                self.on_message(message)
            }
        }
    }

    fn on_discovered(&mut self, peer: PeerIdentifier) -> Result<Vec<Effect>, HandshakeError> {
        if self.role != Role::Central {
            debug!("Peripheral ignores discovery of {}", peer);
            return Ok(Vec::new());
        }

        let first_sighting = self.scans.record(peer.clone());

        if let Some(active) = self.active_session() {
            if active.peer != peer {
                debug!(
                    "Recorded {} while session {} with {} is active",
                    peer, active.id, active.peer
                );
            }
            return Ok(Vec::new());
        }

        if self.central.auto_connect && first_sighting {
            return self.connect(peer);
        }
        Ok(Vec::new())
    }

    fn on_connected(&mut self, peer: PeerIdentifier) -> Result<Vec<Effect>, HandshakeError> {
        let matches_active = self.active_session().map(|s| s.peer == peer);

        match (self.role, matches_active) {
            (_, Some(true)) => self.apply(SessionEvent::Connected),
            (Role::Peripheral, None) => {
                self.open_session(peer, HandshakeState::Connected);
                Ok(Vec::new())
            }
            // Unsolicited link (Central) or a second central (Peripheral)
            _ => Err(HandshakeError::UnexpectedTransition {
                state: self.state(),
                event: format!("connected from {}", peer),
            }),
        }
    }

    fn on_disconnected(&mut self, peer: PeerIdentifier) -> Result<Vec<Effect>, HandshakeError> {
        match self.active_session() {
            Some(active) if active.peer == peer => self.apply(SessionEvent::Disconnected),
            _ => {
                debug!("Disconnect of {} does not affect any active session", peer);
                Ok(Vec::new())
            }
        }
    }

    fn on_message(&mut self, message: WireMessage) -> Result<Vec<Effect>, HandshakeError> {
        debug!("{} received {}", self.role, message.kind());
        self.apply(SessionEvent::Received(message))
    }

    // ------------------------------------------------------------------
    // Application commands
    // ------------------------------------------------------------------

    /// Central: start a handshake with a discovered peer
    pub fn connect(&mut self, peer: PeerIdentifier) -> Result<Vec<Effect>, HandshakeError> {
        if self.role != Role::Central {
            return Err(HandshakeError::WrongRole {
                operation: "connect",
                role: self.role,
            });
        }
        if let Some(active) = self.active_session() {
            return Err(HandshakeError::DuplicateConnectAttempt {
                active: active.peer.clone(),
                requested: peer,
            });
        }

        self.scans.record(peer.clone());
        self.scans.set_status(&peer, ScanStatus::Accepted);
        self.open_session(peer, HandshakeState::Discovered);
        self.apply(SessionEvent::ConnectIssued)
    }

    /// Peripheral: accept the pending connection request. Repeatable until the reply is written.
    pub fn accept_request(&mut self) -> Result<Vec<Effect>, HandshakeError> {
        self.apply(SessionEvent::AcceptRequest)
    }

    /// Peripheral: decline the pending connection request
    pub fn reject_request(&mut self) -> Result<Vec<Effect>, HandshakeError> {
        self.apply(SessionEvent::RejectRequest)
    }

    /// Re-run the agent operation or the send that failed for the active session
    pub fn retry_invitation(&mut self) -> Result<Vec<Effect>, HandshakeError> {
        self.apply(SessionEvent::RetryInvitation)
    }

    /// Central: send the connection request again after a failed send
    pub fn retry_connection_request(&mut self) -> Result<Vec<Effect>, HandshakeError> {
        self.apply(SessionEvent::RetryRequest)
    }

    /// Mark the active session disconnected. Returns its id.
    pub fn teardown(&mut self) -> Option<SessionId> {
        let id = self.active_session()?.id;
        if let Err(e) = self.apply(SessionEvent::Disconnected) {
            debug!("Teardown of session {}: {}", id, e);
        }
        Some(id)
    }

    // ------------------------------------------------------------------
    // Async completions
    // ------------------------------------------------------------------

    pub fn request_sent(&mut self, id: SessionId) -> Result<Vec<Effect>, HandshakeError> {
        self.apply_for(id, SessionEvent::RequestSent)
    }

    pub fn invitation_created(
        &mut self,
        id: SessionId,
        url: String,
    ) -> Result<Vec<Effect>, HandshakeError> {
        self.apply_for(id, SessionEvent::InvitationCreated(url))
    }

    pub fn invitation_delivered(&mut self, id: SessionId) -> Result<Vec<Effect>, HandshakeError> {
        self.apply_for(id, SessionEvent::InvitationDelivered)
    }

    pub fn invitation_accepted(
        &mut self,
        id: SessionId,
        records: InvitationRecords,
    ) -> Result<Vec<Effect>, HandshakeError> {
        self.apply_for(id, SessionEvent::InvitationAccepted(records))
    }

    /// The accepting reply was written; only now is the session Accepted
    pub fn acceptance_sent(&mut self, id: SessionId) -> Result<Vec<Effect>, HandshakeError> {
        self.apply_for(id, SessionEvent::AcceptanceSent)
    }
}
