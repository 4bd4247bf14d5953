// Per-role transition tables
//
// Each table maps (session, event) to the next session plus the side effects
// to run, or to an error. Tables never perform I/O: effects are returned as
// data and executed by the driver. On error the caller keeps the old session.

use super::session::{HandshakeSession, HandshakeState, PendingRequest, SessionId};
use super::HandshakeError;
use crate::handoff::EstablishedLink;
use crate::message::{InvitationRecords, PeerIdentifier, StandardMessage, Verb, WireMessage};
use crate::settings::{AcceptancePolicy, CentralSettings, PeripheralSettings, RequestStyle};
use crate::transport::Role;
use tracing::debug;

/// Inputs to a session's transition table
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Central chose this peer
    ConnectIssued,
    Connected,
    /// The Central's connection request left the device
    RequestSent,
    Received(WireMessage),
    InvitationCreated(String),
    /// The Peripheral's invitation line left the device
    InvitationDelivered,
    InvitationAccepted(InvitationRecords),
    /// The accepting reply left the device
    AcceptanceSent,
    /// Application decision on a pending Peripheral request
    AcceptRequest,
    RejectRequest,
    RetryInvitation,
    RetryRequest,
    Disconnected,
}

impl SessionEvent {
    pub fn label(&self) -> String {
        match self {
            SessionEvent::ConnectIssued => "connect".to_string(),
            SessionEvent::Connected => "connected".to_string(),
            SessionEvent::RequestSent => "request sent".to_string(),
            SessionEvent::Received(message) => format!("message {}", message.kind()),
            SessionEvent::InvitationCreated(_) => "invitation created".to_string(),
            SessionEvent::InvitationDelivered => "invitation delivered".to_string(),
            SessionEvent::InvitationAccepted(_) => "invitation accepted".to_string(),
            SessionEvent::AcceptanceSent => "acceptance sent".to_string(),
            SessionEvent::AcceptRequest => "accept request".to_string(),
            SessionEvent::RejectRequest => "reject request".to_string(),
            SessionEvent::RetryInvitation => "retry invitation".to_string(),
            SessionEvent::RetryRequest => "retry request".to_string(),
            SessionEvent::Disconnected => "disconnected".to_string(),
        }
    }
}

/// Side effects requested by a transition, executed in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Connect(PeerIdentifier),
    Send(WireMessage),
    /// Send, then report `RequestSent` for `session` on success
    SendConnectionRequest {
        session: SessionId,
        message: WireMessage,
    },
    /// Send, then report `InvitationDelivered` for `session` on success
    SendInvitation {
        session: SessionId,
        message: WireMessage,
    },
    /// Send, then report `AcceptanceSent` for `session` on success.
    /// Nothing is handed off until the reply is written.
    SendAcceptance {
        session: SessionId,
        message: WireMessage,
    },
    CreateInvitation {
        session: SessionId,
    },
    AcceptInvitation {
        session: SessionId,
        url: String,
    },
    /// A Peripheral request needs an accept/reject decision
    AwaitDecision {
        session: SessionId,
        peer: PeerIdentifier,
    },
    HandOff(EstablishedLink),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub next: HandshakeSession,
    pub effects: Vec<Effect>,
}

impl Step {
    fn stay(session: &HandshakeSession) -> Self {
        Self {
            next: session.clone(),
            effects: Vec::new(),
        }
    }

    fn ignore(session: &HandshakeSession, event: &SessionEvent) -> Self {
        debug!(
            "Session {} ignores duplicate {} in {}",
            session.id,
            event.label(),
            session.state
        );
        Self::stay(session)
    }

    fn to(session: &HandshakeSession, state: HandshakeState) -> Self {
        let mut next = session.clone();
        next.state = state;
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn hand_off(self) -> Self {
        let link = EstablishedLink::new(
            self.next.id,
            self.next.role,
            self.next.peer.clone(),
            self.next.invitation_url.clone(),
        );
        self.with(Effect::HandOff(link))
    }
}

fn unexpected(session: &HandshakeSession, event: &SessionEvent) -> HandshakeError {
    HandshakeError::UnexpectedTransition {
        state: Some(session.state),
        event: event.label(),
    }
}

/// Rules shared by both roles. `Some` settles the event.
fn common(
    role: Role,
    session: &HandshakeSession,
    event: &SessionEvent,
) -> Option<Result<Step, HandshakeError>> {
    // A disconnected session absorbs everything
    if session.state == HandshakeState::Disconnected {
        debug!("Session {} is disconnected, dropping {}", session.id, event.label());
        return Some(Ok(Step::stay(session)));
    }

    if *event == SessionEvent::Disconnected {
        if session.is_terminal() {
            return Some(Ok(Step::stay(session)));
        }
        return Some(Ok(Step::to(session, HandshakeState::Disconnected)));
    }

    if let SessionEvent::Received(message) = event {
        if message.sender() == role {
            return Some(Err(unexpected(session, event)));
        }
    }

    None
}

fn send_acceptance(session: &HandshakeSession, message: WireMessage) -> Step {
    let mut step = Step::stay(session);
    step.next.pending_acceptance = Some(message.clone());
    step.with(Effect::SendAcceptance {
        session: session.id,
        message,
    })
}

fn acceptance_sent(
    session: &HandshakeSession,
    event: &SessionEvent,
) -> Result<Step, HandshakeError> {
    if session.pending_acceptance.is_none() {
        return Err(unexpected(session, event));
    }
    let mut step = Step::to(session, HandshakeState::Accepted);
    step.next.pending_acceptance = None;
    step.next.pending_request = None;
    Ok(step.hand_off())
}

fn central_request(settings: &CentralSettings, session: &HandshakeSession) -> Effect {
    let message = match settings.request_style {
        RequestStyle::Addressed => WireMessage::command(Verb::Connection, session.peer.clone()),
        RequestStyle::Standard => WireMessage::Standard(StandardMessage::Invitation),
    };
    Effect::SendConnectionRequest {
        session: session.id,
        message,
    }
}

/// The argument of a Peripheral reply must echo the addressed request
fn check_echo(
    settings: &CentralSettings,
    session: &HandshakeSession,
    received: &PeerIdentifier,
) -> Result<(), HandshakeError> {
    if settings.request_style == RequestStyle::Addressed && *received != session.peer {
        return Err(HandshakeError::PeerMismatch {
            expected: session.peer.clone(),
            received: received.clone(),
        });
    }
    Ok(())
}

pub fn central_transition(
    session: &HandshakeSession,
    settings: &CentralSettings,
    event: SessionEvent,
) -> Result<Step, HandshakeError> {
    use HandshakeState::*;

    if let Some(settled) = common(Role::Central, session, &event) {
        return settled;
    }

    match (session.state, &event) {
        (Discovered, SessionEvent::ConnectIssued) => {
            Ok(Step::to(session, Connecting).with(Effect::Connect(session.peer.clone())))
        }

        (Connecting, SessionEvent::Connected) => {
            Ok(Step::to(session, Connected).with(central_request(settings, session)))
        }
        (Connected | InvitationSent | Accepted, SessionEvent::Connected) => {
            Ok(Step::ignore(session, &event))
        }

        (Connected, SessionEvent::RequestSent) => Ok(Step::to(session, InvitationSent)),
        (Connected, SessionEvent::RetryRequest) => {
            Ok(Step::stay(session).with(central_request(settings, session)))
        }

        (
            Connected | InvitationSent,
            SessionEvent::Received(WireMessage::Command { verb, peer }),
        ) => {
            check_echo(settings, session, peer)?;
            match (session.state, verb) {
                (_, Verb::Finished) => Ok(Step::to(session, Disconnected)),
                (InvitationSent, Verb::ConnectionAccepted) => {
                    Ok(Step::to(session, Accepted).hand_off())
                }
                (InvitationSent, Verb::ConnectionRejected) => Ok(Step::to(session, Rejected)),
                _ => Err(unexpected(session, &event)),
            }
        }

        (
            Accepted,
            SessionEvent::Received(WireMessage::Command {
                verb: Verb::ConnectionAccepted | Verb::Finished,
                peer,
            }),
        ) => {
            check_echo(settings, session, peer)?;
            Ok(Step::ignore(session, &event))
        }

        (
            InvitationSent,
            SessionEvent::Received(WireMessage::Standard(StandardMessage::AcceptInvitation)),
        ) => {
            debug!("Session {}: peripheral acknowledged the request", session.id);
            Ok(Step::stay(session))
        }

        (InvitationSent, SessionEvent::Received(WireMessage::Invitation(payload))) => {
            if session.invitation_url.is_some() {
                return Ok(Step::ignore(session, &event));
            }
            let mut step = Step::stay(session);
            step.next.invitation_url = Some(payload.invitation_url.clone());
            Ok(step.with(Effect::AcceptInvitation {
                session: session.id,
                url: payload.invitation_url.clone(),
            }))
        }
        (Accepted, SessionEvent::Received(WireMessage::Invitation(_))) => {
            Ok(Step::ignore(session, &event))
        }

        (InvitationSent, SessionEvent::InvitationAccepted(records)) => {
            if session.invitation_url.is_none() {
                return Err(unexpected(session, &event));
            }
            if session.pending_acceptance.is_some() {
                return Ok(Step::ignore(session, &event));
            }
            Ok(send_acceptance(
                session,
                WireMessage::InvitationSuccess(records.clone()),
            ))
        }
        (InvitationSent, SessionEvent::AcceptanceSent) => acceptance_sent(session, &event),

        (InvitationSent, SessionEvent::RetryInvitation) => {
            match (&session.pending_acceptance, &session.invitation_url) {
                (Some(message), _) => Ok(send_acceptance(session, message.clone())),
                (None, Some(url)) => Ok(Step::stay(session).with(Effect::AcceptInvitation {
                    session: session.id,
                    url: url.clone(),
                })),
                (None, None) => Err(unexpected(session, &event)),
            }
        }

        _ => Err(unexpected(session, &event)),
    }
}

fn start_invitation(session: &HandshakeSession, request: &PendingRequest) -> Step {
    let mut step = Step::to(session, HandshakeState::InvitationSent);
    step.next.invitation_scheduled = true;
    step.next.pending_request = None;
    if *request == PendingRequest::Standard {
        step = step.with(Effect::Send(WireMessage::Standard(
            StandardMessage::AcceptInvitation,
        )));
    }
    step.with(Effect::CreateInvitation {
        session: session.id,
    })
}

fn on_request(
    settings: &PeripheralSettings,
    session: &HandshakeSession,
    request: PendingRequest,
    event: &SessionEvent,
) -> Step {
    if session.invitation_scheduled || session.pending_request.is_some() {
        return Step::ignore(session, event);
    }

    match settings.acceptance {
        AcceptancePolicy::Automatic => start_invitation(session, &request),
        AcceptancePolicy::Manual => {
            let mut step = Step::stay(session);
            step.next.pending_request = Some(request);
            step.with(Effect::AwaitDecision {
                session: session.id,
                peer: session.peer.clone(),
            })
        }
    }
}

pub fn peripheral_transition(
    session: &HandshakeSession,
    settings: &PeripheralSettings,
    event: SessionEvent,
) -> Result<Step, HandshakeError> {
    use HandshakeState::*;

    if let Some(settled) = common(Role::Peripheral, session, &event) {
        return settled;
    }

    match (session.state, &event) {
        (Connected | InvitationSent | Accepted, SessionEvent::Connected) => {
            Ok(Step::ignore(session, &event))
        }

        (
            Connected,
            SessionEvent::Received(WireMessage::Command {
                verb: Verb::Connection,
                peer,
            }),
        ) => Ok(on_request(
            settings,
            session,
            PendingRequest::Addressed(peer.clone()),
            &event,
        )),
        (Connected, SessionEvent::Received(WireMessage::Standard(StandardMessage::Invitation))) => {
            Ok(on_request(settings, session, PendingRequest::Standard, &event))
        }
        (
            InvitationSent | Accepted,
            SessionEvent::Received(
                WireMessage::Command {
                    verb: Verb::Connection,
                    ..
                }
                | WireMessage::Standard(StandardMessage::Invitation),
            ),
        ) => Ok(Step::ignore(session, &event)),

        (Connected, SessionEvent::AcceptRequest) => match &session.pending_request {
            Some(PendingRequest::Addressed(echo)) => Ok(send_acceptance(
                session,
                WireMessage::command(Verb::ConnectionAccepted, echo.clone()),
            )),
            Some(request @ PendingRequest::Standard) => Ok(start_invitation(session, request)),
            None => Err(unexpected(session, &event)),
        },
        (Connected, SessionEvent::AcceptanceSent) => acceptance_sent(session, &event),

        (Connected, SessionEvent::RejectRequest) => {
            let echo = match &session.pending_request {
                Some(PendingRequest::Addressed(echo)) => echo.clone(),
                Some(PendingRequest::Standard) => session.peer.clone(),
                None => return Err(unexpected(session, &event)),
            };
            let mut step = Step::to(session, Rejected);
            step.next.pending_request = None;
            step.next.pending_acceptance = None;
            Ok(step.with(Effect::Send(WireMessage::command(
                Verb::ConnectionRejected,
                echo,
            ))))
        }

        (InvitationSent, SessionEvent::InvitationCreated(url)) => {
            if session.invitation_url.is_some() {
                return Ok(Step::ignore(session, &event));
            }
            let mut step = Step::stay(session);
            step.next.invitation_url = Some(url.clone());
            Ok(step.with(Effect::SendInvitation {
                session: session.id,
                message: WireMessage::invitation(url.clone()),
            }))
        }
        (InvitationSent, SessionEvent::InvitationDelivered) => {
            let mut step = Step::stay(session);
            step.next.invitation_delivered = true;
            Ok(step)
        }

        (InvitationSent, SessionEvent::RetryInvitation) => {
            match (&session.invitation_url, session.invitation_delivered) {
                (None, _) => Ok(Step::stay(session).with(Effect::CreateInvitation {
                    session: session.id,
                })),
                // Minted but never written: resend the same URL
                (Some(url), false) => Ok(Step::stay(session).with(Effect::SendInvitation {
                    session: session.id,
                    message: WireMessage::invitation(url.clone()),
                })),
                (Some(_), true) => Err(unexpected(session, &event)),
            }
        }

        (InvitationSent, SessionEvent::Received(WireMessage::InvitationSuccess(_))) => {
            if session.invitation_url.is_none() {
                return Err(unexpected(session, &event));
            }
            Ok(Step::to(session, Accepted).hand_off())
        }
        (Accepted, SessionEvent::Received(WireMessage::InvitationSuccess(_))) => {
            Ok(Step::ignore(session, &event))
        }

        _ => Err(unexpected(session, &event)),
    }
}
