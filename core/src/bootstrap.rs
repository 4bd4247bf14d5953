//! Bootstrap driver: runs one role's side of the BLE handshake
//!
//! The driver owns the role adapter and the handshake machine. It brings the
//! adapter up (start → configure → scan/advertise), then multiplexes:
//! - normalized adapter events
//! - completions of in-flight agent operations
//! - commands from a [`DriverHandle`]
//! - the optional handshake timeout
//!
//! Effects of one event run to completion before the next event is polled.
//! The run ends when the session is accepted and handed off, rejected,
//! disconnected, timed out or cancelled.

use crate::app_error::{report, AppError, ErrorSink};
use crate::handoff::{EstablishedLink, SessionHandoff};
use crate::handshake::{Effect, HandshakeError, HandshakeMachine, HandshakeState, SessionId};
use crate::invitation::{AgentBridge, InvitationError};
use crate::message::{encode_message, InvitationRecords, PeerIdentifier, WireMessage};
use crate::settings::BootstrapSettings;
use crate::transport::{AdapterEvent, BlePlatformBridge, BleRoleAdapter, Role};
use crate::BootstrapError;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Capacity of the command channel between handle and driver
const COMMAND_BUFFER: usize = 32;

/// How a bootstrap run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Accepted and handed to the agent; the BLE link stays up
    Established(EstablishedLink),
    Rejected(PeerIdentifier),
    Disconnected(PeerIdentifier),
    TimedOut,
    Cancelled,
}

/// Progress reports for the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapNotice {
    Discovered(PeerIdentifier),
    StateChanged {
        session: SessionId,
        state: HandshakeState,
    },
    /// A Peripheral request waits for `accept_request`/`reject_request`
    AwaitingDecision {
        session: SessionId,
        peer: PeerIdentifier,
    },
}

type Reply = mpsc::Sender<Result<(), HandshakeError>>;

/// Commands sent to the driver through a DriverHandle
#[derive(Debug)]
pub enum DriverCommand {
    Connect { peer: PeerIdentifier, reply: Reply },
    AcceptRequest { reply: Reply },
    RejectRequest { reply: Reply },
    RetryInvitation { reply: Reply },
    RetryConnectionRequest { reply: Reply },
    /// End the run with `BootstrapOutcome::Cancelled`
    Shutdown,
}

/// Handle for talking to a running driver
#[derive(Clone)]
pub struct DriverHandle {
    command_tx: mpsc::Sender<DriverCommand>,
}

impl DriverHandle {
    async fn request(
        &self,
        command: impl FnOnce(Reply) -> DriverCommand,
    ) -> Result<(), BootstrapError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| BootstrapError::DriverStopped)?;

        reply_rx
            .recv()
            .await
            .ok_or(BootstrapError::DriverStopped)?
            .map_err(BootstrapError::from)
    }

    /// Central: handshake with a discovered peer
    pub async fn connect(&self, peer: PeerIdentifier) -> Result<(), BootstrapError> {
        self.request(|reply| DriverCommand::Connect { peer, reply })
            .await
    }

    /// Peripheral: accept the pending request
    pub async fn accept_request(&self) -> Result<(), BootstrapError> {
        self.request(|reply| DriverCommand::AcceptRequest { reply })
            .await
    }

    /// Peripheral: decline the pending request
    pub async fn reject_request(&self) -> Result<(), BootstrapError> {
        self.request(|reply| DriverCommand::RejectRequest { reply })
            .await
    }

    /// Re-run a failed invitation create/accept, or resend an unwritten line
    pub async fn retry_invitation(&self) -> Result<(), BootstrapError> {
        self.request(|reply| DriverCommand::RetryInvitation { reply })
            .await
    }

    /// Central: re-send a connection request whose send failed
    pub async fn retry_connection_request(&self) -> Result<(), BootstrapError> {
        self.request(|reply| DriverCommand::RetryConnectionRequest { reply })
            .await
    }

    pub async fn shutdown(&self) -> Result<(), BootstrapError> {
        self.command_tx
            .send(DriverCommand::Shutdown)
            .await
            .map_err(|_| BootstrapError::DriverStopped)
    }
}

enum AgentCompletion {
    Created {
        session: SessionId,
        result: Result<String, InvitationError>,
    },
    Accepted {
        session: SessionId,
        result: Result<InvitationRecords, InvitationError>,
    },
}

type PendingOps = FuturesUnordered<BoxFuture<'static, AgentCompletion>>;

pub struct BootstrapDriver {
    settings: BootstrapSettings,
    adapter: BleRoleAdapter,
    machine: HandshakeMachine,
    agent: Arc<dyn AgentBridge>,
    handoff: Arc<dyn SessionHandoff>,
    errors: ErrorSink,
    notices: Option<mpsc::UnboundedSender<BootstrapNotice>>,
    commands: Option<mpsc::Receiver<DriverCommand>>,
}

impl BootstrapDriver {
    pub fn new(
        settings: BootstrapSettings,
        bridge: Arc<dyn BlePlatformBridge>,
        agent: Arc<dyn AgentBridge>,
        handoff: Arc<dyn SessionHandoff>,
        errors: ErrorSink,
    ) -> Result<(Self, DriverHandle), BootstrapError> {
        settings.validate()?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let driver = Self {
            adapter: BleRoleAdapter::new(settings.role, bridge),
            machine: HandshakeMachine::from_settings(&settings),
            settings,
            agent,
            handoff,
            errors,
            notices: None,
            commands: Some(command_rx),
        };
        Ok((driver, DriverHandle { command_tx }))
    }

    pub fn role(&self) -> Role {
        self.machine.role()
    }

    /// Receive progress notices. Replaces any earlier receiver.
    pub fn subscribe_notices(&mut self) -> mpsc::UnboundedReceiver<BootstrapNotice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.notices = Some(tx);
        rx
    }

    /// Run the handshake to completion
    pub async fn run(mut self) -> Result<BootstrapOutcome, BootstrapError> {
        let role = self.role();
        info!(
            "Starting {} bootstrap ({} verification)",
            role, self.settings.verification
        );

        if let Err(e) = self.adapter.start().await {
            report(&self.errors, AppError::transport_unavailable(&e));
            return Err(e.into());
        }

        let channel = self.settings.active_channel();
        if let Err(e) = self.adapter.configure_channel(&channel).await {
            report(&self.errors, AppError::channel_configuration(&e));
            self.stop_adapter().await;
            return Err(e.into());
        }

        let (subscription, mut events) = self.adapter.subscribe();

        let begun = match role {
            Role::Central => self.adapter.scan().await,
            Role::Peripheral => self.adapter.advertise().await,
        };
        if let Err(e) = begun {
            report(&self.errors, AppError::transport_unavailable(&e));
            drop(subscription);
            self.stop_adapter().await;
            return Err(e.into());
        }

        let result = self.event_loop(&mut events).await;
        drop(subscription);

        match &result {
            Ok(BootstrapOutcome::Established(link)) => {
                info!("{} bootstrap established with {}", role, link.peer);
            }
            other => {
                debug!("{} bootstrap ended: {:?}", role, other);
                if let Some(id) = self.machine.teardown() {
                    debug!("Session {} torn down", id);
                }
                self.stop_adapter().await;
            }
        }
        result
    }

    async fn stop_adapter(&self) {
        if let Err(e) = self.adapter.shutdown().await {
            warn!("Adapter shutdown failed: {}", e);
        }
    }

    async fn event_loop(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<AdapterEvent>,
    ) -> Result<BootstrapOutcome, BootstrapError> {
        let mut pending = PendingOps::new();
        let mut commands = self.commands.take();

        let timeout = self.settings.handshake_timeout();
        let deadline = async move {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => futures::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            let before = self.machine.session().map(|s| (s.id, s.state));

            let effects = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        debug!("Adapter event: {}", event);
                        if let AdapterEvent::Discovered(peer) = &event {
                            self.notify(BootstrapNotice::Discovered(peer.clone()));
                        }
                        absorb(self.machine.handle_event(event))
                    }
                    None => {
                        warn!("Adapter event stream closed");
                        return Ok(BootstrapOutcome::Cancelled);
                    }
                },

                Some(completion) = pending.next(), if !pending.is_empty() => {
                    self.complete(completion)
                }

                command = next_command(&mut commands) => match command {
                    Some(DriverCommand::Shutdown) => {
                        info!("Bootstrap cancelled");
                        return Ok(BootstrapOutcome::Cancelled);
                    }
                    Some(command) => self.command(command),
                    None => {
                        debug!("All driver handles dropped");
                        commands = None;
                        Vec::new()
                    }
                },

                _ = &mut deadline => {
                    warn!("Handshake timed out after {}s", self.settings.handshake_timeout_secs);
                    return Ok(BootstrapOutcome::TimedOut);
                }
            };

            let established = self.execute(effects, &mut pending).await?;
            self.notify_state_change(before);

            if let Some(link) = established {
                return Ok(BootstrapOutcome::Established(link));
            }
            if let Some(outcome) = self.settled() {
                return Ok(outcome);
            }
        }
    }

    /// Outcome of a session that ended without a handoff
    fn settled(&self) -> Option<BootstrapOutcome> {
        let session = self.machine.session()?;
        match session.state {
            HandshakeState::Rejected => Some(BootstrapOutcome::Rejected(session.peer.clone())),
            HandshakeState::Disconnected => {
                Some(BootstrapOutcome::Disconnected(session.peer.clone()))
            }
            _ => None,
        }
    }

    fn notify(&self, notice: BootstrapNotice) {
        if let Some(notices) = &self.notices {
            let _ = notices.send(notice);
        }
    }

    fn notify_state_change(&self, before: Option<(SessionId, HandshakeState)>) {
        if let Some(session) = self.machine.session() {
            if before != Some((session.id, session.state)) {
                self.notify(BootstrapNotice::StateChanged {
                    session: session.id,
                    state: session.state,
                });
            }
        }
    }

    fn command(&mut self, command: DriverCommand) -> Vec<Effect> {
        match command {
            DriverCommand::Connect { peer, reply } => respond(reply, self.machine.connect(peer)),
            DriverCommand::AcceptRequest { reply } => {
                respond(reply, self.machine.accept_request())
            }
            DriverCommand::RejectRequest { reply } => {
                respond(reply, self.machine.reject_request())
            }
            DriverCommand::RetryInvitation { reply } => {
                respond(reply, self.machine.retry_invitation())
            }
            DriverCommand::RetryConnectionRequest { reply } => {
                respond(reply, self.machine.retry_connection_request())
            }
            DriverCommand::Shutdown => Vec::new(),
        }
    }

    fn complete(&mut self, completion: AgentCompletion) -> Vec<Effect> {
        match completion {
            AgentCompletion::Created {
                session,
                result: Ok(url),
            } => absorb(self.machine.invitation_created(session, url)),
            AgentCompletion::Created {
                session,
                result: Err(e),
            } => {
                if self.machine.is_current(session) {
                    report(&self.errors, AppError::invitation_creation(&e));
                } else {
                    debug!("Dropping invitation failure for stale session {}", session);
                }
                Vec::new()
            }
            AgentCompletion::Accepted {
                session,
                result: Ok(records),
            } => absorb(self.machine.invitation_accepted(session, records)),
            AgentCompletion::Accepted {
                session,
                result: Err(e),
            } => {
                if self.machine.is_current(session) {
                    report(&self.errors, AppError::invitation_acceptance(&e));
                } else {
                    debug!("Dropping acceptance failure for stale session {}", session);
                }
                Vec::new()
            }
        }
    }

    async fn send(&self, message: &WireMessage) -> Result<(), BootstrapError> {
        let line = encode_message(message)?;
        self.adapter.send_message(&line).await?;
        debug!("Sent {}", message.kind());
        Ok(())
    }

    /// Run effects in order. Returns the handed-off link, if any.
    async fn execute(
        &mut self,
        effects: Vec<Effect>,
        pending: &mut PendingOps,
    ) -> Result<Option<EstablishedLink>, BootstrapError> {
        let mut queue: VecDeque<Effect> = effects.into();
        let mut established = None;

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Connect(peer) => {
                    if let Err(e) = self.adapter.connect(&peer).await {
                        warn!("Connect to {} failed: {}", peer, e);
                        queue.extend(absorb(
                            self.machine.handle_event(AdapterEvent::Disconnected(peer)),
                        ));
                    }
                }

                Effect::Send(message) => {
                    if let Err(e) = self.send(&message).await {
                        warn!("Send of {} failed: {}", message.kind(), e);
                    }
                }

                Effect::SendConnectionRequest { session, message } => {
                    match self.send(&message).await {
                        Ok(()) => queue.extend(absorb(self.machine.request_sent(session))),
                        Err(e) => warn!(
                            "Connection request for session {} not sent: {}",
                            session, e
                        ),
                    }
                }

                Effect::SendInvitation { session, message } => match self.send(&message).await {
                    Ok(()) => queue.extend(absorb(self.machine.invitation_delivered(session))),
                    Err(e) => warn!("Invitation for session {} not sent: {}", session, e),
                },

                Effect::SendAcceptance { session, message } => match self.send(&message).await {
                    Ok(()) => queue.extend(absorb(self.machine.acceptance_sent(session))),
                    // Session stays short of Accepted; nothing is handed off
                    Err(e) => warn!("Acceptance for session {} not sent: {}", session, e),
                },

                Effect::CreateInvitation { session } => {
                    let agent = Arc::clone(&self.agent);
                    pending.push(Box::pin(async move {
                        let result = agent.create_invitation_url().await;
                        AgentCompletion::Created { session, result }
                    }));
                }

                Effect::AcceptInvitation { session, url } => {
                    let agent = Arc::clone(&self.agent);
                    pending.push(Box::pin(async move {
                        let result = agent.receive_invitation_from_url(&url).await;
                        AgentCompletion::Accepted { session, result }
                    }));
                }

                Effect::AwaitDecision { session, peer } => {
                    info!("Session {}: request from {} awaits a decision", session, peer);
                    self.notify(BootstrapNotice::AwaitingDecision { session, peer });
                }

                Effect::HandOff(link) => {
                    if let Err(e) = self.handoff.hand_off(link.clone()).await {
                        report(&self.errors, AppError::agent_initialization(&e));
                        return Err(e.into());
                    }
                    info!(
                        "Session {} with {} handed off ({:?})",
                        link.session, link.peer, link.direction
                    );
                    established = Some(link);
                }
            }
        }

        Ok(established)
    }
}

async fn next_command(
    commands: &mut Option<mpsc::Receiver<DriverCommand>>,
) -> Option<DriverCommand> {
    match commands {
        Some(rx) => rx.recv().await,
        None => futures::future::pending().await,
    }
}

/// Log a rejected event and carry on with no effects
fn absorb(result: Result<Vec<Effect>, HandshakeError>) -> Vec<Effect> {
    match result {
        Ok(effects) => effects,
        Err(e @ HandshakeError::DuplicateConnectAttempt { .. }) => {
            warn!("{}", e);
            Vec::new()
        }
        Err(HandshakeError::Codec(e)) => {
            warn!("Dropping malformed message: {}", e);
            Vec::new()
        }
        Err(e) => {
            warn!("Ignoring event: {}", e);
            Vec::new()
        }
    }
}

fn respond(reply: Reply, result: Result<Vec<Effect>, HandshakeError>) -> Vec<Effect> {
    match result {
        Ok(effects) => {
            let _ = reply.try_send(Ok(()));
            effects
        }
        Err(e) => {
            warn!("Command refused: {}", e);
            let _ = reply.try_send(Err(e));
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_error::{codes, error_channel};
    use crate::handoff::{HandoffError, MockSessionHandoff, RecordingHandoff};
    use crate::invitation::MockAgentBridge;
    use crate::settings::{AcceptancePolicy, RequestStyle};
    use crate::transport::LoopbackLink;
    use mockall::Sequence;
    use serde_json::json;
    use std::time::Duration;

    const URL: &str = "http://localhost:3000?oob=abc";

    fn records() -> InvitationRecords {
        InvitationRecords {
            out_of_band_record: json!({"id": "oob-1"}),
            connection_record: json!({"id": "conn-1"}),
        }
    }

    fn creating_agent() -> MockAgentBridge {
        let mut agent = MockAgentBridge::new();
        agent
            .expect_create_invitation_url()
            .returning(|| Ok(URL.to_string()));
        agent
    }

    fn accepting_agent() -> MockAgentBridge {
        let mut agent = MockAgentBridge::new();
        agent
            .expect_receive_invitation_from_url()
            .withf(|url| url.to_string() == URL)
            .returning(|_| Ok(records()));
        agent
    }

    fn settings(role: Role) -> BootstrapSettings {
        BootstrapSettings {
            handshake_timeout_secs: 0,
            ..BootstrapSettings::for_role(role)
        }
    }

    fn driver(
        settings: BootstrapSettings,
        link: &LoopbackLink,
        agent: impl AgentBridge + 'static,
        handoff: Arc<dyn SessionHandoff>,
    ) -> (BootstrapDriver, DriverHandle, mpsc::UnboundedReceiver<AppError>) {
        let bridge: Arc<dyn BlePlatformBridge> = match settings.role {
            Role::Central => link.central(),
            Role::Peripheral => link.peripheral(),
        };
        let (errors, error_rx) = error_channel();
        let (driver, handle) =
            BootstrapDriver::new(settings, bridge, Arc::new(agent), handoff, errors)
                .expect("driver");
        (driver, handle, error_rx)
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let link = LoopbackLink::new("C", "P");
        let (errors, _) = error_channel();
        let settings = BootstrapSettings {
            agent_endpoint: "localhost".to_string(),
            ..BootstrapSettings::default()
        };
        let result = BootstrapDriver::new(
            settings,
            link.central(),
            Arc::new(MockAgentBridge::new()),
            Arc::new(RecordingHandoff::new()),
            errors,
        );
        assert!(matches!(result, Err(BootstrapError::Settings(_))));
    }

    #[tokio::test]
    async fn test_transport_unavailable_is_reported() {
        let link = LoopbackLink::new("C", "P");
        link.set_available(false);
        let (driver, _handle, mut errors) = driver(
            settings(Role::Central),
            &link,
            MockAgentBridge::new(),
            Arc::new(RecordingHandoff::new()),
        );

        let result = driver.run().await;
        assert!(matches!(result, Err(BootstrapError::Transport(_))));
        assert_eq!(
            errors.recv().await.expect("app error").code,
            codes::TRANSPORT_UNAVAILABLE
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let link = LoopbackLink::new("C", "P");
        let mut settings = settings(Role::Peripheral);
        settings.handshake_timeout_secs = 5;
        let (driver, _handle, _errors) = driver(
            settings,
            &link,
            MockAgentBridge::new(),
            Arc::new(RecordingHandoff::new()),
        );

        assert_eq!(driver.run().await.expect("run"), BootstrapOutcome::TimedOut);
        assert_eq!(link.channel_of(Role::Peripheral), None);
    }

    #[tokio::test]
    async fn test_shutdown_command_cancels() {
        let link = LoopbackLink::new("C", "P");
        let (driver, handle, _errors) = driver(
            settings(Role::Peripheral),
            &link,
            MockAgentBridge::new(),
            Arc::new(RecordingHandoff::new()),
        );

        let run = tokio::spawn(driver.run());
        handle.shutdown().await.expect("shutdown");
        assert_eq!(
            run.await.expect("join").expect("run"),
            BootstrapOutcome::Cancelled
        );
    }

    #[tokio::test]
    async fn test_handle_after_driver_stopped() {
        let link = LoopbackLink::new("C", "P");
        let (driver, handle, _errors) = driver(
            settings(Role::Peripheral),
            &link,
            MockAgentBridge::new(),
            Arc::new(RecordingHandoff::new()),
        );
        drop(driver);

        assert!(matches!(
            handle.accept_request().await,
            Err(BootstrapError::DriverStopped)
        ));
    }

    #[tokio::test]
    async fn test_invitation_failure_reported_then_retried() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");

        let mut peripheral_agent = MockAgentBridge::new();
        let mut seq = Sequence::new();
        peripheral_agent
            .expect_create_invitation_url()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(InvitationError::CreationFailed("agent busy".into())));
        peripheral_agent
            .expect_create_invitation_url()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(URL.to_string()));

        let (peripheral, peripheral_handle, mut peripheral_errors) = driver(
            settings(Role::Peripheral),
            &link,
            peripheral_agent,
            Arc::new(RecordingHandoff::new()),
        );
        let (central, _central_handle, _central_errors) = driver(
            settings(Role::Central),
            &link,
            accepting_agent(),
            Arc::new(RecordingHandoff::new()),
        );

        let peripheral_run = tokio::spawn(peripheral.run());
        let central_run = tokio::spawn(central.run());

        let app_error = peripheral_errors.recv().await.expect("app error");
        assert_eq!(app_error.code, codes::INVITATION_CREATION_FAILED);
        peripheral_handle.retry_invitation().await.expect("retry");

        let central_outcome = central_run.await.expect("join").expect("central");
        let peripheral_outcome = peripheral_run.await.expect("join").expect("peripheral");
        assert!(matches!(central_outcome, BootstrapOutcome::Established(_)));
        assert!(matches!(peripheral_outcome, BootstrapOutcome::Established(_)));
    }

    #[tokio::test]
    async fn test_handoff_failure_reported() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");

        let mut failing = MockSessionHandoff::new();
        failing
            .expect_hand_off()
            .times(1)
            .returning(|_| Err(HandoffError::AgentNotInitialized("wallet locked".into())));

        let (peripheral, _p, _pe) = driver(
            settings(Role::Peripheral),
            &link,
            creating_agent(),
            Arc::new(RecordingHandoff::new()),
        );
        let (central, _c, mut central_errors) =
            driver(settings(Role::Central), &link, accepting_agent(), Arc::new(failing));

        let peripheral_run = tokio::spawn(peripheral.run());
        let result = central.run().await;

        assert!(matches!(result, Err(BootstrapError::Handoff(_))));
        assert_eq!(
            central_errors.recv().await.expect("app error").code,
            codes::AGENT_INITIALIZATION_FAILED
        );
        // The invitationSuccess went out before the handoff
        assert!(matches!(
            peripheral_run.await.expect("join").expect("peripheral"),
            BootstrapOutcome::Established(_)
        ));
    }

    #[tokio::test]
    async fn test_manual_rejection() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let mut peripheral_settings = settings(Role::Peripheral);
        peripheral_settings.peripheral.acceptance = AcceptancePolicy::Manual;

        let (mut peripheral, peripheral_handle, _pe) = driver(
            peripheral_settings,
            &link,
            MockAgentBridge::new(),
            Arc::new(RecordingHandoff::new()),
        );
        let mut notices = peripheral.subscribe_notices();
        let (central, _c, _ce) = driver(
            settings(Role::Central),
            &link,
            MockAgentBridge::new(),
            Arc::new(RecordingHandoff::new()),
        );

        let peripheral_run = tokio::spawn(peripheral.run());
        let central_run = tokio::spawn(central.run());

        loop {
            match notices.recv().await.expect("notice") {
                BootstrapNotice::AwaitingDecision { peer, .. } => {
                    assert_eq!(peer.as_str(), "CENTRAL");
                    break;
                }
                _ => continue,
            }
        }
        peripheral_handle.reject_request().await.expect("reject");

        assert_eq!(
            central_run.await.expect("join").expect("central"),
            BootstrapOutcome::Rejected(PeerIdentifier::new("PERIPHERAL").expect("id"))
        );
        assert_eq!(
            peripheral_run.await.expect("join").expect("peripheral"),
            BootstrapOutcome::Rejected(PeerIdentifier::new("CENTRAL").expect("id"))
        );
    }

    #[tokio::test]
    async fn test_standard_request_flow() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let mut central_settings = settings(Role::Central);
        central_settings.central.request_style = RequestStyle::Standard;

        let handoff = Arc::new(RecordingHandoff::new());
        let (peripheral, _p, _pe) = driver(
            settings(Role::Peripheral),
            &link,
            creating_agent(),
            Arc::new(RecordingHandoff::new()),
        );
        let (central, _c, _ce) = driver(
            central_settings,
            &link,
            accepting_agent(),
            handoff.clone(),
        );

        let peripheral_run = tokio::spawn(peripheral.run());
        let central_outcome = tokio::time::timeout(Duration::from_secs(5), central.run())
            .await
            .expect("finishes")
            .expect("central");
        peripheral_run.await.expect("join").expect("peripheral");

        assert!(matches!(central_outcome, BootstrapOutcome::Established(_)));
        assert_eq!(link.sent_by(Role::Central)[0], "<STD>0");
        assert_eq!(link.sent_by(Role::Peripheral)[0], "<STD>1");
        assert_eq!(handoff.links().len(), 1);
    }
}
