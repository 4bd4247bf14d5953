/// In-memory BLE link joining one central bridge to one peripheral bridge
///
/// Behaves like a pair of native drivers sharing the air: the central
/// discovers the peripheral once both scan and advertise, `connect` raises
/// `Connected` on both sides, and every line sent by one side arrives as
/// `MessageReceived` on the other. Used by the CLI simulator and the tests.
///
/// Listener callbacks always run outside the internal lock, so a listener
/// may call back into the link.

use super::bridge::{BlePlatformBridge, NativeEventListener};
use super::gatt::ChannelConfig;
use crate::message::PeerIdentifier;
use crate::transport::abstraction::{NativeEvent, Role, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

type SharedListener = Arc<dyn Fn(NativeEvent) + Send + Sync>;

#[derive(Default)]
struct Endpoint {
    identifier: String,
    listener: Option<SharedListener>,
    started: bool,
    channel: Option<ChannelConfig>,
    sent: Vec<String>,
}

struct LinkState {
    central: Endpoint,
    peripheral: Endpoint,
    available: bool,
    scanning: bool,
    advertising: bool,
    advertise_calls: usize,
    connected: bool,
    duplicate_connected: bool,
}

impl LinkState {
    fn endpoint(&self, role: Role) -> &Endpoint {
        match role {
            Role::Central => &self.central,
            Role::Peripheral => &self.peripheral,
        }
    }

    fn endpoint_mut(&mut self, role: Role) -> &mut Endpoint {
        match role {
            Role::Central => &mut self.central,
            Role::Peripheral => &mut self.peripheral,
        }
    }

    /// Queue `event` for the listener of `role`, if any
    fn delivery(&self, role: Role, event: NativeEvent) -> Option<(SharedListener, NativeEvent)> {
        self.endpoint(role)
            .listener
            .as_ref()
            .map(|listener| (Arc::clone(listener), event))
    }

    fn discovery(&self) -> Option<(SharedListener, NativeEvent)> {
        if self.scanning && self.advertising {
            let peripheral = self.peripheral.identifier.clone();
            return self.delivery(Role::Central, NativeEvent::Discovered(peripheral));
        }
        None
    }
}

type Deliveries = Vec<(SharedListener, NativeEvent)>;

fn dispatch(deliveries: Deliveries) {
    for (listener, event) in deliveries {
        trace!("Loopback delivering {}", event);
        (*listener)(event);
    }
}

/// Handle over both ends of the simulated link
#[derive(Clone)]
pub struct LoopbackLink {
    state: Arc<Mutex<LinkState>>,
}

impl LoopbackLink {
    /// `central_id` is how the peripheral sees the central, and vice versa
    pub fn new(central_id: &str, peripheral_id: &str) -> Self {
        let state = LinkState {
            central: Endpoint {
                identifier: central_id.to_string(),
                ..Endpoint::default()
            },
            peripheral: Endpoint {
                identifier: peripheral_id.to_string(),
                ..Endpoint::default()
            },
            available: true,
            scanning: false,
            advertising: false,
            advertise_calls: 0,
            connected: false,
            duplicate_connected: false,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn central(&self) -> Arc<LoopbackBridge> {
        Arc::new(LoopbackBridge {
            role: Role::Central,
            state: Arc::clone(&self.state),
        })
    }

    pub fn peripheral(&self) -> Arc<LoopbackBridge> {
        Arc::new(LoopbackBridge {
            role: Role::Peripheral,
            state: Arc::clone(&self.state),
        })
    }

    /// Simulate Bluetooth powered off (`false`) or back on
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Fire every `Connected` callback twice, as some native stacks do
    pub fn set_duplicate_connected(&self, duplicate: bool) {
        self.state.lock().duplicate_connected = duplicate;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn advertise_calls(&self) -> usize {
        self.state.lock().advertise_calls
    }

    /// Lines written by `role`, in order
    pub fn sent_by(&self, role: Role) -> Vec<String> {
        self.state.lock().endpoint(role).sent.clone()
    }

    pub fn channel_of(&self, role: Role) -> Option<ChannelConfig> {
        self.state.lock().endpoint(role).channel
    }

    /// Deliver a raw native event to the listener of `role`
    pub fn inject(&self, role: Role, event: NativeEvent) {
        let delivery = self.state.lock().delivery(role, event);
        dispatch(delivery.into_iter().collect());
    }

    /// Simulate link loss: both sides see `Disconnected`
    pub fn drop_link(&self) {
        let deliveries = {
            let mut state = self.state.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            let central_id = state.central.identifier.clone();
            let peripheral_id = state.peripheral.identifier.clone();
            [
                state.delivery(Role::Central, NativeEvent::Disconnected(peripheral_id)),
                state.delivery(Role::Peripheral, NativeEvent::Disconnected(central_id)),
            ]
            .into_iter()
            .flatten()
            .collect()
        };
        debug!("Loopback link dropped");
        dispatch(deliveries);
    }
}

/// One end of a [`LoopbackLink`]
pub struct LoopbackBridge {
    role: Role,
    state: Arc<Mutex<LinkState>>,
}

impl LoopbackBridge {
    pub fn role(&self) -> Role {
        self.role
    }

    fn require_started(state: &LinkState, role: Role) -> Result<(), TransportError> {
        if !state.endpoint(role).started {
            return Err(TransportError::NotStarted);
        }
        Ok(())
    }
}

#[async_trait]
impl BlePlatformBridge for LoopbackBridge {
    async fn start(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.available {
            return Err(TransportError::TransportUnavailable(
                "Bluetooth is powered off".to_string(),
            ));
        }
        state.endpoint_mut(self.role).started = true;
        Ok(())
    }

    async fn set_service(&self, channel: &ChannelConfig) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        Self::require_started(&state, self.role)?;
        state.endpoint_mut(self.role).channel = Some(*channel);
        Ok(())
    }

    async fn scan(&self) -> Result<(), TransportError> {
        let deliveries: Deliveries = {
            let mut state = self.state.lock();
            Self::require_started(&state, self.role)?;
            state.scanning = true;
            state.discovery().into_iter().collect()
        };
        dispatch(deliveries);
        Ok(())
    }

    async fn connect(&self, peer: &PeerIdentifier) -> Result<(), TransportError> {
        let deliveries: Deliveries = {
            let mut state = self.state.lock();
            Self::require_started(&state, self.role)?;

            if peer.as_str() != state.peripheral.identifier || !state.advertising {
                return Err(TransportError::ConnectionFailed(format!(
                    "peer {} is not reachable",
                    peer
                )));
            }
            if state.central.channel.is_some() && state.central.channel != state.peripheral.channel
            {
                return Err(TransportError::ConnectionFailed(
                    "service UUID mismatch".to_string(),
                ));
            }

            let central_id = state.central.identifier.clone();
            let peripheral_id = state.peripheral.identifier.clone();
            let mut deliveries = Vec::new();

            // Repeated connects only repeat the central-side callback
            if !state.connected {
                state.connected = true;
                deliveries.extend(
                    state.delivery(Role::Peripheral, NativeEvent::Connected(central_id)),
                );
            }
            let repeats = if state.duplicate_connected { 2 } else { 1 };
            for _ in 0..repeats {
                deliveries.extend(state.delivery(
                    Role::Central,
                    NativeEvent::Connected(peripheral_id.clone()),
                ));
            }
            deliveries
        };
        dispatch(deliveries);
        Ok(())
    }

    async fn advertise(&self) -> Result<(), TransportError> {
        let deliveries: Deliveries = {
            let mut state = self.state.lock();
            Self::require_started(&state, self.role)?;
            state.advertising = true;
            state.advertise_calls += 1;
            state.discovery().into_iter().collect()
        };
        dispatch(deliveries);
        Ok(())
    }

    async fn send_message(&self, message: &str) -> Result<(), TransportError> {
        let deliveries: Deliveries = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(TransportError::NotConnected);
            }
            state.endpoint_mut(self.role).sent.push(message.to_string());
            state
                .delivery(
                    self.role.counterpart(),
                    NativeEvent::MessageReceived(message.to_string()),
                )
                .into_iter()
                .collect()
        };
        dispatch(deliveries);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let deliveries: Deliveries = {
            let mut state = self.state.lock();
            let endpoint = state.endpoint_mut(self.role);
            endpoint.started = false;
            endpoint.channel = None;
            match self.role {
                Role::Central => state.scanning = false,
                Role::Peripheral => state.advertising = false,
            }

            if state.connected {
                state.connected = false;
                // The other side loses the link
                let identifier = state.endpoint(self.role).identifier.clone();
                state
                    .delivery(
                        self.role.counterpart(),
                        NativeEvent::Disconnected(identifier),
                    )
                    .into_iter()
                    .collect()
            } else {
                Vec::new()
            }
        };
        dispatch(deliveries);
        Ok(())
    }

    fn set_event_listener(&self, listener: Option<NativeEventListener>) {
        let listener: Option<SharedListener> = listener.map(SharedListener::from);
        self.state.lock().endpoint_mut(self.role).listener = listener;
    }
}
