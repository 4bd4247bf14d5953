// Role adapter: one API over the native central and peripheral drivers
//
// The adapter owns the native lifecycle (start → configure → scan/advertise)
// and turns raw callbacks into normalized AdapterEvents:
// - duplicate Connected callbacks for a linked peer are dropped
// - Disconnected for a peer that was never linked is dropped
// - Discovered is dropped on the peripheral side
// Event delivery is scoped to an EventSubscription; once it is dropped (or
// the adapter shuts down) no further event reaches the subscriber.

use super::bridge::{BlePlatformBridge, NativeEventListener};
use super::gatt::{ChannelConfig, GattCharacteristic};
use crate::message::PeerIdentifier;
use crate::transport::abstraction::{AdapterEvent, NativeEvent, Role, TransportError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// ============================================================================
// LIFECYCLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterLifecycle {
    Stopped,
    Started,
    /// Service and characteristics registered; scan/advertise allowed
    Configured,
}

// ============================================================================
// SUBSCRIPTION GUARD
// ============================================================================

/// Keeps the adapter's event listener registered while alive
pub struct EventSubscription {
    generation: u64,
    current: Arc<AtomicU64>,
    bridge: Arc<dyn BlePlatformBridge>,
}

impl EventSubscription {
    pub fn is_active(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        // Only unregister if no newer subscription replaced this one
        if self
            .current
            .compare_exchange(
                self.generation,
                self.generation + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            self.bridge.set_event_listener(None);
            debug!("BLE event subscription {} released", self.generation);
        }
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("generation", &self.generation)
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// ROLE ADAPTER
// ============================================================================

pub struct BleRoleAdapter {
    role: Role,
    bridge: Arc<dyn BlePlatformBridge>,
    lifecycle: RwLock<AdapterLifecycle>,
    channel: RwLock<Option<ChannelConfig>>,
    generation: Arc<AtomicU64>,
    links: Arc<Mutex<HashSet<PeerIdentifier>>>,
    advertising: AtomicBool,
}

impl BleRoleAdapter {
    pub fn new(role: Role, bridge: Arc<dyn BlePlatformBridge>) -> Self {
        Self {
            role,
            bridge,
            lifecycle: RwLock::new(AdapterLifecycle::Stopped),
            channel: RwLock::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            links: Arc::new(Mutex::new(HashSet::new())),
            advertising: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn lifecycle(&self) -> AdapterLifecycle {
        *self.lifecycle.read()
    }

    pub fn channel(&self) -> Option<ChannelConfig> {
        *self.channel.read()
    }

    /// Central writes on the messaging characteristic, Peripheral indicates
    pub fn outbound_characteristic(&self) -> GattCharacteristic {
        match self.role {
            Role::Central => GattCharacteristic::Messaging,
            Role::Peripheral => GattCharacteristic::Indication,
        }
    }

    pub fn is_connected(&self, peer: &PeerIdentifier) -> bool {
        self.links.lock().contains(peer)
    }

    /// Power up the native stack. A second call while started is a no-op.
    pub async fn start(&self) -> Result<(), TransportError> {
        if self.lifecycle() != AdapterLifecycle::Stopped {
            debug!("{} adapter already started", self.role);
            return Ok(());
        }

        self.bridge.start().await.map_err(|e| match e {
            TransportError::TransportUnavailable(_) => e,
            other => TransportError::TransportUnavailable(other.to_string()),
        })?;

        *self.lifecycle.write() = AdapterLifecycle::Started;
        info!("{} adapter started", self.role);
        Ok(())
    }

    /// Register the service/characteristic triple. Exactly once per start.
    pub async fn configure_channel(&self, channel: &ChannelConfig) -> Result<(), TransportError> {
        match self.lifecycle() {
            AdapterLifecycle::Stopped => return Err(TransportError::NotStarted),
            AdapterLifecycle::Configured => return Err(TransportError::ChannelAlreadyConfigured),
            AdapterLifecycle::Started => {}
        }

        channel
            .validate()
            .map_err(|e| TransportError::InvalidChannel(e.to_string()))?;

        self.bridge.set_service(channel).await?;

        *self.channel.write() = Some(*channel);
        *self.lifecycle.write() = AdapterLifecycle::Configured;
        info!(
            "{} adapter configured for service {}, sending on {}",
            self.role,
            channel.service_uuid,
            self.outbound_characteristic().uuid(channel)
        );
        Ok(())
    }

    fn ensure_role(&self, operation: &'static str, role: Role) -> Result<(), TransportError> {
        if self.role != role {
            return Err(TransportError::WrongRole {
                operation,
                role: self.role,
            });
        }
        Ok(())
    }

    fn ensure_configured(&self) -> Result<(), TransportError> {
        match self.lifecycle() {
            AdapterLifecycle::Stopped => Err(TransportError::NotStarted),
            AdapterLifecycle::Started => Err(TransportError::ChannelNotConfigured),
            AdapterLifecycle::Configured => Ok(()),
        }
    }

    /// Central: start discovering peripherals
    pub async fn scan(&self) -> Result<(), TransportError> {
        self.ensure_role("scan", Role::Central)?;
        self.ensure_configured()?;
        self.bridge.scan().await?;
        info!("Scanning for peripherals");
        Ok(())
    }

    /// Central: connect to a discovered peripheral.
    /// Completion is reported as an `AdapterEvent::Connected`.
    pub async fn connect(&self, peer: &PeerIdentifier) -> Result<(), TransportError> {
        self.ensure_role("connect", Role::Central)?;
        self.ensure_configured()?;
        debug!("Connecting to {}", peer);
        self.bridge.connect(peer).await
    }

    /// Peripheral: start advertising. Idempotent.
    pub async fn advertise(&self) -> Result<(), TransportError> {
        self.ensure_role("advertise", Role::Peripheral)?;
        self.ensure_configured()?;

        if self.advertising.load(Ordering::SeqCst) {
            debug!("Already advertising");
            return Ok(());
        }

        self.bridge.advertise().await?;
        self.advertising.store(true, Ordering::SeqCst);
        info!("Advertising bootstrap service");
        Ok(())
    }

    /// Write one line to the linked peer.
    /// Fails with `NotConnected` when no link is up.
    pub async fn send_message(&self, message: &str) -> Result<(), TransportError> {
        self.ensure_configured()?;
        if self.links.lock().is_empty() {
            return Err(TransportError::NotConnected);
        }
        debug!("Sending {} bytes", message.len());
        self.bridge.send_message(message).await
    }

    /// Register a listener and return the guard plus the normalized stream.
    ///
    /// A new subscription invalidates any previous one.
    pub fn subscribe(&self) -> (EventSubscription, mpsc::UnboundedReceiver<AdapterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let current = Arc::clone(&self.generation);
        let links = Arc::clone(&self.links);
        let role = self.role;

        let listener: NativeEventListener = Box::new(move |event| {
            if current.load(Ordering::SeqCst) != generation {
                debug!("Dropping {} for released subscription", event);
                return;
            }
            if let Some(event) = normalize(role, &links, event) {
                if tx.send(event).is_err() {
                    debug!("Event receiver dropped");
                }
            }
        });
        self.bridge.set_event_listener(Some(listener));

        let subscription = EventSubscription {
            generation,
            current: Arc::clone(&self.generation),
            bridge: Arc::clone(&self.bridge),
        };
        (subscription, rx)
    }

    /// Stop the native stack and release every subscription.
    ///
    /// Listener release and link bookkeeping happen before the native call,
    /// so no event is delivered once this has been entered.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.bridge.set_event_listener(None);
        self.links.lock().clear();
        self.advertising.store(false, Ordering::SeqCst);
        *self.channel.write() = None;
        *self.lifecycle.write() = AdapterLifecycle::Stopped;

        self.bridge.shutdown().await?;
        info!("{} adapter shut down", self.role);
        Ok(())
    }
}

fn parse_identifier(raw: &str) -> Option<PeerIdentifier> {
    match PeerIdentifier::new(raw) {
        Ok(peer) => Some(peer),
        Err(e) => {
            warn!("Dropping event with invalid identifier: {}", e);
            None
        }
    }
}

fn normalize(
    role: Role,
    links: &Mutex<HashSet<PeerIdentifier>>,
    event: NativeEvent,
) -> Option<AdapterEvent> {
    match event {
        NativeEvent::Discovered(raw) => {
            if role == Role::Peripheral {
                debug!("Peripheral ignores discovery of {}", raw);
                return None;
            }
            parse_identifier(&raw).map(AdapterEvent::Discovered)
        }
        NativeEvent::Connected(raw) => {
            let peer = parse_identifier(&raw)?;
            if !links.lock().insert(peer.clone()) {
                debug!("Duplicate connected event for {}", peer);
                return None;
            }
            Some(AdapterEvent::Connected(peer))
        }
        NativeEvent::Disconnected(raw) => {
            let peer = parse_identifier(&raw)?;
            if !links.lock().remove(&peer) {
                debug!("Disconnected event for unlinked peer {}", peer);
                return None;
            }
            Some(AdapterEvent::Disconnected(peer))
        }
        NativeEvent::MessageReceived(message) => Some(AdapterEvent::MessageReceived(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ble::loopback::LoopbackLink;

    fn peer(id: &str) -> PeerIdentifier {
        PeerIdentifier::new(id).expect("valid identifier")
    }

    async fn configured(role: Role, link: &LoopbackLink) -> BleRoleAdapter {
        let bridge: Arc<dyn BlePlatformBridge> = match role {
            Role::Central => link.central(),
            Role::Peripheral => link.peripheral(),
        };
        let adapter = BleRoleAdapter::new(role, bridge);
        adapter.start().await.expect("start");
        adapter
            .configure_channel(&ChannelConfig::default())
            .await
            .expect("configure");
        adapter
    }

    #[tokio::test]
    async fn test_start_unavailable() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        link.set_available(false);
        let adapter = BleRoleAdapter::new(Role::Central, link.central());

        let result = adapter.start().await;
        assert!(matches!(result, Err(TransportError::TransportUnavailable(_))));
        assert_eq!(adapter.lifecycle(), AdapterLifecycle::Stopped);
    }

    #[tokio::test]
    async fn test_configure_requires_start() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let adapter = BleRoleAdapter::new(Role::Central, link.central());

        assert_eq!(
            adapter.configure_channel(&ChannelConfig::default()).await,
            Err(TransportError::NotStarted)
        );
    }

    #[tokio::test]
    async fn test_configure_once_per_start() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let adapter = configured(Role::Central, &link).await;

        assert_eq!(
            adapter.configure_channel(&ChannelConfig::default()).await,
            Err(TransportError::ChannelAlreadyConfigured)
        );

        adapter.shutdown().await.expect("shutdown");
        adapter.start().await.expect("restart");
        adapter
            .configure_channel(&ChannelConfig::default())
            .await
            .expect("configure after restart");
    }

    #[test]
    fn test_outbound_characteristic_by_role() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let channel = ChannelConfig::random();

        let central = BleRoleAdapter::new(Role::Central, link.central());
        assert_eq!(
            central.outbound_characteristic().uuid(&channel),
            channel.messaging_uuid
        );
        let peripheral = BleRoleAdapter::new(Role::Peripheral, link.peripheral());
        assert_eq!(
            peripheral.outbound_characteristic().uuid(&channel),
            channel.indication_uuid
        );
    }

    #[tokio::test]
    async fn test_scan_requires_channel() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let adapter = BleRoleAdapter::new(Role::Central, link.central());
        adapter.start().await.expect("start");

        assert_eq!(adapter.scan().await, Err(TransportError::ChannelNotConfigured));
    }

    #[tokio::test]
    async fn test_role_specific_operations() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let central = configured(Role::Central, &link).await;
        let peripheral = configured(Role::Peripheral, &link).await;

        assert!(matches!(
            central.advertise().await,
            Err(TransportError::WrongRole { .. })
        ));
        assert!(matches!(
            peripheral.scan().await,
            Err(TransportError::WrongRole { .. })
        ));
        assert!(matches!(
            peripheral.connect(&peer("CENTRAL")).await,
            Err(TransportError::WrongRole { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_without_link() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let central = configured(Role::Central, &link).await;

        assert_eq!(
            central.send_message("connection PERIPHERAL").await,
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_duplicate_connected_is_dropped() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let central = configured(Role::Central, &link).await;
        let (_subscription, mut events) = central.subscribe();

        link.inject(Role::Central, NativeEvent::Connected("PERIPHERAL".into()));
        link.inject(Role::Central, NativeEvent::Connected("PERIPHERAL".into()));

        assert_eq!(
            events.try_recv().expect("first connected"),
            AdapterEvent::Connected(peer("PERIPHERAL"))
        );
        assert!(events.try_recv().is_err());
        assert!(central.is_connected(&peer("PERIPHERAL")));
    }

    #[tokio::test]
    async fn test_unknown_disconnect_is_dropped() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let central = configured(Role::Central, &link).await;
        let (_subscription, mut events) = central.subscribe();

        link.inject(Role::Central, NativeEvent::Disconnected("STRANGER".into()));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_peripheral_drops_discovery() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let peripheral = configured(Role::Peripheral, &link).await;
        let (_subscription, mut events) = peripheral.subscribe();

        link.inject(Role::Peripheral, NativeEvent::Discovered("CENTRAL".into()));
        link.inject(Role::Peripheral, NativeEvent::MessageReceived("<STD>0".into()));

        assert_eq!(
            events.try_recv().expect("message"),
            AdapterEvent::MessageReceived("<STD>0".into())
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_identifier_is_dropped() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let central = configured(Role::Central, &link).await;
        let (_subscription, mut events) = central.subscribe();

        link.inject(Role::Central, NativeEvent::Discovered("AA BB".into()));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_events_after_subscription_dropped() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let central = configured(Role::Central, &link).await;
        let (subscription, mut events) = central.subscribe();
        assert!(subscription.is_active());
        drop(subscription);

        link.inject(Role::Central, NativeEvent::Discovered("PERIPHERAL".into()));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_events_after_shutdown() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let central = configured(Role::Central, &link).await;
        let (subscription, mut events) = central.subscribe();

        central.shutdown().await.expect("shutdown");
        assert!(!subscription.is_active());

        link.inject(Role::Central, NativeEvent::Discovered("PERIPHERAL".into()));
        assert!(events.try_recv().is_err());
        assert_eq!(central.lifecycle(), AdapterLifecycle::Stopped);
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_previous() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let central = configured(Role::Central, &link).await;
        let (first, mut first_events) = central.subscribe();
        let (second, mut second_events) = central.subscribe();
        assert!(!first.is_active());

        // Dropping the stale guard must not unregister the new listener
        drop(first);
        assert!(second.is_active());

        link.inject(Role::Central, NativeEvent::Discovered("PERIPHERAL".into()));
        assert!(first_events.try_recv().is_err());
        assert_eq!(
            second_events.try_recv().expect("discovered"),
            AdapterEvent::Discovered(peer("PERIPHERAL"))
        );
    }

    #[tokio::test]
    async fn test_advertise_is_idempotent() {
        let link = LoopbackLink::new("CENTRAL", "PERIPHERAL");
        let peripheral = configured(Role::Peripheral, &link).await;

        peripheral.advertise().await.expect("advertise");
        peripheral.advertise().await.expect("advertise again");
        assert_eq!(link.advertise_calls(), 1);
    }
}
