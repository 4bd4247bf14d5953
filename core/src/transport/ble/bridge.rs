/// Native BLE driver abstraction
///
/// Implemented by the platform bindings (Swift/Kotlin) or by
/// [`LoopbackBridge`](super::loopback::LoopbackBridge) in tests. Every call
/// reports failure through its result; peer-facing outcomes (a completed
/// connection, an incoming line) arrive later through the event listener.

use super::gatt::ChannelConfig;
use crate::message::PeerIdentifier;
use crate::transport::abstraction::{NativeEvent, TransportError};
use async_trait::async_trait;

/// Callback receiving raw native events
pub type NativeEventListener = Box<dyn Fn(NativeEvent) + Send + Sync>;

#[async_trait]
pub trait BlePlatformBridge: Send + Sync {
    /// Power up the BLE stack
    async fn start(&self) -> Result<(), TransportError>;

    /// Register the service and its two characteristics
    async fn set_service(&self, channel: &ChannelConfig) -> Result<(), TransportError>;

    /// Central: begin scanning for the configured service
    async fn scan(&self) -> Result<(), TransportError>;

    /// Central: open a link to a discovered peripheral
    async fn connect(&self, peer: &PeerIdentifier) -> Result<(), TransportError>;

    /// Peripheral: begin advertising the configured service
    async fn advertise(&self) -> Result<(), TransportError>;

    /// Write one line to the linked peer
    async fn send_message(&self, message: &str) -> Result<(), TransportError>;

    /// Stop scanning/advertising and drop any link
    async fn shutdown(&self) -> Result<(), TransportError>;

    /// Replace the event listener; `None` unregisters it
    fn set_event_listener(&self, listener: Option<NativeEventListener>);
}
