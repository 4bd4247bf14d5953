//! Transport abstraction layer for the BLE bootstrap
//!
//! Defines the role, event and error types shared by the native bridge,
//! the role adapter and the handshake state machine.

use crate::message::PeerIdentifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The two asymmetric BLE roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Scans and initiates connections
    Central,
    /// Advertises and accepts connections
    Peripheral,
}

impl Role {
    /// The role on the other end of the link
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Central => Role::Peripheral,
            Role::Peripheral => Role::Central,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Central => write!(f, "Central"),
            Role::Peripheral => write!(f, "Peripheral"),
        }
    }
}

/// Callbacks exactly as the native driver fires them.
///
/// Identifiers are raw strings here; the adapter validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    Discovered(String),
    Connected(String),
    Disconnected(String),
    MessageReceived(String),
}

impl fmt::Display for NativeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeEvent::Discovered(id) => write!(f, "Discovered {{ identifier: {} }}", id),
            NativeEvent::Connected(id) => write!(f, "Connected {{ identifier: {} }}", id),
            NativeEvent::Disconnected(id) => write!(f, "Disconnected {{ identifier: {} }}", id),
            NativeEvent::MessageReceived(message) => {
                write!(f, "MessageReceived {{ len: {} }}", message.len())
            }
        }
    }
}

/// Normalized events from the role adapter to the handshake state machine.
///
/// The adapter guarantees that `Connected` is never repeated for a linked
/// peer and that `Disconnected` only refers to a linked peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Discovered(PeerIdentifier),
    Connected(PeerIdentifier),
    Disconnected(PeerIdentifier),
    MessageReceived(String),
}

impl fmt::Display for AdapterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterEvent::Discovered(peer) => write!(f, "Discovered {{ peer: {} }}", peer),
            AdapterEvent::Connected(peer) => write!(f, "Connected {{ peer: {} }}", peer),
            AdapterEvent::Disconnected(peer) => write!(f, "Disconnected {{ peer: {} }}", peer),
            AdapterEvent::MessageReceived(message) => {
                write!(f, "MessageReceived {{ len: {} }}", message.len())
            }
        }
    }
}

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Transport not started")]
    NotStarted,

    #[error("BLE channel not configured")]
    ChannelNotConfigured,

    #[error("BLE channel already configured for this start")]
    ChannelAlreadyConfigured,

    #[error("Invalid BLE channel: {0}")]
    InvalidChannel(String),

    #[error("{operation} is not available to the {role} role")]
    WrongRole { operation: &'static str, role: Role },

    #[error("No active link")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Platform bridge error: {0}")]
    PlatformError(String),
}
