// Bifold BLE Core: out-of-band connection bootstrap over Bluetooth LE
//
// Two devices that cannot reach each other over the network meet over a
// GATT channel, run a short text handshake, and hand the resulting DIDComm
// connection to the agent.

pub mod app_error;
pub mod bootstrap;
pub mod handoff;
pub mod handshake;
pub mod invitation;
pub mod message;
pub mod settings;
pub mod transport;

use thiserror::Error;

pub use app_error::{error_channel, AppError, ErrorSink};
pub use bootstrap::{BootstrapDriver, BootstrapNotice, BootstrapOutcome, DriverHandle};
pub use handoff::{EstablishedLink, LinkDirection, RecordingHandoff, SessionHandoff};
pub use handshake::{HandshakeError, HandshakeMachine, HandshakeState, SessionId};
pub use invitation::{AgentBridge, InvitationError};
pub use message::{CodecError, PeerIdentifier, WireMessage};
pub use settings::{BootstrapSettings, SettingsError};
pub use transport::{BlePlatformBridge, ChannelConfig, Role, TransportError};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Invitation(#[from] InvitationError),

    #[error(transparent)]
    Handoff(#[from] handoff::HandoffError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Bootstrap driver is not running")]
    DriverStopped,
}

/// Install the fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// Safe to call more than once.
pub fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init();
}
