//! Session handoff: passing an accepted BLE link to the agent
//!
//! Once a handshake reaches `Accepted`, the link is registered with a freshly
//! constructed agent: as an inbound transport on the Central, as an outbound
//! transport on the Peripheral.

use crate::handshake::SessionId;
use crate::message::PeerIdentifier;
use crate::transport::Role;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandoffError {
    #[error("Agent not initialized: {0}")]
    AgentNotInitialized(String),

    #[error("Transport registration failed: {0}")]
    RegistrationFailed(String),
}

/// Which way the agent uses the BLE link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkDirection {
    Inbound,
    Outbound,
}

impl LinkDirection {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Central => LinkDirection::Inbound,
            Role::Peripheral => LinkDirection::Outbound,
        }
    }
}

/// A validated BLE link with a known peer, ready for the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstablishedLink {
    pub session: SessionId,
    pub role: Role,
    pub peer: PeerIdentifier,
    pub direction: LinkDirection,
    /// The out-of-band invitation exchanged, if the invitation flow ran
    pub invitation_url: Option<String>,
}

impl EstablishedLink {
    pub fn new(
        session: SessionId,
        role: Role,
        peer: PeerIdentifier,
        invitation_url: Option<String>,
    ) -> Self {
        Self {
            session,
            role,
            peer,
            direction: LinkDirection::for_role(role),
            invitation_url,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionHandoff: Send + Sync {
    /// Register the link with a new agent instance
    async fn hand_off(&self, link: EstablishedLink) -> Result<(), HandoffError>;
}

/// Handoff that only remembers the links it was given
#[derive(Debug, Default)]
pub struct RecordingHandoff {
    links: Mutex<Vec<EstablishedLink>>,
}

impl RecordingHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn links(&self) -> Vec<EstablishedLink> {
        self.links.lock().clone()
    }
}

#[async_trait]
impl SessionHandoff for RecordingHandoff {
    async fn hand_off(&self, link: EstablishedLink) -> Result<(), HandoffError> {
        self.links.lock().push(link);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_follows_role() {
        assert_eq!(LinkDirection::for_role(Role::Central), LinkDirection::Inbound);
        assert_eq!(
            LinkDirection::for_role(Role::Peripheral),
            LinkDirection::Outbound
        );
    }

    #[tokio::test]
    async fn test_recording_handoff() {
        let handoff = RecordingHandoff::new();
        let link = EstablishedLink::new(
            SessionId::new(1),
            Role::Peripheral,
            PeerIdentifier::new("AA:BB:CC").expect("id"),
            None,
        );
        handoff.hand_off(link.clone()).await.expect("hand off");

        assert_eq!(handoff.links(), vec![link]);
        assert_eq!(handoff.links()[0].direction, LinkDirection::Outbound);
    }
}
