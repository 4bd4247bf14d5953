// Invitation exchange: the agent operations behind the handshake
//
// The Peripheral asks its agent for an out-of-band invitation URL and sends
// it over BLE; the Central hands the URL to its agent, which returns the
// out-of-band and connection records echoed back as invitationSuccess.

use crate::message::InvitationRecords;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvitationError {
    #[error("Invitation creation failed: {0}")]
    CreationFailed(String),

    #[error("Invitation acceptance failed: {0}")]
    AcceptanceFailed(String),
}

/// The agent collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentBridge: Send + Sync {
    /// Create an out-of-band invitation and return its URL
    async fn create_invitation_url(&self) -> Result<String, InvitationError>;

    /// Accept an out-of-band invitation from its URL
    async fn receive_invitation_from_url(
        &self,
        url: &str,
    ) -> Result<InvitationRecords, InvitationError>;
}

/// Out-of-band invitation URL: `<endpoint>?oob=<payload>`
pub fn invitation_url_for(endpoint: &str, oob: &str) -> String {
    format!("{}?oob={}", endpoint.trim_end_matches('/'), oob)
}

/// Extract the `oob` payload from an invitation URL
pub fn oob_payload(url: &str) -> Option<&str> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("oob="))
        .filter(|payload| !payload.is_empty())
}
