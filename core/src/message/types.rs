// Message types: the closed vocabulary spoken over the BLE bootstrap channel

use super::codec::CodecError;
use crate::transport::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// JSON key carrying the out-of-band invitation URL
pub const INVITATION_URL_KEY: &str = "invitationURL";

/// JSON key carrying the invitation-success acknowledgment
pub const INVITATION_SUCCESS_KEY: &str = "invitationSuccess";

/// Native BLE device identifier of a peer.
///
/// Valid for one BLE session only; never persisted. Whitespace is refused so
/// that every identifier can travel as the argument of a command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerIdentifier(String);

impl PeerIdentifier {
    pub fn new(id: impl Into<String>) -> Result<Self, CodecError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CodecError::MalformedMessage(
                "peer identifier is empty".to_string(),
            ));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(CodecError::MalformedMessage(format!(
                "peer identifier contains whitespace: {:?}",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerIdentifier {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PeerIdentifier {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PeerIdentifier> for String {
    fn from(peer: PeerIdentifier) -> Self {
        peer.0
    }
}

/// Command verbs of the `<verb> <peer-identifier>` grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    /// Central asks the peripheral for a connection (and its invitation)
    Connection,
    /// Peripheral accepts the central's request
    ConnectionAccepted,
    /// Peripheral declines the central's request
    ConnectionRejected,
    /// Peripheral ends the exchange with the central
    Finished,
}

impl Verb {
    pub const ALL: [Verb; 4] = [
        Verb::Connection,
        Verb::ConnectionAccepted,
        Verb::ConnectionRejected,
        Verb::Finished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Connection => "connection",
            Verb::ConnectionAccepted => "connection_accepted",
            Verb::ConnectionRejected => "connection_rejected",
            Verb::Finished => "finished",
        }
    }

    /// The role whose vocabulary this verb belongs to
    pub fn sender(&self) -> Role {
        match self {
            Verb::Connection => Role::Central,
            Verb::ConnectionAccepted | Verb::ConnectionRejected | Verb::Finished => {
                Role::Peripheral
            }
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .iter()
            .copied()
            .find(|verb| verb.as_str() == s)
            .ok_or_else(|| CodecError::MalformedMessage(format!("unknown verb: {:?}", s)))
    }
}

/// Fixed control messages carrying the reserved `<STD>` prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardMessage {
    /// `<STD>0`: request to begin the invitation exchange
    Invitation,
    /// `<STD>1`: acknowledgment that the exchange will begin
    AcceptInvitation,
}

impl StandardMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            StandardMessage::Invitation => "<STD>0",
            StandardMessage::AcceptInvitation => "<STD>1",
        }
    }

    pub fn sender(&self) -> Role {
        match self {
            StandardMessage::Invitation => Role::Central,
            StandardMessage::AcceptInvitation => Role::Peripheral,
        }
    }
}

impl fmt::Display for StandardMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StandardMessage {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<STD>0" => Ok(StandardMessage::Invitation),
            "<STD>1" => Ok(StandardMessage::AcceptInvitation),
            other => Err(CodecError::MalformedMessage(format!(
                "unknown standard message: {:?}",
                other
            ))),
        }
    }
}

/// `{"invitationURL": "<url>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationPayload {
    #[serde(rename = "invitationURL")]
    pub invitation_url: String,
}

impl InvitationPayload {
    pub fn new(invitation_url: impl Into<String>) -> Self {
        Self {
            invitation_url: invitation_url.into(),
        }
    }
}

/// Records returned by the agent after accepting an out-of-band invitation.
///
/// Both are opaque agent records; only their JSON shape is carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationRecords {
    #[serde(rename = "outOfBandRecord")]
    pub out_of_band_record: serde_json::Value,
    #[serde(rename = "connectionRecord")]
    pub connection_record: serde_json::Value,
}

/// `{"invitationSuccess": {"outOfBandRecord": {...}, "connectionRecord": {...}}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationSuccess {
    #[serde(rename = "invitationSuccess")]
    pub invitation_success: InvitationRecords,
}

/// A decoded message from the BLE channel
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Command { verb: Verb, peer: PeerIdentifier },
    Standard(StandardMessage),
    Invitation(InvitationPayload),
    InvitationSuccess(InvitationRecords),
}

impl WireMessage {
    pub fn command(verb: Verb, peer: PeerIdentifier) -> Self {
        WireMessage::Command { verb, peer }
    }

    pub fn invitation(url: impl Into<String>) -> Self {
        WireMessage::Invitation(InvitationPayload::new(url))
    }

    /// The role allowed to send this message, if the grammar fixes one
    pub fn sender(&self) -> Role {
        match self {
            WireMessage::Command { verb, .. } => verb.sender(),
            WireMessage::Standard(standard) => standard.sender(),
            WireMessage::Invitation(_) => Role::Peripheral,
            WireMessage::InvitationSuccess(_) => Role::Central,
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Command { verb, .. } => verb.as_str(),
            WireMessage::Standard(standard) => standard.as_str(),
            WireMessage::Invitation(_) => INVITATION_URL_KEY,
            WireMessage::InvitationSuccess(_) => INVITATION_SUCCESS_KEY,
        }
    }
}
