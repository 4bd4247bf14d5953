// Message codec: single-line commands and JSON payloads with a size guard

use super::types::{
    InvitationPayload, InvitationRecords, InvitationSuccess, PeerIdentifier, StandardMessage,
    Verb, WireMessage, INVITATION_SUCCESS_KEY, INVITATION_URL_KEY,
};
use serde::Serialize;
use thiserror::Error;

/// Maximum accepted line length: 64 KB.
/// The native layer reassembles characteristic writes, so anything larger
/// than this is garbage rather than a real handshake message.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Reserved prefix of standard control messages
pub const STANDARD_PREFIX: &str = "<STD>";

/// Decode/encode failures. Both are non-fatal: the message is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Malformed JSON payload: {0}")]
    MalformedJson(String),
}

fn check_len(len: usize) -> Result<(), CodecError> {
    if len > MAX_LINE_LEN {
        return Err(CodecError::MalformedMessage(format!(
            "line too large: {} bytes (max {})",
            len, MAX_LINE_LEN
        )));
    }
    Ok(())
}

/// Format `"{verb} {argument}"`.
///
/// The argument may be empty; neither part may contain whitespace.
pub fn encode(verb: &str, argument: &str) -> Result<String, CodecError> {
    check_len(verb.len() + argument.len() + 1)?;

    if verb.is_empty() {
        return Err(CodecError::MalformedMessage("empty verb".to_string()));
    }
    if verb.chars().any(char::is_whitespace) {
        return Err(CodecError::MalformedMessage(format!(
            "verb contains whitespace: {:?}",
            verb
        )));
    }
    if argument.chars().any(char::is_whitespace) {
        return Err(CodecError::MalformedMessage(format!(
            "argument contains whitespace: {:?}",
            argument
        )));
    }

    Ok(format!("{} {}", verb, argument))
}

/// Split a command line on its first space.
///
/// Fails when there is no space or when either side carries more whitespace,
/// so a successful split always satisfies
/// `verb.len() + argument.len() + 1 == line.len()`.
pub fn decode(line: &str) -> Result<(&str, &str), CodecError> {
    check_len(line.len())?;

    let (verb, argument) = line.split_once(' ').ok_or_else(|| {
        CodecError::MalformedMessage(format!("missing separator in {:?}", line))
    })?;

    if verb.is_empty() {
        return Err(CodecError::MalformedMessage("empty verb".to_string()));
    }
    if verb.chars().any(char::is_whitespace) || argument.chars().any(char::is_whitespace) {
        return Err(CodecError::MalformedMessage(format!(
            "unexpected whitespace in {:?}",
            line
        )));
    }

    debug_assert_eq!(verb.len() + argument.len() + 1, line.len());
    Ok((verb, argument))
}

/// Serialize a JSON payload to its single-line wire form
pub fn encode_json<T: Serialize>(payload: &T) -> Result<String, CodecError> {
    let line =
        serde_json::to_string(payload).map_err(|e| CodecError::MalformedJson(e.to_string()))?;
    check_len(line.len())?;
    Ok(line)
}

fn decode_json(line: &str) -> Result<WireMessage, CodecError> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| CodecError::MalformedJson(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| CodecError::MalformedJson("payload is not a JSON object".to_string()))?;

    if object.contains_key(INVITATION_URL_KEY) {
        let payload: InvitationPayload = serde_json::from_value(value)
            .map_err(|e| CodecError::MalformedJson(e.to_string()))?;
        if payload.invitation_url.is_empty() {
            return Err(CodecError::MalformedJson(
                "invitationURL is empty".to_string(),
            ));
        }
        return Ok(WireMessage::Invitation(payload));
    }

    if object.contains_key(INVITATION_SUCCESS_KEY) {
        let payload: InvitationSuccess = serde_json::from_value(value)
            .map_err(|e| CodecError::MalformedJson(e.to_string()))?;
        return Ok(WireMessage::InvitationSuccess(payload.invitation_success));
    }

    Err(CodecError::MalformedJson(format!(
        "expected {} or {} key",
        INVITATION_URL_KEY, INVITATION_SUCCESS_KEY
    )))
}

/// Decode one message as delivered by the native layer
pub fn decode_message(line: &str) -> Result<WireMessage, CodecError> {
    check_len(line.len())?;

    if line.starts_with(STANDARD_PREFIX) {
        return Ok(WireMessage::Standard(line.parse()?));
    }

    if line.starts_with('{') {
        return decode_json(line);
    }

    let (verb, argument) = decode(line)?;
    let verb: Verb = verb.parse()?;
    if argument.is_empty() {
        return Err(CodecError::MalformedMessage(format!(
            "verb {} requires a peer identifier",
            verb
        )));
    }
    let peer = PeerIdentifier::new(argument)?;

    Ok(WireMessage::Command { verb, peer })
}

#[derive(Serialize)]
struct InvitationSuccessRef<'a> {
    #[serde(rename = "invitationSuccess")]
    invitation_success: &'a InvitationRecords,
}

/// Encode one message to the line handed to the native layer
pub fn encode_message(message: &WireMessage) -> Result<String, CodecError> {
    match message {
        WireMessage::Command { verb, peer } => encode(verb.as_str(), peer.as_str()),
        WireMessage::Standard(standard) => Ok(standard.as_str().to_string()),
        WireMessage::Invitation(payload) => encode_json(payload),
        WireMessage::InvitationSuccess(records) => encode_json(&InvitationSuccessRef {
            invitation_success: records,
        }),
    }
}

/// Shorthand for the standard form of a message
pub fn encode_standard(message: StandardMessage) -> String {
    message.as_str().to_string()
}
