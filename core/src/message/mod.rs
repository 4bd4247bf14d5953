// Message module: wire grammar for the BLE bootstrap channel

pub mod codec;
pub mod types;

pub use codec::{
    decode, decode_message, encode, encode_json, encode_message, encode_standard, CodecError,
    MAX_LINE_LEN, STANDARD_PREFIX,
};
pub use types::{
    InvitationPayload, InvitationRecords, InvitationSuccess, PeerIdentifier, StandardMessage,
    Verb, WireMessage, INVITATION_SUCCESS_KEY, INVITATION_URL_KEY,
};
