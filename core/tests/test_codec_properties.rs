// Property tests for the BLE message grammar

use bifold_ble_core::message::*;
use proptest::prelude::*;

fn token() -> impl Strategy<Value = String> {
    "[A-Za-z0-9:_.-]{1,40}"
}

fn verb() -> impl Strategy<Value = Verb> {
    prop::sample::select(Verb::ALL.to_vec())
}

proptest! {
    #[test]
    fn test_encode_decode_split(verb in token(), argument in "[A-Za-z0-9:_.-]{0,40}") {
        let line = encode(&verb, &argument).expect("encodes");
        let (decoded_verb, decoded_argument) = decode(&line).expect("decodes");
        prop_assert_eq!(decoded_verb, verb.as_str());
        prop_assert_eq!(decoded_argument, argument.as_str());
        prop_assert_eq!(decoded_verb.len() + decoded_argument.len() + 1, line.len());
    }

    #[test]
    fn test_command_messages_survive_the_wire(verb in verb(), peer in token()) {
        let message = WireMessage::command(verb, PeerIdentifier::new(peer).expect("peer"));
        let line = encode_message(&message).expect("encodes");
        prop_assert_eq!(decode_message(&line).expect("decodes"), message);
    }

    #[test]
    fn test_invitation_urls_survive_the_wire(oob in "[A-Za-z0-9+/=]{1,200}") {
        let url = format!("http://localhost:3000?oob={}", oob);
        let line = encode_message(&WireMessage::invitation(url.clone())).expect("encodes");
        prop_assert!(!line.contains('\n'));
        match decode_message(&line).expect("decodes") {
            WireMessage::Invitation(payload) => prop_assert_eq!(payload.invitation_url, url),
            other => prop_assert!(false, "decoded {:?}", other),
        }
    }

    #[test]
    fn test_lines_without_separator_are_malformed(line in "[A-Za-z0-9_]{1,60}") {
        prop_assert!(decode(&line).is_err());
        prop_assert!(decode_message(&line).is_err());
    }

    #[test]
    fn test_unknown_verbs_are_malformed(verb in "[a-z]{1,12}x", peer in token()) {
        let line = format!("{} {}", verb, peer);
        prop_assume!(Verb::ALL.iter().all(|known| known.as_str() != verb));
        prop_assert!(matches!(decode_message(&line), Err(CodecError::MalformedMessage(_))));
    }

    #[test]
    fn test_decoding_never_panics(line in "\\PC{0,120}") {
        let _ = decode_message(&line);
    }
}

#[test]
fn test_oversized_line_rejected() {
    let line = format!("{{\"invitationURL\":\"{}\"}}", "a".repeat(MAX_LINE_LEN));
    assert!(decode_message(&line).is_err());
}

#[test]
fn test_standard_messages_decode() {
    assert_eq!(
        decode_message("<STD>0").expect("decodes"),
        WireMessage::Standard(StandardMessage::Invitation)
    );
    assert_eq!(
        encode_standard(StandardMessage::AcceptInvitation),
        format!("{}1", STANDARD_PREFIX)
    );
    assert!(decode_message("<STD>7").is_err());
}
