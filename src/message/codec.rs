//! Frame encode/decode pipeline.
//!
//! Outbound: build the plaintext header, seal the protocol header + payload
//! with the session key, using the plaintext header as AAD. Inbound: parse
//! the plaintext header first; session id 0 frames skip decryption, anything
//! else is returned sealed for the session table to open.

use crate::core::{CodecError, MatterError, SecurityError};
use crate::crypto::{build_nonce, decrypt, encrypt, SessionKey};

use super::header::MessageHeader;
use super::protocol::ProtocolHeader;

/// A fully decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Plaintext header.
    pub header: MessageHeader,
    /// Protocol header.
    pub protocol: ProtocolHeader,
    /// Application payload (TLV or StatusReport bytes).
    pub payload: Vec<u8>,
}

/// A secured frame whose plaintext header parsed but whose envelope is still
/// sealed, pending session lookup.
#[derive(Debug, Clone)]
pub struct SealedMessage {
    /// Parsed plaintext header.
    pub header: MessageHeader,
    aad: Vec<u8>,
    ciphertext: Vec<u8>,
}

/// Result of the first decode phase.
#[derive(Debug, Clone)]
pub enum DecodedFrame {
    /// Unsecured (session id 0) message, fully decoded.
    Plain(Message),
    /// Secured message awaiting session keys.
    Sealed(SealedMessage),
}

/// Encode an unsecured (session id 0) message.
pub fn encode_plain(message: &Message) -> Vec<u8> {
    let mut out = message.header.to_bytes();
    out.extend_from_slice(&message.protocol.encode_with_payload(&message.payload));
    out
}

/// Encode and seal a secured message.
///
/// `nonce_node_id` is the sender's node id (the local one for outbound
/// traffic); it feeds the nonce even when the header omits the source field.
pub fn encode_secured(
    message: &Message,
    key: &SessionKey,
    nonce_node_id: u64,
) -> Result<Vec<u8>, SecurityError> {
    let aad = message.header.to_bytes();
    let nonce = build_nonce(
        message.header.security_flags.as_byte(),
        message.header.counter,
        nonce_node_id,
    );
    let plaintext = message.protocol.encode_with_payload(&message.payload);
    let ciphertext = encrypt(key, &nonce, &aad, &plaintext)?;

    let mut out = aad;
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// First decode phase: parse the plaintext header and classify the frame.
pub fn decode(bytes: &[u8]) -> Result<DecodedFrame, CodecError> {
    let (header, header_len) = MessageHeader::from_bytes(bytes)?;
    let rest = &bytes[header_len..];

    if header.session_id == 0 {
        let (protocol, payload) = ProtocolHeader::decode(rest)?;
        return Ok(DecodedFrame::Plain(Message {
            header,
            protocol,
            payload: payload.to_vec(),
        }));
    }

    Ok(DecodedFrame::Sealed(SealedMessage {
        header,
        aad: bytes[..header_len].to_vec(),
        ciphertext: rest.to_vec(),
    }))
}

/// Second decode phase: open a sealed frame with the session's decrypt key.
///
/// `peer_node_id` feeds the nonce when the header carries no source field.
pub fn open_sealed(
    sealed: &SealedMessage,
    key: &SessionKey,
    peer_node_id: u64,
) -> Result<Message, MatterError> {
    let nonce_node_id = sealed.header.source_node_id.unwrap_or(peer_node_id);
    let nonce = build_nonce(
        sealed.header.security_flags.as_byte(),
        sealed.header.counter,
        nonce_node_id,
    );
    let plaintext = decrypt(key, &nonce, &sealed.aad, &sealed.ciphertext)?;
    let (protocol, payload) = ProtocolHeader::decode(&plaintext)?;
    Ok(Message {
        header: sealed.header,
        protocol,
        payload: payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SESSION_KEY_SIZE;
    use crate::message::header::SecurityFlags;

    fn secured_message(counter: u32) -> Message {
        Message {
            header: MessageHeader {
                session_id: 0x0101,
                security_flags: SecurityFlags::UNICAST,
                counter,
                source_node_id: None,
                destination: crate::message::Destination::None,
            },
            protocol: ProtocolHeader::new(1, 0x02, 7, true).with_reliability(),
            payload: vec![0x15, 0x18],
        }
    }

    #[test]
    fn test_plain_roundtrip() {
        let message = Message {
            header: MessageHeader::unsecured(5),
            protocol: ProtocolHeader::new(0, 0x20, 1, true),
            payload: vec![1, 2, 3],
        };
        let bytes = encode_plain(&message);
        match decode(&bytes).unwrap() {
            DecodedFrame::Plain(decoded) => assert_eq!(decoded, message),
            DecodedFrame::Sealed(_) => panic!("expected plain frame"),
        }
    }

    #[test]
    fn test_secured_roundtrip() {
        let key = SessionKey::from_bytes([7; SESSION_KEY_SIZE]);
        let message = secured_message(1000);
        let bytes = encode_secured(&message, &key, 0xAABB).unwrap();

        let DecodedFrame::Sealed(sealed) = decode(&bytes).unwrap() else {
            panic!("expected sealed frame");
        };
        assert_eq!(sealed.header.session_id, 0x0101);
        let opened = open_sealed(&sealed, &key, 0xAABB).unwrap();
        assert_eq!(opened, message);
    }

    #[test]
    fn test_wrong_key_fails_auth() {
        let key = SessionKey::from_bytes([7; SESSION_KEY_SIZE]);
        let other = SessionKey::from_bytes([8; SESSION_KEY_SIZE]);
        let bytes = encode_secured(&secured_message(1), &key, 1).unwrap();
        let DecodedFrame::Sealed(sealed) = decode(&bytes).unwrap() else {
            panic!("expected sealed frame");
        };
        assert!(matches!(
            open_sealed(&sealed, &other, 1),
            Err(MatterError::Security(SecurityError::AuthFailed))
        ));
    }

    #[test]
    fn test_tampered_header_fails_auth() {
        let key = SessionKey::from_bytes([7; SESSION_KEY_SIZE]);
        let mut bytes = encode_secured(&secured_message(1), &key, 1).unwrap();
        // flip a security-flags bit in the AAD portion
        bytes[3] ^= 0x40;
        let DecodedFrame::Sealed(sealed) = decode(&bytes).unwrap() else {
            panic!("expected sealed frame");
        };
        assert!(open_sealed(&sealed, &key, 1).is_err());
    }

    #[test]
    fn test_wrong_peer_node_id_fails_auth() {
        let key = SessionKey::from_bytes([7; SESSION_KEY_SIZE]);
        let bytes = encode_secured(&secured_message(1), &key, 0x1111).unwrap();
        let DecodedFrame::Sealed(sealed) = decode(&bytes).unwrap() else {
            panic!("expected sealed frame");
        };
        assert!(open_sealed(&sealed, &key, 0x2222).is_err());
    }
}
