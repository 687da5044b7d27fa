//! Error types for the Matter protocol stack.

use thiserror::Error;

/// Malformed input detected at the codec layer.
///
/// Codec failures drop the offending frame with a log line; they never tear
/// down the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Frame or header shorter than its fixed fields require.
    #[error("truncated input")]
    Truncated,

    /// TLV element malformed: truncation, unknown element type, or
    /// container-end mismatch.
    #[error("invalid TLV encoding")]
    InvalidTlv,

    /// Message violates the header format.
    #[error("invalid message")]
    InvalidMessage,

    /// Reserved destination-size bits set in the message flags.
    #[error("invalid DSIZ field")]
    InvalidDsiz,

    /// Packet violates a transport framing rule.
    #[error("invalid packet")]
    InvalidPacket,
}

/// Security and replay failures for secured messages.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SecurityError {
    /// No usable session under the local session id.
    #[error("session mismatch")]
    SessionMismatch,

    /// AEAD authentication failed.
    #[error("authentication failed")]
    AuthFailed,

    /// Message counter already seen inside the replay window.
    #[error("duplicate message counter")]
    Duplicate,

    /// Message counter older than the replay window covers.
    #[error("message counter too old")]
    TooOld,
}

/// Handshake state-machine violations (PASE and CASE).
///
/// Any of these emits a failure StatusReport and aborts the provisional
/// session. Crypto failures are never distinguishable on the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Key-confirmation value did not verify.
    #[error("confirmation failed")]
    ConfirmationFailed,

    /// Peer credentials or derived material failed validation.
    #[error("session establishment failed")]
    SessionEstablishmentFailed,

    /// Message arrived in a state that does not expect it.
    #[error("unexpected message in state {state}")]
    UnexpectedMessage {
        /// Name of the state the FSM was in.
        state: &'static str,
    },

    /// Handshake payload could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// BTP reassembly failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BtpError {
    /// Fragment sequence number is not the expected successor.
    #[error("sequence gap: expected {expected}, got {actual}")]
    SequenceGap {
        /// Next sequence number the reassembler would accept.
        expected: u8,
        /// Sequence number actually carried by the fragment.
        actual: u8,
    },

    /// Continuation fragment with no beginning fragment outstanding.
    #[error("continuation without a beginning fragment")]
    UnexpectedContinuation,

    /// Reassembled length differs from the announced total length.
    #[error("length mismatch: announced {announced}, reassembled {actual}")]
    LengthMismatch {
        /// Total length from the beginning fragment.
        announced: u16,
        /// Bytes actually reassembled.
        actual: usize,
    },

    /// Packet shorter than its flags require.
    #[error("invalid BTP packet")]
    InvalidPacket,
}

/// Transport and reliability failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The bound transport is gone.
    #[error("not connected")]
    NotConnected,

    /// Retransmit budget exhausted without an ack.
    #[error("reliable delivery timed out")]
    Timeout,

    /// I/O error from the socket layer.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for the stack.
#[derive(Debug, Error)]
pub enum MatterError {
    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Security error.
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// Handshake error.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// BTP error.
    #[error("btp error: {0}")]
    Btp(#[from] BtpError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Resource limit reached (sessions, exchanges, subscriptions).
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),
}
