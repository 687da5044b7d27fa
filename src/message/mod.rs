//! Message codec and secure framing.
//!
//! A Matter frame is a plaintext header followed by either a plaintext
//! protocol header + payload (session id 0, used before a session exists) or
//! an AES-128-CCM sealed protocol header + payload with the plaintext header
//! as AAD.

mod codec;
mod header;
mod protocol;
mod status;

pub use codec::{decode, encode_plain, encode_secured, open_sealed, DecodedFrame, Message, SealedMessage};
pub use header::{Destination, MessageHeader, SecurityFlags};
pub use protocol::ProtocolHeader;
pub use status::{GeneralCode, SecureChannelStatus, StatusReport};

/// Secure Channel protocol opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SecureChannelOpcode {
    /// Message counter sync request (reserved, unhandled).
    MsgCounterSyncReq = 0x00,
    /// Message counter sync response (reserved, unhandled).
    MsgCounterSyncRsp = 0x01,
    /// MRP standalone acknowledgement.
    StandaloneAck = 0x10,
    /// PASE: PBKDF parameter request.
    PbkdfParamRequest = 0x20,
    /// PASE: PBKDF parameter response.
    PbkdfParamResponse = 0x21,
    /// PASE: pake1 (pA).
    Pake1 = 0x22,
    /// PASE: pake2 (pB, cB).
    Pake2 = 0x23,
    /// PASE: pake3 (cA).
    Pake3 = 0x24,
    /// CASE: sigma1.
    Sigma1 = 0x30,
    /// CASE: sigma2.
    Sigma2 = 0x31,
    /// CASE: sigma3.
    Sigma3 = 0x32,
    /// CASE: sigma2 resume (session resumption, unhandled).
    Sigma2Resume = 0x33,
    /// Status report.
    StatusReport = 0x40,
}

impl SecureChannelOpcode {
    /// Parse from a wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::MsgCounterSyncReq),
            0x01 => Some(Self::MsgCounterSyncRsp),
            0x10 => Some(Self::StandaloneAck),
            0x20 => Some(Self::PbkdfParamRequest),
            0x21 => Some(Self::PbkdfParamResponse),
            0x22 => Some(Self::Pake1),
            0x23 => Some(Self::Pake2),
            0x24 => Some(Self::Pake3),
            0x30 => Some(Self::Sigma1),
            0x31 => Some(Self::Sigma2),
            0x32 => Some(Self::Sigma3),
            0x33 => Some(Self::Sigma2Resume),
            0x40 => Some(Self::StatusReport),
            _ => None,
        }
    }

    /// Wire byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}
