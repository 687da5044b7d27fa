//! Protocol header.
//!
//! Carried inside the encrypted envelope for secured messages, in the clear
//! for session-id-0 messages. Wire format:
//! ```text
//! +--------+--------+-------------+------------+-------------+------------+
//! | Flags  | Opcode | Exchange ID | [Vendor ID]| Protocol ID | [Ack Ctr]  |
//! | 1 byte | 1 byte | 2 (LE16)    | 2 (LE16)   | 2 (LE16)    | 4 (LE32)   |
//! +--------+--------+-------------+------------+-------------+------------+
//! ```
//! followed by optional secured extensions (`LE16` length + data) and the
//! application payload.

use byteorder::{ByteOrder, LittleEndian};

use crate::core::CodecError;

const FLAG_INITIATOR: u8 = 0x01;
const FLAG_ACK: u8 = 0x02;
const FLAG_RELIABILITY: u8 = 0x04;
const FLAG_SECURED_EXTENSIONS: u8 = 0x08;
const FLAG_VENDOR: u8 = 0x10;

/// Decoded protocol header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolHeader {
    /// Set on messages sent by the exchange initiator.
    pub initiator: bool,
    /// Sender requests reliable delivery (MRP ack).
    pub reliability: bool,
    /// Protocol opcode.
    pub opcode: u8,
    /// Exchange id.
    pub exchange_id: u16,
    /// Protocol vendor id; 0 for standard protocols.
    pub vendor_id: u16,
    /// Protocol id (0 = Secure Channel, 1 = Interaction Model).
    pub protocol_id: u16,
    /// Acknowledged message counter, when piggybacking an ack.
    pub ack_counter: Option<u32>,
    /// Secured extensions blob, rarely present.
    pub secured_extensions: Option<Vec<u8>>,
}

impl ProtocolHeader {
    /// Header for a new message on an exchange.
    pub fn new(protocol_id: u16, opcode: u8, exchange_id: u16, initiator: bool) -> Self {
        Self {
            initiator,
            reliability: false,
            opcode,
            exchange_id,
            vendor_id: 0,
            protocol_id,
            ack_counter: None,
            secured_extensions: None,
        }
    }

    /// Request reliable delivery.
    pub fn with_reliability(mut self) -> Self {
        self.reliability = true;
        self
    }

    /// Piggyback an acknowledgement.
    pub fn with_ack(mut self, counter: u32) -> Self {
        self.ack_counter = Some(counter);
        self
    }

    /// Serialize, appending `payload` after the header fields.
    pub fn encode_with_payload(&self, payload: &[u8]) -> Vec<u8> {
        let mut flags = 0u8;
        if self.initiator {
            flags |= FLAG_INITIATOR;
        }
        if self.ack_counter.is_some() {
            flags |= FLAG_ACK;
        }
        if self.reliability {
            flags |= FLAG_RELIABILITY;
        }
        if self.secured_extensions.is_some() {
            flags |= FLAG_SECURED_EXTENSIONS;
        }
        if self.vendor_id != 0 {
            flags |= FLAG_VENDOR;
        }

        let mut out = Vec::with_capacity(10 + payload.len());
        out.push(flags);
        out.push(self.opcode);
        out.extend_from_slice(&self.exchange_id.to_le_bytes());
        if self.vendor_id != 0 {
            out.extend_from_slice(&self.vendor_id.to_le_bytes());
        }
        out.extend_from_slice(&self.protocol_id.to_le_bytes());
        if let Some(counter) = self.ack_counter {
            out.extend_from_slice(&counter.to_le_bytes());
        }
        if let Some(ext) = &self.secured_extensions {
            out.extend_from_slice(&(ext.len() as u16).to_le_bytes());
            out.extend_from_slice(ext);
        }
        out.extend_from_slice(payload);
        out
    }

    /// Parse from the front of `bytes`; returns the header and the payload
    /// that follows it.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        if bytes.len() < 6 {
            return Err(CodecError::Truncated);
        }
        let flags = bytes[0];
        let opcode = bytes[1];
        let exchange_id = LittleEndian::read_u16(&bytes[2..4]);

        let mut pos = 4;
        let vendor_id = if flags & FLAG_VENDOR != 0 {
            if bytes.len() < pos + 2 {
                return Err(CodecError::Truncated);
            }
            let id = LittleEndian::read_u16(&bytes[pos..pos + 2]);
            pos += 2;
            id
        } else {
            0
        };

        if bytes.len() < pos + 2 {
            return Err(CodecError::Truncated);
        }
        let protocol_id = LittleEndian::read_u16(&bytes[pos..pos + 2]);
        pos += 2;

        let ack_counter = if flags & FLAG_ACK != 0 {
            if bytes.len() < pos + 4 {
                return Err(CodecError::Truncated);
            }
            let counter = LittleEndian::read_u32(&bytes[pos..pos + 4]);
            pos += 4;
            Some(counter)
        } else {
            None
        };

        let secured_extensions = if flags & FLAG_SECURED_EXTENSIONS != 0 {
            if bytes.len() < pos + 2 {
                return Err(CodecError::Truncated);
            }
            let len = usize::from(LittleEndian::read_u16(&bytes[pos..pos + 2]));
            pos += 2;
            if bytes.len() < pos + len {
                return Err(CodecError::Truncated);
            }
            let ext = bytes[pos..pos + len].to_vec();
            pos += len;
            Some(ext)
        } else {
            None
        };

        let header = Self {
            initiator: flags & FLAG_INITIATOR != 0,
            reliability: flags & FLAG_RELIABILITY != 0,
            opcode,
            exchange_id,
            vendor_id,
            protocol_id,
            ack_counter,
            secured_extensions,
        };
        Ok((header, &bytes[pos..]))
    }
}
