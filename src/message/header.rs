//! Plaintext message header.
//!
//! Wire format:
//! ```text
//! +---------+------------+----------+-------------+----------+-----------------+
//! | Flags   | Session ID | Security | Counter     | [Source] | [Dest | Group]  |
//! | 1 byte  | 2 (LE16)   | 1 byte   | 4 (LE32)    | 8 (LE64) | 8 (LE64)/2 LE16 |
//! +---------+------------+----------+-------------+----------+-----------------+
//! ```
//! Flags carry the version (high nibble), the S bit (source present) and the
//! 2-bit DSIZ field (destination kind). DSIZ 3 is reserved.

use byteorder::{ByteOrder, LittleEndian};

use crate::core::{CodecError, MESSAGE_VERSION};

const FLAG_SOURCE_PRESENT: u8 = 0x04;
const DSIZ_NONE: u8 = 0;
const DSIZ_NODE: u8 = 1;
const DSIZ_GROUP: u8 = 2;

/// Security flags byte of the plaintext header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityFlags(u8);

impl SecurityFlags {
    /// Unicast session, no privacy/control bits.
    pub const UNICAST: Self = Self(0);
    /// Group session type bit pattern.
    pub const GROUP: Self = Self(0x01);

    /// Wrap a raw byte.
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Raw byte value (also the first nonce byte).
    pub fn as_byte(self) -> u8 {
        self.0
    }

    /// Session type from the low two bits: `true` for group.
    pub fn is_group(self) -> bool {
        self.0 & 0x03 == 0x01
    }

    /// Privacy bit.
    pub fn is_private(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// Control-message bit.
    pub fn is_control(self) -> bool {
        self.0 & 0x40 != 0
    }
}

/// Destination field of the plaintext header: node, group, or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// No destination field.
    #[default]
    None,
    /// 64-bit destination node id.
    Node(u64),
    /// 16-bit group id.
    Group(u16),
}

/// Decoded plaintext message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Local session id of the receiver (0 = unsecured).
    pub session_id: u16,
    /// Security flags (session type, privacy, control).
    pub security_flags: SecurityFlags,
    /// 32-bit message counter.
    pub counter: u32,
    /// Source node id, present when the S flag is set.
    pub source_node_id: Option<u64>,
    /// Destination node or group.
    pub destination: Destination,
}

impl MessageHeader {
    /// Minimal header size: flags + session id + security flags + counter.
    pub const MIN_SIZE: usize = 8;

    /// Header for an unsecured (session id 0) message.
    pub fn unsecured(counter: u32) -> Self {
        Self {
            session_id: 0,
            security_flags: SecurityFlags::UNICAST,
            counter,
            source_node_id: None,
            destination: Destination::None,
        }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut flags = MESSAGE_VERSION << 4;
        if self.source_node_id.is_some() {
            flags |= FLAG_SOURCE_PRESENT;
        }
        flags |= match self.destination {
            Destination::None => DSIZ_NONE,
            Destination::Node(_) => DSIZ_NODE,
            Destination::Group(_) => DSIZ_GROUP,
        };

        let mut out = Vec::with_capacity(Self::MIN_SIZE + 16);
        out.push(flags);
        out.extend_from_slice(&self.session_id.to_le_bytes());
        out.push(self.security_flags.as_byte());
        out.extend_from_slice(&self.counter.to_le_bytes());
        if let Some(source) = self.source_node_id {
            out.extend_from_slice(&source.to_le_bytes());
        }
        match self.destination {
            Destination::None => {}
            Destination::Node(id) => out.extend_from_slice(&id.to_le_bytes()),
            Destination::Group(id) => out.extend_from_slice(&id.to_le_bytes()),
        }
        out
    }

    /// Parse a header from the front of `bytes`; returns the header and the
    /// number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), CodecError> {
        if bytes.len() < Self::MIN_SIZE {
            return Err(CodecError::Truncated);
        }
        let flags = bytes[0];
        if flags >> 4 != MESSAGE_VERSION {
            return Err(CodecError::InvalidMessage);
        }
        let session_id = LittleEndian::read_u16(&bytes[1..3]);
        let security_flags = SecurityFlags::from_byte(bytes[3]);
        let counter = LittleEndian::read_u32(&bytes[4..8]);

        let mut pos = Self::MIN_SIZE;
        let source_node_id = if flags & FLAG_SOURCE_PRESENT != 0 {
            if bytes.len() < pos + 8 {
                return Err(CodecError::Truncated);
            }
            let id = LittleEndian::read_u64(&bytes[pos..pos + 8]);
            pos += 8;
            Some(id)
        } else {
            None
        };

        let destination = match flags & 0x03 {
            DSIZ_NONE => Destination::None,
            DSIZ_NODE => {
                if bytes.len() < pos + 8 {
                    return Err(CodecError::Truncated);
                }
                let id = LittleEndian::read_u64(&bytes[pos..pos + 8]);
                pos += 8;
                Destination::Node(id)
            }
            DSIZ_GROUP => {
                if bytes.len() < pos + 2 {
                    return Err(CodecError::Truncated);
                }
                let id = LittleEndian::read_u16(&bytes[pos..pos + 2]);
                pos += 2;
                Destination::Group(id)
            }
            _ => return Err(CodecError::InvalidDsiz),
        };

        Ok((
            Self { session_id, security_flags, counter, source_node_id, destination },
            pos,
        ))
    }
}
