//! BTP: the BLE Transport Protocol.
//!
//! Handles the handshake (management opcode 0x6C, H|M flags, MTU/window
//! negotiated down to the smaller proposal) and fragmentation of Matter
//! frames over GATT writes/indications.
//!
//! Flags byte bits: H=0x01 handshake, M=0x02 management, A=0x04 ack present,
//! E=0x08 end of message, B=0x10 beginning of message.
//!
//! Data packet layout: `flags ‖ [ack] ‖ seq ‖ [total_len_le16 when B] ‖
//! payload`; the first fragment budget is `MTU-4`, continuations `MTU-2`.
//! Handshake packet layout (9 bytes):
//! `flags ‖ 0x6C ‖ versions(4) ‖ mtu_le16 ‖ window`.

use byteorder::{ByteOrder, LittleEndian};

use crate::core::{BtpError, BTP_DEFAULT_MTU, BTP_DEFAULT_WINDOW, BTP_VERSION};

/// Handshake flag bit.
pub const FLAG_HANDSHAKE: u8 = 0x01;
/// Management flag bit.
pub const FLAG_MANAGEMENT: u8 = 0x02;
/// Ack-present flag bit.
pub const FLAG_ACK: u8 = 0x04;
/// End-of-message flag bit.
pub const FLAG_END: u8 = 0x08;
/// Beginning-of-message flag bit.
pub const FLAG_BEGIN: u8 = 0x10;

/// Management opcode for the BTP handshake.
pub const HANDSHAKE_OPCODE: u8 = 0x6C;

const HANDSHAKE_SIZE: usize = 9;

/// Minimum MTU the fragmenter accepts.
pub const MIN_MTU: u16 = 20;

/// Decoded BTP handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Versions offered (nibble-packed on the wire), highest preference first.
    pub versions: Vec<u8>,
    /// Proposed MTU.
    pub mtu: u16,
    /// Proposed receive window.
    pub window: u8,
}

/// Decoded BTP handshake response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Selected protocol version.
    pub version: u8,
    /// Negotiated MTU.
    pub mtu: u16,
    /// Negotiated window.
    pub window: u8,
}

/// Encode a handshake request offering one version.
pub fn encode_handshake_request(mtu: u16, window: u8) -> Vec<u8> {
    let mut out = vec![0u8; HANDSHAKE_SIZE];
    out[0] = FLAG_HANDSHAKE | FLAG_MANAGEMENT;
    out[1] = HANDSHAKE_OPCODE;
    // offered versions, nibble-packed from the front
    out[2] = BTP_VERSION;
    LittleEndian::write_u16(&mut out[6..8], mtu);
    out[8] = window;
    out
}

/// Decode a handshake request.
pub fn decode_handshake_request(bytes: &[u8]) -> Result<HandshakeRequest, BtpError> {
    if bytes.len() < HANDSHAKE_SIZE {
        return Err(BtpError::InvalidPacket);
    }
    if bytes[0] & (FLAG_HANDSHAKE | FLAG_MANAGEMENT) != (FLAG_HANDSHAKE | FLAG_MANAGEMENT)
        || bytes[1] != HANDSHAKE_OPCODE
    {
        return Err(BtpError::InvalidPacket);
    }
    let mut versions = Vec::new();
    for byte in &bytes[2..6] {
        for nibble in [byte & 0x0F, byte >> 4] {
            if nibble != 0 {
                versions.push(nibble);
            }
        }
    }
    if versions.is_empty() {
        return Err(BtpError::InvalidPacket);
    }
    Ok(HandshakeRequest {
        versions,
        mtu: LittleEndian::read_u16(&bytes[6..8]),
        window: bytes[8],
    })
}

/// Encode a handshake response carrying the selected version.
pub fn encode_handshake_response(version: u8, mtu: u16, window: u8) -> Vec<u8> {
    let mut out = vec![0u8; HANDSHAKE_SIZE];
    out[0] = FLAG_HANDSHAKE | FLAG_MANAGEMENT;
    out[1] = HANDSHAKE_OPCODE;
    LittleEndian::write_u16(&mut out[4..6], u16::from(version));
    LittleEndian::write_u16(&mut out[6..8], mtu);
    out[8] = window;
    out
}

/// Decode a handshake response.
pub fn decode_handshake_response(bytes: &[u8]) -> Result<HandshakeResponse, BtpError> {
    if bytes.len() < HANDSHAKE_SIZE {
        return Err(BtpError::InvalidPacket);
    }
    if bytes[1] != HANDSHAKE_OPCODE {
        return Err(BtpError::InvalidPacket);
    }
    let version = LittleEndian::read_u16(&bytes[4..6]);
    let version = u8::try_from(version).map_err(|_| BtpError::InvalidPacket)?;
    Ok(HandshakeResponse {
        version,
        mtu: LittleEndian::read_u16(&bytes[6..8]),
        window: bytes[8],
    })
}

/// Split a message into BTP fragments starting at `start_seq`.
///
/// The first fragment carries `B` and the 16-bit total length, the last
/// carries `E`; a single-fragment message carries both.
pub fn fragment(message: &[u8], mtu: u16, start_seq: u8) -> Result<Vec<Vec<u8>>, BtpError> {
    if mtu < MIN_MTU {
        return Err(BtpError::InvalidPacket);
    }
    let first_budget = usize::from(mtu) - 4;
    let cont_budget = usize::from(mtu) - 2;

    let mut fragments = Vec::new();
    let mut seq = start_seq;
    let mut offset = 0usize;

    loop {
        let first = offset == 0;
        let budget = if first { first_budget } else { cont_budget };
        let take = budget.min(message.len() - offset);
        let last = offset + take == message.len();

        let mut flags = 0u8;
        if first {
            flags |= FLAG_BEGIN;
        }
        if last {
            flags |= FLAG_END;
        }

        let mut packet = Vec::with_capacity(take + 4);
        packet.push(flags);
        packet.push(seq);
        if first {
            let mut len = [0u8; 2];
            LittleEndian::write_u16(&mut len, message.len() as u16);
            packet.extend_from_slice(&len);
        }
        packet.extend_from_slice(&message[offset..offset + take]);
        fragments.push(packet);

        seq = seq.wrapping_add(1);
        offset += take;
        if last {
            break;
        }
    }
    Ok(fragments)
}

/// Reassembles fragments back into messages, enforcing sequence continuity.
#[derive(Debug, Default)]
pub struct Reassembler {
    expected_seq: Option<u8>,
    buffer: Vec<u8>,
    expected_len: u16,
    in_progress: bool,
}

impl Reassembler {
    /// Fresh reassembler; the first fragment's sequence number is adopted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Returns the full message when `E` completes it.
    pub fn on_fragment(&mut self, packet: &[u8]) -> Result<Option<Vec<u8>>, BtpError> {
        if packet.len() < 2 {
            return Err(BtpError::InvalidPacket);
        }
        let flags = packet[0];
        let mut pos = 1;
        if flags & FLAG_ACK != 0 {
            // ack byte precedes the sequence
            pos += 1;
            if packet.len() < pos + 1 {
                return Err(BtpError::InvalidPacket);
            }
        }
        let seq = packet[pos];
        pos += 1;

        if let Some(expected) = self.expected_seq {
            if seq != expected {
                return Err(BtpError::SequenceGap { expected, actual: seq });
            }
        }
        self.expected_seq = Some(seq.wrapping_add(1));

        if flags & FLAG_BEGIN != 0 {
            if packet.len() < pos + 2 {
                return Err(BtpError::InvalidPacket);
            }
            self.expected_len = LittleEndian::read_u16(&packet[pos..pos + 2]);
            pos += 2;
            self.buffer.clear();
            self.in_progress = true;
        } else if !self.in_progress {
            return Err(BtpError::UnexpectedContinuation);
        }

        self.buffer.extend_from_slice(&packet[pos..]);

        if flags & FLAG_END != 0 {
            self.in_progress = false;
            let message = std::mem::take(&mut self.buffer);
            if message.len() != usize::from(self.expected_len) {
                return Err(BtpError::LengthMismatch {
                    announced: self.expected_len,
                    actual: message.len(),
                });
            }
            return Ok(Some(message));
        }
        Ok(None)
    }
}

/// Per-connection BTP state: negotiated parameters plus both directions'
/// sequence tracking.
#[derive(Debug)]
pub struct BtpSession {
    mtu: u16,
    window: u8,
    tx_seq: u8,
    last_rx_seq: Option<u8>,
    ack_pending: bool,
    reassembler: Reassembler,
}

impl BtpSession {
    /// Session with explicitly negotiated parameters.
    pub fn new(mtu: u16, window: u8) -> Self {
        Self {
            mtu,
            window,
            tx_seq: 0,
            last_rx_seq: None,
            ack_pending: false,
            reassembler: Reassembler::new(),
        }
    }

    /// Server side: accept a handshake request, negotiating each parameter
    /// down to the smaller proposal. Returns the session and response bytes.
    pub fn accept(request_bytes: &[u8]) -> Result<(Self, Vec<u8>), BtpError> {
        let request = decode_handshake_request(request_bytes)?;
        if !request.versions.contains(&BTP_VERSION) {
            return Err(BtpError::InvalidPacket);
        }
        let mtu = request.mtu.min(BTP_DEFAULT_MTU).max(MIN_MTU);
        let window = request.window.min(BTP_DEFAULT_WINDOW);
        let response = encode_handshake_response(BTP_VERSION, mtu, window);
        Ok((Self::new(mtu, window), response))
    }

    /// Negotiated MTU.
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Negotiated window.
    pub fn window(&self) -> u8 {
        self.window
    }

    /// Fragment an outbound message, consuming sequence numbers.
    pub fn send(&mut self, message: &[u8]) -> Result<Vec<Vec<u8>>, BtpError> {
        let fragments = fragment(message, self.mtu, self.tx_seq)?;
        self.tx_seq = self.tx_seq.wrapping_add(fragments.len() as u8);
        Ok(fragments)
    }

    /// Process an inbound fragment; returns a complete message when one
    /// finishes reassembly.
    pub fn receive(&mut self, packet: &[u8]) -> Result<Option<Vec<u8>>, BtpError> {
        let result = self.reassembler.on_fragment(packet)?;
        if packet.len() >= 2 {
            let seq_index = if packet[0] & FLAG_ACK != 0 { 2 } else { 1 };
            self.last_rx_seq = packet.get(seq_index).copied();
        }
        self.ack_pending = true;
        Ok(result)
    }

    /// Take the pending ack sequence for piggybacking, if any.
    pub fn take_pending_ack(&mut self) -> Option<u8> {
        if self.ack_pending {
            self.ack_pending = false;
            self.last_rx_seq
        } else {
            None
        }
    }
}
