//! StatusReport wire format.
//!
//! Fixed 8-byte layout, not TLV:
//! `general_code_le16 ‖ protocol_id_le32 ‖ protocol_code_le16`.

use byteorder::{ByteOrder, LittleEndian};

use crate::core::CodecError;

/// General status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum GeneralCode {
    /// Operation succeeded.
    Success = 0,
    /// Operation failed; no further detail is wired.
    Failure = 1,
}

/// Secure Channel protocol-specific status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SecureChannelStatus {
    /// Session establishment succeeded.
    SessionEstablishmentSuccess = 0x0000,
    /// No shared trust roots between peers.
    NoSharedTrustRoots = 0x0001,
    /// Invalid handshake parameter.
    InvalidParameter = 0x0002,
    /// Session close notification.
    CloseSession = 0x0003,
    /// Responder busy; retry later.
    Busy = 0x0004,
}

/// An 8-byte StatusReport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    /// General code (success/failure).
    pub general_code: u16,
    /// Protocol the code belongs to.
    pub protocol_id: u32,
    /// Protocol-specific code.
    pub protocol_code: u16,
}

impl StatusReport {
    /// Wire size.
    pub const SIZE: usize = 8;

    /// Session-establishment success report.
    pub fn session_establishment_success() -> Self {
        Self {
            general_code: GeneralCode::Success as u16,
            protocol_id: 0,
            protocol_code: SecureChannelStatus::SessionEstablishmentSuccess as u16,
        }
    }

    /// Generic handshake failure report. All crypto failures map here so the
    /// wire never distinguishes them.
    pub fn session_establishment_failure() -> Self {
        Self {
            general_code: GeneralCode::Failure as u16,
            protocol_id: 0,
            protocol_code: SecureChannelStatus::InvalidParameter as u16,
        }
    }

    /// Whether this report carries `Success`.
    pub fn is_success(&self) -> bool {
        self.general_code == GeneralCode::Success as u16
    }

    /// Serialize to the fixed 8-byte layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        LittleEndian::write_u16(&mut out[0..2], self.general_code);
        LittleEndian::write_u32(&mut out[2..6], self.protocol_id);
        LittleEndian::write_u16(&mut out[6..8], self.protocol_code);
        out
    }

    /// Parse from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < Self::SIZE {
            return Err(CodecError::Truncated);
        }
        Ok(Self {
            general_code: LittleEndian::read_u16(&bytes[0..2]),
            protocol_id: LittleEndian::read_u32(&bytes[2..6]),
            protocol_code: LittleEndian::read_u16(&bytes[6..8]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let report = StatusReport::session_establishment_success();
        let bytes = report.to_bytes();
        assert_eq!(bytes, [0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(StatusReport::from_bytes(&bytes).unwrap(), report);
        assert!(report.is_success());
    }

    #[test]
    fn test_failure_layout() {
        let report = StatusReport::session_establishment_failure();
        let bytes = report.to_bytes();
        assert_eq!(bytes[0..2], [1, 0]);
        assert_eq!(bytes[6..8], [2, 0]);
        assert!(!report.is_success());
    }

    #[test]
    fn test_truncated() {
        assert_eq!(
            StatusReport::from_bytes(&[0; 7]),
            Err(CodecError::Truncated)
        );
    }
}
