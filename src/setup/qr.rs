//! QR setup payload.
//!
//! `MT:` plus a base-38 rendering of an 88-bit packed field, LSB first:
//! `version(3) ‖ vendor_id(16) ‖ product_id(16) ‖ flow(2) ‖ discovery(8) ‖
//! discriminator(12) ‖ passcode(27) ‖ pad(4)`. The 11 little-endian bytes are
//! chunked 3/3/3/2 into 5/5/5/4 base-38 characters.

use crate::core::CodecError;

const PREFIX: &str = "MT:";
const ALPHABET: &[u8; 38] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-.";

/// Fields packed into the onboarding payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPayload {
    /// Payload version (3 bits).
    pub version: u8,
    /// Vendor id.
    pub vendor_id: u16,
    /// Product id.
    pub product_id: u16,
    /// Commissioning-flow indicator (2 bits).
    pub custom_flow: u8,
    /// Discovery-capabilities bitmask.
    pub discovery_capabilities: u8,
    /// 12-bit discriminator.
    pub discriminator: u16,
    /// 27-bit setup passcode.
    pub passcode: u32,
}

fn pack(payload: &SetupPayload) -> [u8; 11] {
    let mut value: u128 = 0;
    value |= u128::from(payload.version & 0x07);
    value |= u128::from(payload.vendor_id) << 3;
    value |= u128::from(payload.product_id) << 19;
    value |= u128::from(payload.custom_flow & 0x03) << 35;
    value |= u128::from(payload.discovery_capabilities) << 37;
    value |= u128::from(payload.discriminator & 0x0FFF) << 45;
    value |= u128::from(payload.passcode & 0x07FF_FFFF) << 57;

    let mut bytes = [0u8; 11];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = (value >> (8 * i)) as u8;
    }
    bytes
}

fn unpack(bytes: &[u8; 11]) -> SetupPayload {
    let mut value: u128 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        value |= u128::from(*byte) << (8 * i);
    }
    SetupPayload {
        version: (value & 0x07) as u8,
        vendor_id: ((value >> 3) & 0xFFFF) as u16,
        product_id: ((value >> 19) & 0xFFFF) as u16,
        custom_flow: ((value >> 35) & 0x03) as u8,
        discovery_capabilities: ((value >> 37) & 0xFF) as u8,
        discriminator: ((value >> 45) & 0x0FFF) as u16,
        passcode: ((value >> 57) & 0x07FF_FFFF) as u32,
    }
}

fn chunk_to_chars(mut value: u32, count: usize, out: &mut String) {
    for _ in 0..count {
        out.push(ALPHABET[(value % 38) as usize] as char);
        value /= 38;
    }
}

fn chars_to_chunk(chars: &[u8]) -> Result<u32, CodecError> {
    let mut value: u32 = 0;
    for &c in chars.iter().rev() {
        let digit = ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or(CodecError::InvalidPacket)? as u32;
        value = value * 38 + digit;
    }
    Ok(value)
}

/// Render the payload as a `MT:`-prefixed 19-character string.
pub fn encode_qr(payload: &SetupPayload) -> String {
    let bytes = pack(payload);
    let mut out = String::with_capacity(22);
    out.push_str(PREFIX);
    for group in [&bytes[0..3], &bytes[3..6], &bytes[6..9]] {
        let value =
            u32::from(group[0]) | u32::from(group[1]) << 8 | u32::from(group[2]) << 16;
        chunk_to_chars(value, 5, &mut out);
    }
    let tail = u32::from(bytes[9]) | u32::from(bytes[10]) << 8;
    chunk_to_chars(tail, 4, &mut out);
    out
}

/// Parse a `MT:` payload string back into its fields.
pub fn decode_qr(text: &str) -> Result<SetupPayload, CodecError> {
    let body = text.strip_prefix(PREFIX).ok_or(CodecError::InvalidPacket)?;
    if body.len() != 19 || !body.is_ascii() {
        return Err(CodecError::InvalidPacket);
    }
    let body = body.as_bytes();

    let mut bytes = [0u8; 11];
    for (i, chunk) in body.chunks(5).take(3).enumerate() {
        let value = chars_to_chunk(chunk)?;
        bytes[3 * i] = value as u8;
        bytes[3 * i + 1] = (value >> 8) as u8;
        bytes[3 * i + 2] = (value >> 16) as u8;
    }
    let tail = chars_to_chunk(&body[15..])?;
    if tail > 0xFFFF {
        return Err(CodecError::InvalidPacket);
    }
    bytes[9] = tail as u8;
    bytes[10] = (tail >> 8) as u8;

    Ok(unpack(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_payload(product_id: u16) -> SetupPayload {
        SetupPayload {
            version: 0,
            vendor_id: 0xFFF1,
            product_id,
            custom_flow: 0,
            discovery_capabilities: 2,
            discriminator: 3840,
            passcode: 20202021,
        }
    }

    #[test]
    fn test_known_qr_string() {
        assert_eq!(encode_qr(&test_payload(0x8000)), "MT:Y.K9042C00KA0648G00");
    }

    #[test]
    fn test_known_qr_string_other_product() {
        assert_eq!(encode_qr(&test_payload(0x8001)), "MT:-24J042C00KA0648G00");
    }

    #[test]
    fn test_qr_roundtrip() {
        for payload in [
            test_payload(0x8000),
            SetupPayload {
                version: 5,
                vendor_id: 0x1234,
                product_id: 0x5678,
                custom_flow: 1,
                discovery_capabilities: 0xFF,
                discriminator: 0x0ABC,
                passcode: 0x07FF_FFFF,
            },
        ] {
            assert_eq!(decode_qr(&encode_qr(&payload)).unwrap(), payload);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_qr("Y.K9042C00KA0648G00").is_err());
        assert!(decode_qr("MT:short").is_err());
        assert!(decode_qr("MT:!!K9042C00KA0648G00").is_err());
    }
}
