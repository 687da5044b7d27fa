//! TLV decoder.
//!
//! Recursive-descent parser over attacker-supplied bytes: every failure is a
//! typed `CodecError::InvalidTlv`, never a panic. Container depth is bounded.

use crate::core::CodecError;

use super::value::{Tag, TlvValue};
use super::wire::{element, tag_control};

/// Maximum container nesting accepted from the wire.
const MAX_DEPTH: usize = 16;

/// Decode one TLV element (and everything nested in it) from `bytes`.
///
/// Trailing bytes after the first top-level element are rejected.
pub fn decode(bytes: &[u8]) -> Result<TlvValue, CodecError> {
    let mut r = Reader { bytes, pos: 0 };
    let (_, value) = r.read_element(0)?;
    if r.pos != bytes.len() {
        return Err(CodecError::InvalidTlv);
    }
    Ok(value)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::InvalidTlv)?;
        if end > self.bytes.len() {
            return Err(CodecError::InvalidTlv);
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn take_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_u64(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_tag(&mut self, tc: u8) -> Result<Tag, CodecError> {
        match tc {
            tag_control::ANONYMOUS => Ok(Tag::Anonymous),
            tag_control::CONTEXT => Ok(Tag::Context(self.take_u8()?)),
            tag_control::COMMON_PROFILE_16 => Ok(Tag::CommonProfile(u32::from(self.take_u16()?))),
            tag_control::COMMON_PROFILE_32 => Ok(Tag::CommonProfile(self.take_u32()?)),
            tag_control::IMPLICIT_PROFILE_16 => {
                Ok(Tag::ImplicitProfile(u32::from(self.take_u16()?)))
            }
            tag_control::IMPLICIT_PROFILE_32 => Ok(Tag::ImplicitProfile(self.take_u32()?)),
            tag_control::FULLY_QUALIFIED_16 => {
                let vendor_id = self.take_u16()?;
                let profile = self.take_u16()?;
                let tag = u32::from(self.take_u16()?);
                Ok(Tag::FullyQualified { vendor_id, profile, tag })
            }
            tag_control::FULLY_QUALIFIED_32 => {
                let vendor_id = self.take_u16()?;
                let profile = self.take_u16()?;
                let tag = self.take_u32()?;
                Ok(Tag::FullyQualified { vendor_id, profile, tag })
            }
            _ => Err(CodecError::InvalidTlv),
        }
    }

    /// Read one element. Returns its tag and value. `END_OF_CONTAINER` is
    /// only legal inside `read_container`, never here.
    fn read_element(&mut self, depth: usize) -> Result<(Tag, TlvValue), CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::InvalidTlv);
        }
        let ctrl = self.take_u8()?;
        let tc = ctrl >> 5;
        let et = ctrl & 0x1F;
        if et == element::END_OF_CONTAINER {
            return Err(CodecError::InvalidTlv);
        }
        let tag = self.read_tag(tc)?;
        let value = match et {
            element::INT8 => TlvValue::Signed(i64::from(self.take_u8()? as i8)),
            element::INT16 => TlvValue::Signed(i64::from(self.take_u16()? as i16)),
            element::INT32 => TlvValue::Signed(i64::from(self.take_u32()? as i32)),
            element::INT64 => TlvValue::Signed(self.take_u64()? as i64),
            element::UINT8 => TlvValue::Unsigned(u64::from(self.take_u8()?)),
            element::UINT16 => TlvValue::Unsigned(u64::from(self.take_u16()?)),
            element::UINT32 => TlvValue::Unsigned(u64::from(self.take_u32()?)),
            element::UINT64 => TlvValue::Unsigned(self.take_u64()?),
            element::BOOL_FALSE => TlvValue::Bool(false),
            element::BOOL_TRUE => TlvValue::Bool(true),
            element::FLOAT32 => {
                let b = self.take(4)?;
                TlvValue::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            element::FLOAT64 => {
                let b = self.take(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(b);
                TlvValue::Double(f64::from_le_bytes(buf))
            }
            element::UTF8_LEN1 | element::UTF8_LEN2 | element::UTF8_LEN4 | element::UTF8_LEN8 => {
                let len = self.read_length(et - element::UTF8_LEN1)?;
                let data = self.take(len)?;
                let s = std::str::from_utf8(data).map_err(|_| CodecError::InvalidTlv)?;
                TlvValue::Utf8(s.to_owned())
            }
            element::BYTES_LEN1 | element::BYTES_LEN2 | element::BYTES_LEN4
            | element::BYTES_LEN8 => {
                let len = self.read_length(et - element::BYTES_LEN1)?;
                TlvValue::Bytes(self.take(len)?.to_vec())
            }
            element::NULL => TlvValue::Null,
            element::STRUCT => self.read_struct(depth)?,
            element::ARRAY => self.read_array(depth)?,
            element::LIST => self.read_list(depth)?,
            _ => return Err(CodecError::InvalidTlv),
        };
        Ok((tag, value))
    }

    fn read_length(&mut self, width_code: u8) -> Result<usize, CodecError> {
        let len = match width_code {
            0 => u64::from(self.take_u8()?),
            1 => u64::from(self.take_u16()?),
            2 => u64::from(self.take_u32()?),
            3 => self.take_u64()?,
            _ => return Err(CodecError::InvalidTlv),
        };
        usize::try_from(len).map_err(|_| CodecError::InvalidTlv)
    }

    fn at_container_end(&mut self) -> Result<bool, CodecError> {
        match self.bytes.get(self.pos) {
            Some(&b) if b == element::END_OF_CONTAINER => {
                self.pos += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CodecError::InvalidTlv),
        }
    }

    fn read_struct(&mut self, depth: usize) -> Result<TlvValue, CodecError> {
        let mut fields = Vec::new();
        while !self.at_container_end()? {
            let (tag, value) = self.read_element(depth + 1)?;
            let Tag::Context(t) = tag else {
                return Err(CodecError::InvalidTlv);
            };
            fields.push((t, value));
        }
        Ok(TlvValue::Struct(fields))
    }

    fn read_array(&mut self, depth: usize) -> Result<TlvValue, CodecError> {
        let mut items = Vec::new();
        while !self.at_container_end()? {
            let (tag, value) = self.read_element(depth + 1)?;
            if tag != Tag::Anonymous {
                return Err(CodecError::InvalidTlv);
            }
            items.push(value);
        }
        Ok(TlvValue::Array(items))
    }

    fn read_list(&mut self, depth: usize) -> Result<TlvValue, CodecError> {
        let mut items = Vec::new();
        while !self.at_container_end()? {
            items.push(self.read_element(depth + 1)?);
        }
        Ok(TlvValue::List(items))
    }
}
