//! TLV encoder.
//!
//! Chooses the smallest integer width and length prefix; emits struct fields
//! sorted ascending by context tag so signed payloads hash stably.

use super::value::{Tag, TlvValue};
use super::wire::{element, tag_control};

/// Encode a TLV tree to bytes.
pub fn encode(value: &TlvValue) -> Vec<u8> {
    let mut out = Vec::new();
    encode_element(&mut out, Tag::Anonymous, value);
    out
}

/// Encode a single element with an explicit tag (for callers embedding TLV
/// inside another stream).
pub(crate) fn encode_tagged(out: &mut Vec<u8>, tag: Tag, value: &TlvValue) {
    encode_element(out, tag, value);
}

fn control(tag: Tag, element_type: u8) -> u8 {
    let tc = match tag {
        Tag::Anonymous => tag_control::ANONYMOUS,
        Tag::Context(_) => tag_control::CONTEXT,
        Tag::CommonProfile(t) if t <= 0xFFFF => tag_control::COMMON_PROFILE_16,
        Tag::CommonProfile(_) => tag_control::COMMON_PROFILE_32,
        Tag::ImplicitProfile(t) if t <= 0xFFFF => tag_control::IMPLICIT_PROFILE_16,
        Tag::ImplicitProfile(_) => tag_control::IMPLICIT_PROFILE_32,
        Tag::FullyQualified { tag: t, .. } if t <= 0xFFFF => tag_control::FULLY_QUALIFIED_16,
        Tag::FullyQualified { .. } => tag_control::FULLY_QUALIFIED_32,
    };
    (tc << 5) | element_type
}

fn push_tag(out: &mut Vec<u8>, tag: Tag) {
    match tag {
        Tag::Anonymous => {}
        Tag::Context(t) => out.push(t),
        Tag::CommonProfile(t) | Tag::ImplicitProfile(t) => {
            if t <= 0xFFFF {
                out.extend_from_slice(&(t as u16).to_le_bytes());
            } else {
                out.extend_from_slice(&t.to_le_bytes());
            }
        }
        Tag::FullyQualified { vendor_id, profile, tag: t } => {
            out.extend_from_slice(&vendor_id.to_le_bytes());
            out.extend_from_slice(&profile.to_le_bytes());
            if t <= 0xFFFF {
                out.extend_from_slice(&(t as u16).to_le_bytes());
            } else {
                out.extend_from_slice(&t.to_le_bytes());
            }
        }
    }
}

fn encode_element(out: &mut Vec<u8>, tag: Tag, value: &TlvValue) {
    match value {
        TlvValue::Signed(v) => encode_signed(out, tag, *v),
        TlvValue::Unsigned(v) => encode_unsigned(out, tag, *v),
        TlvValue::Bool(v) => {
            let et = if *v { element::BOOL_TRUE } else { element::BOOL_FALSE };
            out.push(control(tag, et));
            push_tag(out, tag);
        }
        TlvValue::Float(v) => {
            out.push(control(tag, element::FLOAT32));
            push_tag(out, tag);
            out.extend_from_slice(&v.to_le_bytes());
        }
        TlvValue::Double(v) => {
            out.push(control(tag, element::FLOAT64));
            push_tag(out, tag);
            out.extend_from_slice(&v.to_le_bytes());
        }
        TlvValue::Utf8(s) => encode_bytes_like(out, tag, element::UTF8_LEN1, s.as_bytes()),
        TlvValue::Bytes(b) => encode_bytes_like(out, tag, element::BYTES_LEN1, b),
        TlvValue::Null => {
            out.push(control(tag, element::NULL));
            push_tag(out, tag);
        }
        TlvValue::Struct(fields) => {
            out.push(control(tag, element::STRUCT));
            push_tag(out, tag);
            let mut sorted: Vec<&(u8, TlvValue)> = fields.iter().collect();
            sorted.sort_by_key(|(t, _)| *t);
            for (t, v) in sorted {
                encode_element(out, Tag::Context(*t), v);
            }
            out.push(element::END_OF_CONTAINER);
        }
        TlvValue::Array(items) => {
            out.push(control(tag, element::ARRAY));
            push_tag(out, tag);
            for v in items {
                encode_element(out, Tag::Anonymous, v);
            }
            out.push(element::END_OF_CONTAINER);
        }
        TlvValue::List(items) => {
            out.push(control(tag, element::LIST));
            push_tag(out, tag);
            for (t, v) in items {
                encode_element(out, *t, v);
            }
            out.push(element::END_OF_CONTAINER);
        }
    }
}

fn encode_unsigned(out: &mut Vec<u8>, tag: Tag, v: u64) {
    if v <= u64::from(u8::MAX) {
        out.push(control(tag, element::UINT8));
        push_tag(out, tag);
        out.push(v as u8);
    } else if v <= u64::from(u16::MAX) {
        out.push(control(tag, element::UINT16));
        push_tag(out, tag);
        out.extend_from_slice(&(v as u16).to_le_bytes());
    } else if v <= u64::from(u32::MAX) {
        out.push(control(tag, element::UINT32));
        push_tag(out, tag);
        out.extend_from_slice(&(v as u32).to_le_bytes());
    } else {
        out.push(control(tag, element::UINT64));
        push_tag(out, tag);
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn encode_signed(out: &mut Vec<u8>, tag: Tag, v: i64) {
    if let Ok(v8) = i8::try_from(v) {
        out.push(control(tag, element::INT8));
        push_tag(out, tag);
        out.push(v8 as u8);
    } else if let Ok(v16) = i16::try_from(v) {
        out.push(control(tag, element::INT16));
        push_tag(out, tag);
        out.extend_from_slice(&v16.to_le_bytes());
    } else if let Ok(v32) = i32::try_from(v) {
        out.push(control(tag, element::INT32));
        push_tag(out, tag);
        out.extend_from_slice(&v32.to_le_bytes());
    } else {
        out.push(control(tag, element::INT64));
        push_tag(out, tag);
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn encode_bytes_like(out: &mut Vec<u8>, tag: Tag, base: u8, data: &[u8]) {
    let len = data.len();
    if len <= usize::from(u8::MAX) {
        out.push(control(tag, base));
        push_tag(out, tag);
        out.push(len as u8);
    } else if len <= usize::from(u16::MAX) {
        out.push(control(tag, base + 1));
        push_tag(out, tag);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(control(tag, base + 2));
        push_tag(out, tag);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
}
