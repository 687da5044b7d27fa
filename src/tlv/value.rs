//! TLV value model.

/// Tag attached to a TLV element.
///
/// Struct members always carry context tags and are modelled directly as
/// `(u8, TlvValue)` pairs; `Tag` appears where any tag form is legal (list
/// members and top-level elements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// No tag. Array members are always anonymous.
    Anonymous,
    /// Context tag, scoped to the enclosing container (0..=255).
    Context(u8),
    /// Common-profile tag (16- or 32-bit on the wire, chosen on encode).
    CommonProfile(u32),
    /// Implicit-profile tag (16- or 32-bit on the wire).
    ImplicitProfile(u32),
    /// Fully qualified vendor/profile/tag.
    FullyQualified {
        /// Vendor id.
        vendor_id: u16,
        /// Profile number within the vendor.
        profile: u16,
        /// Tag number (16- or 32-bit on the wire).
        tag: u32,
    },
}

/// A decoded Matter TLV tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TlvValue {
    /// Signed integer, encoded at 1/2/4/8 bytes (smallest that fits).
    Signed(i64),
    /// Unsigned integer, encoded at 1/2/4/8 bytes (smallest that fits).
    Unsigned(u64),
    /// Boolean; the value lives in the element-type byte.
    Bool(bool),
    /// Single-precision float.
    Float(f32),
    /// Double-precision float.
    Double(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Octet string.
    Bytes(Vec<u8>),
    /// Null; no value bytes.
    Null,
    /// Structure: context-tagged members, canonically sorted by tag on encode.
    Struct(Vec<(u8, TlvValue)>),
    /// Array: ordered anonymous members.
    Array(Vec<TlvValue>),
    /// List: ordered members that may carry tags.
    List(Vec<(Tag, TlvValue)>),
}

impl TlvValue {
    /// Look up a struct member by context tag.
    pub fn field(&self, tag: u8) -> Option<&TlvValue> {
        match self {
            TlvValue::Struct(fields) => {
                fields.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
            }
            TlvValue::List(items) => items
                .iter()
                .find(|(t, _)| *t == Tag::Context(tag))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Walk nested structs by context-tag path.
    pub fn path(&self, tags: &[u8]) -> Option<&TlvValue> {
        let mut cur = self;
        for &tag in tags {
            cur = cur.field(tag)?;
        }
        Some(cur)
    }

    /// Unsigned integer value, if this is one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TlvValue::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    /// Signed integer value, accepting unsigned encodings that fit.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TlvValue::Signed(v) => Some(*v),
            TlvValue::Unsigned(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Boolean value, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TlvValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Octet-string contents, if this is one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TlvValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// UTF-8 string contents, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TlvValue::Utf8(v) => Some(v),
            _ => None,
        }
    }

    /// Array members, if this is an array.
    pub fn as_array(&self) -> Option<&[TlvValue]> {
        match self {
            TlvValue::Array(v) => Some(v),
            _ => None,
        }
    }
}
