//! Wire-level constants for the TLV control byte.
//!
//! A control byte is `tag_control << 5 | element_type`.

/// Element types (low 5 bits).
pub mod element {
    pub const INT8: u8 = 0x00;
    pub const INT16: u8 = 0x01;
    pub const INT32: u8 = 0x02;
    pub const INT64: u8 = 0x03;
    pub const UINT8: u8 = 0x04;
    pub const UINT16: u8 = 0x05;
    pub const UINT32: u8 = 0x06;
    pub const UINT64: u8 = 0x07;
    pub const BOOL_FALSE: u8 = 0x08;
    pub const BOOL_TRUE: u8 = 0x09;
    pub const FLOAT32: u8 = 0x0A;
    pub const FLOAT64: u8 = 0x0B;
    pub const UTF8_LEN1: u8 = 0x0C;
    pub const UTF8_LEN2: u8 = 0x0D;
    pub const UTF8_LEN4: u8 = 0x0E;
    pub const UTF8_LEN8: u8 = 0x0F;
    pub const BYTES_LEN1: u8 = 0x10;
    pub const BYTES_LEN2: u8 = 0x11;
    pub const BYTES_LEN4: u8 = 0x12;
    pub const BYTES_LEN8: u8 = 0x13;
    pub const NULL: u8 = 0x14;
    pub const STRUCT: u8 = 0x15;
    pub const ARRAY: u8 = 0x16;
    pub const LIST: u8 = 0x17;
    pub const END_OF_CONTAINER: u8 = 0x18;
}

/// Tag controls (high 3 bits, pre-shift).
pub mod tag_control {
    pub const ANONYMOUS: u8 = 0;
    pub const CONTEXT: u8 = 1;
    pub const COMMON_PROFILE_16: u8 = 2;
    pub const COMMON_PROFILE_32: u8 = 3;
    pub const IMPLICIT_PROFILE_16: u8 = 4;
    pub const IMPLICIT_PROFILE_32: u8 = 5;
    pub const FULLY_QUALIFIED_16: u8 = 6;
    pub const FULLY_QUALIFIED_32: u8 = 7;
}
