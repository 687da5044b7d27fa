//! Matter TLV codec.
//!
//! Every Matter payload is a tagged, length-prefixed tree value. The codec
//! guarantees `encode(decode(x)) == x` for any wire TLV that used
//! minimal-width integers, which is what signed payloads rely on for stable
//! hashes.
//!
//! The value model is a sum type with one variant per wire type; the encoder
//! dispatches on the variant. Signed and unsigned integers stay distinct
//! because signedness affects minimum-width selection.

mod reader;
mod value;
mod wire;
mod writer;

pub use reader::decode;
pub use value::{Tag, TlvValue};
pub use writer::encode;
