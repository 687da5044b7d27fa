//! Core constants and error types shared by every subsystem.

mod constants;
mod error;

pub use constants::*;
pub use error::{BtpError, CodecError, HandshakeError, MatterError, SecurityError, TransportError};
