//! Secure Channel protocol: PASE and CASE handshake state machines.
//!
//! Both handshakes run over unsecured (session id 0) exchanges and finish by
//! committing a provisional session with the derived I2R/R2I keys and the
//! attestation challenge. Every failure path emits an indistinguishable
//! failure StatusReport.

mod case;
mod pase;

pub use case::{CaseInitiator, CaseResponder};
pub use pase::{PaseInitiator, PaseResponder};
