//! Transport glue: UDP datagrams, length-framed TCP streams, and BTP over a
//! pluggable BLE driver.
//!
//! Each transport runs a producer task that decodes raw bytes into
//! [`TransportEvent`]s on the node actor's channel; the actor owns all
//! protocol state and serializes outbound frames back through the transport
//! handles.

pub mod ble;
pub mod tcp;
pub mod udp;

pub use ble::{BleSender, BleTransport};
pub use tcp::{extract_frames, frame_message, TcpTransport};
pub use udp::UdpTransport;

use crate::session::TransportBinding;

/// DNS-SD service names (advertisement itself is hosted outside the core).
pub mod dnssd {
    /// Commissioning service, advertised before commissioning.
    pub const COMMISSIONING_SERVICE: &str = "_matterc._udp.local";
    /// Operational service, advertised after commissioning.
    pub const OPERATIONAL_SERVICE: &str = "_matter._tcp.local";
}

/// An event produced by a transport driver.
#[derive(Debug)]
pub enum TransportEvent {
    /// A complete Matter frame arrived.
    Frame {
        /// Where it came from (also the reply binding).
        binding: TransportBinding,
        /// Raw frame bytes.
        data: Vec<u8>,
    },
    /// A connection-oriented transport closed; every session bound to it
    /// must be torn down.
    Closed {
        /// The closed binding.
        binding: TransportBinding,
    },
}
