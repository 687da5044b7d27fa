//! BLE transport: BTP sessions layered over a pluggable GATT driver.
//!
//! The chipset driver is external; it delivers RX characteristic writes into
//! [`BleTransport::on_write`] and sends TX indications through [`BleSender`].

use std::collections::HashMap;

use log::debug;

use crate::btp::BtpSession;
use crate::core::{BtpError, TransportError};

/// Matter BLE service UUID.
pub const SERVICE_UUID: u16 = 0xFFF6;

/// RX characteristic (peer writes commands here).
pub const RX_CHARACTERISTIC_UUID: &str = "18EE2EF5-263D-4559-959F-4F9C429F9D12";

/// TX characteristic (indications to the peer).
pub const TX_CHARACTERISTIC_UUID: &str = "18EE2EF5-263D-4559-959F-4F9C429F9D11";

/// Additional-data characteristic.
pub const ADDITIONAL_DATA_UUID: &str = "64630238-8772-45F2-B87D-748A83218F04";

/// Build the 6-byte commissionable advertising payload:
/// `discriminator_le16 ‖ vendor_id_le16 ‖ product_id_le16`.
pub fn advertising_payload(discriminator: u16, vendor_id: u16, product_id: u16) -> [u8; 6] {
    let mut out = [0u8; 6];
    out[0..2].copy_from_slice(&discriminator.to_le_bytes());
    out[2..4].copy_from_slice(&vendor_id.to_le_bytes());
    out[4..6].copy_from_slice(&product_id.to_le_bytes());
    out
}

/// The interface a BLE chipset driver implements for outbound indications.
pub trait BleSender: Send {
    /// Send one BTP packet as a TX-characteristic indication.
    fn send_indication(&self, conn_id: u64, packet: &[u8]) -> Result<(), TransportError>;
}

/// What a processed RX write produced.
#[derive(Debug, PartialEq, Eq)]
pub enum BleInbound {
    /// Handshake completed; response indication was sent.
    HandshakeComplete,
    /// A fragment was consumed; message still reassembling.
    Partial,
    /// A complete Matter frame.
    Frame(Vec<u8>),
}

/// BTP state for every live BLE connection.
pub struct BleTransport<S: BleSender> {
    driver: S,
    sessions: HashMap<u64, BtpSession>,
}

impl<S: BleSender> BleTransport<S> {
    /// Wrap a driver.
    pub fn new(driver: S) -> Self {
        Self { driver, sessions: HashMap::new() }
    }

    /// Handle an RX-characteristic write from the peer.
    pub fn on_write(&mut self, conn_id: u64, data: &[u8]) -> Result<BleInbound, TransportError> {
        if !self.sessions.contains_key(&conn_id) {
            // first write must be the BTP handshake request
            let (session, response) = BtpSession::accept(data)
                .map_err(|_| TransportError::NotConnected)?;
            self.driver.send_indication(conn_id, &response)?;
            self.sessions.insert(conn_id, session);
            debug!("btp session established on connection {conn_id}");
            return Ok(BleInbound::HandshakeComplete);
        }

        let session = self.sessions.get_mut(&conn_id).ok_or(TransportError::NotConnected)?;
        match session.receive(data) {
            Ok(Some(frame)) => Ok(BleInbound::Frame(frame)),
            Ok(None) => Ok(BleInbound::Partial),
            Err(error) => {
                // reassembly violations drop the connection state
                debug!("btp error on connection {conn_id}: {error}");
                self.sessions.remove(&conn_id);
                Err(TransportError::NotConnected)
            }
        }
    }

    /// Send a Matter frame, fragmenting per the negotiated MTU.
    pub fn send(&mut self, conn_id: u64, frame: &[u8]) -> Result<(), TransportError> {
        let session = self.sessions.get_mut(&conn_id).ok_or(TransportError::NotConnected)?;
        let fragments = session.send(frame).map_err(|_: BtpError| TransportError::NotConnected)?;
        for fragment in fragments {
            self.driver.send_indication(conn_id, &fragment)?;
        }
        Ok(())
    }

    /// Drop state for a disconnected connection.
    pub fn on_disconnect(&mut self, conn_id: u64) {
        self.sessions.remove(&conn_id);
    }

    /// Whether a connection has completed the BTP handshake.
    pub fn is_established(&self, conn_id: u64) -> bool {
        self.sessions.contains_key(&conn_id)
    }
}
