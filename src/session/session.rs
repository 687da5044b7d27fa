//! Per-session state.

use std::net::SocketAddr;
use std::time::Instant;

use crate::core::{SecurityError, ATTESTATION_CHALLENGE_SIZE};
use crate::crypto::SessionKey;

use super::counter::{OutboundCounter, ReplayWindow};

/// How a session was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Passcode-authenticated (commissioning); bypasses ACL with implicit
    /// administer.
    Pase,
    /// Certificate-authenticated (operational).
    Case,
    /// Group-keyed (decoded but not routed).
    Group,
}

/// Transport a session is bound to; closing the transport closes every
/// session bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportBinding {
    /// UDP peer address.
    Udp(SocketAddr),
    /// TCP connection id assigned by the transport layer.
    Tcp(u64),
    /// BLE connection id assigned by the driver.
    Ble(u64),
}

impl TransportBinding {
    /// Whether MRP retransmits apply. TCP and BLE carry their own
    /// reliability, so MRP is suppressed there.
    pub fn needs_mrp(&self) -> bool {
        matches!(self, TransportBinding::Udp(_))
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created by a handshake in flight; not usable for secured traffic.
    Provisional,
    /// Handshake reported success; keys installed.
    Active,
}

/// Key material and identity installed when a handshake completes.
#[derive(Debug)]
pub struct SessionSecrets {
    /// Key for locally originated traffic.
    pub encrypt_key: SessionKey,
    /// Key for peer-originated traffic.
    pub decrypt_key: SessionKey,
    /// Attestation challenge (third slice of the derived key block).
    pub attestation_challenge: [u8; ATTESTATION_CHALLENGE_SIZE],
    /// Peer's session id (destination session id on outbound frames).
    pub peer_session_id: u16,
    /// Peer node id; 0 for PASE.
    pub peer_node_id: u64,
    /// Fabric index; 0 for PASE.
    pub fabric_index: u8,
    /// Authentication mode.
    pub auth_mode: AuthMode,
}

/// A secure session.
#[derive(Debug)]
pub struct Session {
    local_session_id: u16,
    state: SessionState,
    peer_session_id: u16,
    encrypt_key: Option<SessionKey>,
    decrypt_key: Option<SessionKey>,
    attestation_challenge: [u8; ATTESTATION_CHALLENGE_SIZE],
    local_node_id: u64,
    peer_node_id: u64,
    fabric_index: u8,
    auth_mode: AuthMode,
    outbound: OutboundCounter,
    replay: ReplayWindow,
    transport: TransportBinding,
    created_at: Instant,
}

impl Session {
    /// Create a provisional session awaiting handshake completion.
    pub fn provisional(
        local_session_id: u16,
        local_node_id: u64,
        transport: TransportBinding,
    ) -> Self {
        Self {
            local_session_id,
            state: SessionState::Provisional,
            peer_session_id: 0,
            encrypt_key: None,
            decrypt_key: None,
            attestation_challenge: [0; ATTESTATION_CHALLENGE_SIZE],
            local_node_id,
            peer_node_id: 0,
            fabric_index: 0,
            auth_mode: AuthMode::Pase,
            outbound: OutboundCounter::new(),
            replay: ReplayWindow::new(),
            transport,
            created_at: Instant::now(),
        }
    }

    /// Install keys and identities; the session becomes usable.
    pub fn commit(&mut self, secrets: SessionSecrets) {
        self.encrypt_key = Some(secrets.encrypt_key);
        self.decrypt_key = Some(secrets.decrypt_key);
        self.attestation_challenge = secrets.attestation_challenge;
        self.peer_session_id = secrets.peer_session_id;
        self.peer_node_id = secrets.peer_node_id;
        self.fabric_index = secrets.fabric_index;
        self.auth_mode = secrets.auth_mode;
        self.state = SessionState::Active;
    }

    /// Local session id.
    pub fn local_session_id(&self) -> u16 {
        self.local_session_id
    }

    /// Peer session id (0 until committed).
    pub fn peer_session_id(&self) -> u16 {
        self.peer_session_id
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the handshake reported success.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Encrypt key for outbound traffic.
    pub fn encrypt_key(&self) -> Result<&SessionKey, SecurityError> {
        self.encrypt_key.as_ref().ok_or(SecurityError::SessionMismatch)
    }

    /// Decrypt key for inbound traffic.
    pub fn decrypt_key(&self) -> Result<&SessionKey, SecurityError> {
        self.decrypt_key.as_ref().ok_or(SecurityError::SessionMismatch)
    }

    /// Attestation challenge of the committed session.
    pub fn attestation_challenge(&self) -> &[u8; ATTESTATION_CHALLENGE_SIZE] {
        &self.attestation_challenge
    }

    /// Local node id.
    pub fn local_node_id(&self) -> u64 {
        self.local_node_id
    }

    /// Peer node id (0 until learned).
    pub fn peer_node_id(&self) -> u64 {
        self.peer_node_id
    }

    /// Fabric index (0 for PASE).
    pub fn fabric_index(&self) -> u8 {
        self.fabric_index
    }

    /// Authentication mode.
    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Bound transport descriptor.
    pub fn transport(&self) -> TransportBinding {
        self.transport
    }

    /// Update the bound transport (UDP peers may roam).
    pub fn rebind_transport(&mut self, transport: TransportBinding) {
        self.transport = transport;
    }

    /// Allocate the next outbound message counter.
    pub fn next_outbound_counter(&mut self) -> u32 {
        self.outbound.next()
    }

    /// Run the replay-window check for an inbound counter.
    pub fn inbound_counter_check(&mut self, counter: u32) -> Result<(), SecurityError> {
        self.replay.check_and_update(counter)
    }

    /// Session age.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
