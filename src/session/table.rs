//! Session table.

use std::collections::HashMap;

use rand::Rng;

use crate::core::{MatterError, SecurityError, MAX_SESSION_ID};

use super::session::{Session, SessionSecrets, TransportBinding};

/// Default cap on concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Table of secure sessions, keyed by local session id.
#[derive(Debug)]
pub struct SessionTable {
    sessions: HashMap<u16, Session>,
    local_node_id: u64,
    max_sessions: usize,
}

impl SessionTable {
    /// New table for a node.
    pub fn new(local_node_id: u64) -> Self {
        Self {
            sessions: HashMap::new(),
            local_node_id,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    /// Override the session cap.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Update the node id stamped on future sessions (learned during
    /// commissioning).
    pub fn set_local_node_id(&mut self, node_id: u64) {
        self.local_node_id = node_id;
    }

    /// Allocate an unused local session id in `1..=65534`.
    ///
    /// The table is consulted and collisions redrawn, so an id is never
    /// handed out twice while live.
    pub fn allocate_session_id(&self) -> Result<u16, MatterError> {
        if self.sessions.len() >= self.max_sessions {
            return Err(MatterError::ResourceExhausted("session table full"));
        }
        let mut rng = rand::thread_rng();
        loop {
            let candidate = rng.gen_range(1..=MAX_SESSION_ID);
            if !self.sessions.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Create a provisional session under a fresh local id.
    pub fn create_provisional(
        &mut self,
        transport: TransportBinding,
    ) -> Result<u16, MatterError> {
        let local_id = self.allocate_session_id()?;
        self.sessions.insert(
            local_id,
            Session::provisional(local_id, self.local_node_id, transport),
        );
        Ok(local_id)
    }

    /// Commit a provisional session with handshake-derived secrets.
    pub fn commit(&mut self, local_id: u16, secrets: SessionSecrets) -> Result<(), SecurityError> {
        let session = self
            .sessions
            .get_mut(&local_id)
            .ok_or(SecurityError::SessionMismatch)?;
        session.commit(secrets);
        Ok(())
    }

    /// Look up a session.
    pub fn lookup(&self, local_id: u16) -> Option<&Session> {
        self.sessions.get(&local_id)
    }

    /// Look up a session mutably.
    pub fn lookup_mut(&mut self, local_id: u16) -> Option<&mut Session> {
        self.sessions.get_mut(&local_id)
    }

    /// Look up an *active* session or fail with `SessionMismatch`.
    pub fn lookup_active(&mut self, local_id: u16) -> Result<&mut Session, SecurityError> {
        match self.sessions.get_mut(&local_id) {
            Some(session) if session.is_active() => Ok(session),
            _ => Err(SecurityError::SessionMismatch),
        }
    }

    /// Close and remove a session.
    pub fn close(&mut self, local_id: u16) -> Option<Session> {
        self.sessions.remove(&local_id)
    }

    /// Close every session bound to a transport; returns the closed ids.
    pub fn close_transport(&mut self, transport: TransportBinding) -> Vec<u16> {
        let ids: Vec<u16> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.transport() == transport)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.sessions.remove(id);
        }
        ids
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SESSION_KEY_SIZE;
    use crate::crypto::SessionKey;
    use crate::session::AuthMode;

    fn test_binding() -> TransportBinding {
        TransportBinding::Udp("127.0.0.1:5540".parse().unwrap())
    }

    fn test_secrets() -> SessionSecrets {
        SessionSecrets {
            encrypt_key: SessionKey::from_bytes([1; SESSION_KEY_SIZE]),
            decrypt_key: SessionKey::from_bytes([2; SESSION_KEY_SIZE]),
            attestation_challenge: [3; 16],
            peer_session_id: 77,
            peer_node_id: 0,
            fabric_index: 0,
            auth_mode: AuthMode::Pase,
        }
    }

    #[test]
    fn test_provisional_is_not_usable() {
        let mut table = SessionTable::new(1);
        let id = table.create_provisional(test_binding()).unwrap();
        assert!(table.lookup(id).is_some());
        assert_eq!(
            table.lookup_active(id).unwrap_err(),
            SecurityError::SessionMismatch
        );
    }

    #[test]
    fn test_commit_activates() {
        let mut table = SessionTable::new(1);
        let id = table.create_provisional(test_binding()).unwrap();
        table.commit(id, test_secrets()).unwrap();
        let session = table.lookup_active(id).unwrap();
        assert_eq!(session.peer_session_id(), 77);
        assert!(session.is_active());
    }

    #[test]
    fn test_allocated_ids_are_unique_and_in_range() {
        let mut table = SessionTable::new(1);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..32 {
            let id = table.create_provisional(test_binding()).unwrap();
            assert!((1..=MAX_SESSION_ID).contains(&id));
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn test_session_cap() {
        let mut table = SessionTable::new(1).with_max_sessions(2);
        table.create_provisional(test_binding()).unwrap();
        table.create_provisional(test_binding()).unwrap();
        assert!(matches!(
            table.create_provisional(test_binding()),
            Err(MatterError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_close_transport_tears_down_bound_sessions() {
        let mut table = SessionTable::new(1);
        let udp = table.create_provisional(test_binding()).unwrap();
        let tcp_a = table.create_provisional(TransportBinding::Tcp(1)).unwrap();
        let tcp_b = table.create_provisional(TransportBinding::Tcp(1)).unwrap();
        let tcp_other = table.create_provisional(TransportBinding::Tcp(2)).unwrap();

        let mut closed = table.close_transport(TransportBinding::Tcp(1));
        closed.sort_unstable();
        let mut expected = vec![tcp_a, tcp_b];
        expected.sort_unstable();
        assert_eq!(closed, expected);
        assert!(table.lookup(udp).is_some());
        assert!(table.lookup(tcp_other).is_some());
        assert!(table.lookup(tcp_a).is_none());
    }

    #[test]
    fn test_replay_checks_flow_through() {
        let mut table = SessionTable::new(1);
        let id = table.create_provisional(test_binding()).unwrap();
        table.commit(id, test_secrets()).unwrap();
        let session = table.lookup_mut(id).unwrap();
        session.inbound_counter_check(10).unwrap();
        assert_eq!(
            session.inbound_counter_check(10),
            Err(SecurityError::Duplicate)
        );
    }
}
