//! Fabric credentials.
//!
//! A fabric is a root CA, a 64-bit fabric id, and this node's operational
//! identity inside it: NOC, optional ICAC, operational private key, and the
//! fabric-wide IPK. Fabrics are added during commissioning and indexed 1..N.
//! Persistence is external; this table is the in-memory working set.

use crate::core::{HandshakeError, IPK_SIZE, P256_PUBLIC_KEY_SIZE};
use crate::crypto::{hmac_sha256, Keypair};

/// Credentials for one fabric.
pub struct Fabric {
    /// Fabric index (1-based).
    pub index: u8,
    /// 64-bit fabric id.
    pub fabric_id: u64,
    /// This node's operational node id on the fabric.
    pub node_id: u64,
    /// Root CA public key (SEC1 uncompressed).
    pub root_public_key: [u8; P256_PUBLIC_KEY_SIZE],
    /// Identity protection key.
    pub ipk: [u8; IPK_SIZE],
    /// Node Operational Certificate, DER.
    pub noc: Vec<u8>,
    /// Intermediate CA certificate, DER, when the chain has one.
    pub icac: Option<Vec<u8>>,
    operational_key: Keypair,
}

impl Fabric {
    /// Assemble fabric credentials.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u8,
        fabric_id: u64,
        node_id: u64,
        root_public_key: [u8; P256_PUBLIC_KEY_SIZE],
        ipk: [u8; IPK_SIZE],
        noc: Vec<u8>,
        icac: Option<Vec<u8>>,
        operational_key: Keypair,
    ) -> Self {
        Self { index, fabric_id, node_id, root_public_key, ipk, noc, icac, operational_key }
    }

    /// Operational signing key.
    pub fn operational_key(&self) -> &Keypair {
        &self.operational_key
    }

    /// CASE destination id for this fabric:
    /// `HMAC-SHA256(IPK, random ‖ root_public_key ‖ fabric_id_le ‖ node_id_le)`.
    pub fn destination_id(&self, initiator_random: &[u8]) -> [u8; 32] {
        self.destination_id_for_node(initiator_random, self.node_id)
    }

    /// Destination id for an arbitrary peer node on this fabric (initiator
    /// side targets the responder's node id).
    pub fn destination_id_for_node(&self, initiator_random: &[u8], node_id: u64) -> [u8; 32] {
        let mut message =
            Vec::with_capacity(initiator_random.len() + P256_PUBLIC_KEY_SIZE + 16);
        message.extend_from_slice(initiator_random);
        message.extend_from_slice(&self.root_public_key);
        message.extend_from_slice(&self.fabric_id.to_le_bytes());
        message.extend_from_slice(&node_id.to_le_bytes());
        hmac_sha256(&self.ipk, &message)
    }
}

impl std::fmt::Debug for Fabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fabric")
            .field("index", &self.index)
            .field("fabric_id", &self.fabric_id)
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

/// Table of commissioned fabrics.
#[derive(Debug, Default)]
pub struct FabricTable {
    fabrics: Vec<Fabric>,
}

impl FabricTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fabric, assigning the next index.
    pub fn add(
        &mut self,
        fabric_id: u64,
        node_id: u64,
        root_public_key: [u8; P256_PUBLIC_KEY_SIZE],
        ipk: [u8; IPK_SIZE],
        noc: Vec<u8>,
        icac: Option<Vec<u8>>,
        operational_key: Keypair,
    ) -> u8 {
        let index = self.fabrics.len() as u8 + 1;
        self.fabrics.push(Fabric::new(
            index, fabric_id, node_id, root_public_key, ipk, noc, icac, operational_key,
        ));
        index
    }

    /// Look up by fabric index.
    pub fn by_index(&self, index: u8) -> Option<&Fabric> {
        self.fabrics.iter().find(|f| f.index == index)
    }

    /// Find the fabric a Sigma1 destination id addresses.
    pub fn by_destination_id(
        &self,
        initiator_random: &[u8],
        destination_id: &[u8],
    ) -> Result<&Fabric, HandshakeError> {
        self.fabrics
            .iter()
            .find(|f| f.destination_id(initiator_random) == destination_id)
            .ok_or(HandshakeError::SessionEstablishmentFailed)
    }

    /// All fabrics.
    pub fn iter(&self) -> impl Iterator<Item = &Fabric> {
        self.fabrics.iter()
    }

    /// Number of fabrics.
    pub fn len(&self) -> usize {
        self.fabrics.len()
    }

    /// Whether no fabric is commissioned yet.
    pub fn is_empty(&self) -> bool {
        self.fabrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fabric(fabric_id: u64, node_id: u64, ipk: [u8; IPK_SIZE]) -> Fabric {
        let key = Keypair::generate();
        let root = Keypair::generate();
        Fabric::new(1, fabric_id, node_id, root.public_key_sec1(), ipk, vec![], None, key)
    }

    #[test]
    fn test_destination_id_is_deterministic() {
        let fabric = test_fabric(0x2906, 0x0055, [9; IPK_SIZE]);
        let random = [0x42; 32];
        assert_eq!(fabric.destination_id(&random), fabric.destination_id(&random));
        assert_ne!(fabric.destination_id(&random), fabric.destination_id(&[0x43; 32]));
    }

    #[test]
    fn test_lookup_by_destination_id() {
        let mut table = FabricTable::new();
        let a = test_fabric(1, 10, [1; IPK_SIZE]);
        let b = test_fabric(2, 20, [2; IPK_SIZE]);
        let random = [7; 32];
        let dest_b = b.destination_id(&random);
        table.fabrics.push(a);
        table.fabrics.push(b);

        let found = table.by_destination_id(&random, &dest_b).unwrap();
        assert_eq!(found.fabric_id, 2);
        assert!(table.by_destination_id(&random, &[0; 32]).is_err());
    }

    #[test]
    fn test_add_assigns_indices() {
        let mut table = FabricTable::new();
        let key = Keypair::generate();
        let root = Keypair::generate().public_key_sec1();
        let first = table.add(1, 1, root, [0; IPK_SIZE], vec![], None, key.clone());
        let second = table.add(2, 2, root, [0; IPK_SIZE], vec![], None, key);
        assert_eq!((first, second), (1, 2));
        assert_eq!(table.by_index(2).unwrap().fabric_id, 2);
    }
}
