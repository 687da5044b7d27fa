//! Access Control cluster (0x001F).
//!
//! Hosts the ACL entry list as attribute 0, a fabric-scoped list: CASE
//! readers see only their fabric's entries and CASE writes merge against the
//! other fabrics' entries (the router implements both rules from the
//! attribute metadata). The node consults the same list for every dispatch.

use crate::core::ACCESS_CONTROL_CLUSTER;
use crate::im::cluster::{AttributeMetadata, ClusterHandler, ValueKind};
use crate::im::ImStatus;
use crate::tlv::TlvValue;

use super::{AccessContext, AclEntry};

/// Attribute id of the ACL entry list.
pub const ATTR_ACL: u32 = 0;

/// The Access Control cluster.
#[derive(Debug, Default)]
pub struct AccessControlCluster {
    entries: Vec<AclEntry>,
}

impl AccessControlCluster {
    /// Empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster seeded with entries (tests, restored state).
    pub fn with_entries(entries: Vec<AclEntry>) -> Self {
        Self { entries }
    }

    /// Current entry list.
    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    /// Append an entry directly (commissioning path).
    pub fn add_entry(&mut self, entry: AclEntry) {
        self.entries.push(entry);
    }
}

impl ClusterHandler for AccessControlCluster {
    fn cluster_id(&self) -> u32 {
        ACCESS_CONTROL_CLUSTER
    }

    fn attributes(&self) -> Vec<AttributeMetadata> {
        vec![AttributeMetadata::writable(ATTR_ACL, ValueKind::Array).fabric_scoped()]
    }

    fn read(&self, attribute: u32, _ctx: &AccessContext) -> Result<TlvValue, ImStatus> {
        match attribute {
            ATTR_ACL => Ok(TlvValue::Array(
                self.entries.iter().map(AclEntry::to_tlv).collect(),
            )),
            _ => Err(ImStatus::UnsupportedAttribute),
        }
    }

    fn write(
        &mut self,
        attribute: u32,
        value: &TlvValue,
        _ctx: &AccessContext,
    ) -> Result<(), ImStatus> {
        if attribute != ATTR_ACL {
            return Err(ImStatus::UnsupportedWrite);
        }
        let TlvValue::Array(items) = value else {
            return Err(ImStatus::ConstraintError);
        };
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            entries.push(AclEntry::from_tlv(item).ok_or(ImStatus::ConstraintError)?);
        }
        self.entries = entries;
        Ok(())
    }
}
