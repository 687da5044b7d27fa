//! Cluster-facing interface.
//!
//! Cluster implementations live outside the core and plug in behind
//! [`ClusterHandler`]; callbacks run synchronously on the node actor and must
//! not block. The data-model tree declares which endpoints host which
//! clusters so wildcard paths can expand.

use std::collections::BTreeMap;

use crate::acl::AccessContext;
use crate::im::path::{CommandPath, ConcretePath};
use crate::im::status::ImStatus;
use crate::tlv::TlvValue;

/// Expected TLV shape of an attribute, used to validate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Unsigned integer.
    Unsigned,
    /// Signed integer.
    Signed,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Octet string.
    Bytes,
    /// Struct.
    Struct,
    /// Array.
    Array,
    /// Anything; no validation.
    Any,
}

impl ValueKind {
    /// Whether `value` has this shape.
    pub fn accepts(self, value: &TlvValue) -> bool {
        match self {
            ValueKind::Unsigned => matches!(value, TlvValue::Unsigned(_)),
            ValueKind::Signed => matches!(value, TlvValue::Signed(_)),
            ValueKind::Bool => matches!(value, TlvValue::Bool(_)),
            ValueKind::Utf8 => matches!(value, TlvValue::Utf8(_)),
            ValueKind::Bytes => matches!(value, TlvValue::Bytes(_)),
            ValueKind::Struct => matches!(value, TlvValue::Struct(_)),
            ValueKind::Array => matches!(value, TlvValue::Array(_)),
            ValueKind::Any => true,
        }
    }
}

/// Declared metadata for one attribute.
#[derive(Debug, Clone, Copy)]
pub struct AttributeMetadata {
    /// Attribute id.
    pub id: u32,
    /// Declared TLV shape.
    pub kind: ValueKind,
    /// Whether writes are accepted.
    pub writable: bool,
    /// Whether values are lists of fabric-scoped entries (filtered on read,
    /// merged on write).
    pub fabric_scoped: bool,
    /// Whether a write must be preceded by a TimedRequest.
    pub timed_write: bool,
}

impl AttributeMetadata {
    /// Read-only attribute of the given shape.
    pub fn read_only(id: u32, kind: ValueKind) -> Self {
        Self { id, kind, writable: false, fabric_scoped: false, timed_write: false }
    }

    /// Writable attribute of the given shape.
    pub fn writable(id: u32, kind: ValueKind) -> Self {
        Self { id, kind, writable: true, fabric_scoped: false, timed_write: false }
    }

    /// Mark as a fabric-scoped list.
    pub fn fabric_scoped(mut self) -> Self {
        self.fabric_scoped = true;
        self
    }
}

/// A command handler's reply: either a typed response command or a status.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeReply {
    /// Respond with a command (path + fields).
    Command {
        /// Response command path.
        path: CommandPath,
        /// Response fields.
        fields: TlvValue,
    },
    /// Respond with a status code for the request path.
    Status(ImStatus),
}

/// The interface a hosted cluster implements.
pub trait ClusterHandler: Send {
    /// Cluster id.
    fn cluster_id(&self) -> u32;

    /// Declared attributes (drives wildcard expansion and write checks).
    fn attributes(&self) -> Vec<AttributeMetadata>;

    /// Read an attribute value.
    fn read(&self, attribute: u32, ctx: &AccessContext) -> Result<TlvValue, ImStatus>;

    /// Apply a validated write.
    fn write(&mut self, attribute: u32, value: &TlvValue, ctx: &AccessContext)
        -> Result<(), ImStatus>;

    /// Invoke a command.
    fn invoke(
        &mut self,
        command: u32,
        fields: &TlvValue,
        ctx: &AccessContext,
    ) -> Result<InvokeReply, ImStatus> {
        let _ = (command, fields, ctx);
        Err(ImStatus::UnsupportedCommand)
    }
}

/// The declared endpoint/cluster tree plus the handlers behind it.
#[derive(Default)]
pub struct DataModel {
    endpoints: BTreeMap<u16, BTreeMap<u32, Box<dyn ClusterHandler>>>,
}

impl DataModel {
    /// Empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cluster handler on an endpoint.
    pub fn add_cluster(&mut self, endpoint: u16, handler: Box<dyn ClusterHandler>) {
        self.endpoints
            .entry(endpoint)
            .or_default()
            .insert(handler.cluster_id(), handler);
    }

    /// Whether an endpoint exists.
    pub fn has_endpoint(&self, endpoint: u16) -> bool {
        self.endpoints.contains_key(&endpoint)
    }

    /// Whether a cluster exists on an endpoint.
    pub fn has_cluster(&self, endpoint: u16, cluster: u32) -> bool {
        self.endpoints
            .get(&endpoint)
            .is_some_and(|clusters| clusters.contains_key(&cluster))
    }

    /// Borrow a cluster handler.
    pub fn cluster(&self, endpoint: u16, cluster: u32) -> Option<&dyn ClusterHandler> {
        self.endpoints.get(&endpoint)?.get(&cluster).map(AsRef::as_ref)
    }

    /// Borrow a cluster handler mutably.
    pub fn cluster_mut(
        &mut self,
        endpoint: u16,
        cluster: u32,
    ) -> Option<&mut Box<dyn ClusterHandler>> {
        self.endpoints.get_mut(&endpoint)?.get_mut(&cluster)
    }

    /// Find a cluster anywhere in the tree (first endpoint hosting it).
    pub fn find_cluster(&self, cluster: u32) -> Option<&dyn ClusterHandler> {
        self.endpoints
            .values()
            .find_map(|clusters| clusters.get(&cluster))
            .map(AsRef::as_ref)
    }

    /// Metadata for one attribute.
    pub fn attribute_metadata(&self, path: &ConcretePath) -> Option<AttributeMetadata> {
        self.cluster(path.endpoint, path.cluster)?
            .attributes()
            .into_iter()
            .find(|meta| meta.id == path.attribute)
    }

    /// Expand a wildcard path into the matching concrete paths, in
    /// endpoint/cluster/attribute order.
    pub fn expand(&self, path: &crate::im::path::AttributePath) -> Vec<ConcretePath> {
        let mut out = Vec::new();
        for (&endpoint, clusters) in &self.endpoints {
            if path.endpoint.is_some_and(|e| e != endpoint) {
                continue;
            }
            for (&cluster, handler) in clusters {
                if path.cluster.is_some_and(|c| c != cluster) {
                    continue;
                }
                for meta in handler.attributes() {
                    if path.attribute.is_some_and(|a| a != meta.id) {
                        continue;
                    }
                    out.push(ConcretePath { endpoint, cluster, attribute: meta.id });
                }
            }
        }
        out
    }
}
