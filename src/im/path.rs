//! Attribute and command paths.
//!
//! Wire form is a TLV list with context tags; absent components in an
//! attribute path are wildcards that expand against the data-model tree.

use crate::tlv::{Tag, TlvValue};

// AttributePathIB tags.
const TAG_PATH_ENDPOINT: u8 = 2;
const TAG_PATH_CLUSTER: u8 = 3;
const TAG_PATH_ATTRIBUTE: u8 = 4;

// CommandPathIB tags.
const TAG_CMD_ENDPOINT: u8 = 0;
const TAG_CMD_CLUSTER: u8 = 1;
const TAG_CMD_COMMAND: u8 = 2;

/// A possibly wildcarded attribute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributePath {
    /// Endpoint, or every endpoint.
    pub endpoint: Option<u16>,
    /// Cluster, or every cluster.
    pub cluster: Option<u32>,
    /// Attribute, or every attribute.
    pub attribute: Option<u32>,
}

/// A fully resolved attribute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConcretePath {
    /// Endpoint id.
    pub endpoint: u16,
    /// Cluster id.
    pub cluster: u32,
    /// Attribute id.
    pub attribute: u32,
}

/// A command path (never wildcarded in requests we accept).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPath {
    /// Endpoint id.
    pub endpoint: u16,
    /// Cluster id.
    pub cluster: u32,
    /// Command id.
    pub command: u32,
}

fn list_u64(items: &[(Tag, TlvValue)], wanted: u8) -> Option<u64> {
    items.iter().find_map(|(tag, value)| match tag {
        Tag::Context(t) if *t == wanted => value.as_u64(),
        _ => None,
    })
}

impl AttributePath {
    /// Path matching every attribute on the node.
    pub fn wildcard() -> Self {
        Self { endpoint: None, cluster: None, attribute: None }
    }

    /// Fully concrete path.
    pub fn concrete(endpoint: u16, cluster: u32, attribute: u32) -> Self {
        Self {
            endpoint: Some(endpoint),
            cluster: Some(cluster),
            attribute: Some(attribute),
        }
    }

    /// Whether `path` falls under this (possibly wildcarded) path.
    pub fn matches(&self, path: &ConcretePath) -> bool {
        self.endpoint.is_none_or(|e| e == path.endpoint)
            && self.cluster.is_none_or(|c| c == path.cluster)
            && self.attribute.is_none_or(|a| a == path.attribute)
    }

    /// Encode as an AttributePathIB list.
    pub fn to_tlv(&self) -> TlvValue {
        let mut items = Vec::new();
        if let Some(endpoint) = self.endpoint {
            items.push((
                Tag::Context(TAG_PATH_ENDPOINT),
                TlvValue::Unsigned(u64::from(endpoint)),
            ));
        }
        if let Some(cluster) = self.cluster {
            items.push((
                Tag::Context(TAG_PATH_CLUSTER),
                TlvValue::Unsigned(u64::from(cluster)),
            ));
        }
        if let Some(attribute) = self.attribute {
            items.push((
                Tag::Context(TAG_PATH_ATTRIBUTE),
                TlvValue::Unsigned(u64::from(attribute)),
            ));
        }
        TlvValue::List(items)
    }

    /// Decode from an AttributePathIB list.
    pub fn from_tlv(value: &TlvValue) -> Option<Self> {
        let TlvValue::List(items) = value else {
            return None;
        };
        let endpoint = match list_u64(items, TAG_PATH_ENDPOINT) {
            Some(v) => Some(u16::try_from(v).ok()?),
            None => None,
        };
        let cluster = match list_u64(items, TAG_PATH_CLUSTER) {
            Some(v) => Some(u32::try_from(v).ok()?),
            None => None,
        };
        let attribute = match list_u64(items, TAG_PATH_ATTRIBUTE) {
            Some(v) => Some(u32::try_from(v).ok()?),
            None => None,
        };
        Some(Self { endpoint, cluster, attribute })
    }
}

impl ConcretePath {
    /// Encode as an AttributePathIB list (always concrete).
    pub fn to_tlv(&self) -> TlvValue {
        AttributePath::concrete(self.endpoint, self.cluster, self.attribute).to_tlv()
    }

    /// Decode, requiring all three components.
    pub fn from_tlv(value: &TlvValue) -> Option<Self> {
        let path = AttributePath::from_tlv(value)?;
        Some(Self {
            endpoint: path.endpoint?,
            cluster: path.cluster?,
            attribute: path.attribute?,
        })
    }
}

impl CommandPath {
    /// Build a command path.
    pub fn new(endpoint: u16, cluster: u32, command: u32) -> Self {
        Self { endpoint, cluster, command }
    }

    /// Encode as a CommandPathIB list.
    pub fn to_tlv(&self) -> TlvValue {
        TlvValue::List(vec![
            (
                Tag::Context(TAG_CMD_ENDPOINT),
                TlvValue::Unsigned(u64::from(self.endpoint)),
            ),
            (
                Tag::Context(TAG_CMD_CLUSTER),
                TlvValue::Unsigned(u64::from(self.cluster)),
            ),
            (
                Tag::Context(TAG_CMD_COMMAND),
                TlvValue::Unsigned(u64::from(self.command)),
            ),
        ])
    }

    /// Decode from a CommandPathIB list.
    pub fn from_tlv(value: &TlvValue) -> Option<Self> {
        let TlvValue::List(items) = value else {
            return None;
        };
        Some(Self {
            endpoint: u16::try_from(list_u64(items, TAG_CMD_ENDPOINT)?).ok()?,
            cluster: u32::try_from(list_u64(items, TAG_CMD_CLUSTER)?).ok()?,
            command: u32::try_from(list_u64(items, TAG_CMD_COMMAND)?).ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_path_roundtrip() {
        for path in [
            AttributePath::wildcard(),
            AttributePath::concrete(1, 6, 0),
            AttributePath { endpoint: None, cluster: Some(6), attribute: Some(0) },
            AttributePath { endpoint: Some(2), cluster: None, attribute: None },
        ] {
            assert_eq!(AttributePath::from_tlv(&path.to_tlv()), Some(path));
        }
    }

    #[test]
    fn test_wildcard_matching() {
        let concrete = ConcretePath { endpoint: 1, cluster: 6, attribute: 0 };
        assert!(AttributePath::wildcard().matches(&concrete));
        assert!(AttributePath::concrete(1, 6, 0).matches(&concrete));
        assert!(!AttributePath::concrete(2, 6, 0).matches(&concrete));
        let cluster_only = AttributePath { endpoint: None, cluster: Some(6), attribute: None };
        assert!(cluster_only.matches(&concrete));
    }

    #[test]
    fn test_command_path_roundtrip() {
        let path = CommandPath::new(1, 6, 2);
        assert_eq!(CommandPath::from_tlv(&path.to_tlv()), Some(path));
    }

    #[test]
    fn test_concrete_requires_all_components() {
        let partial = AttributePath { endpoint: Some(1), cluster: None, attribute: Some(0) };
        assert!(ConcretePath::from_tlv(&partial.to_tlv()).is_none());
    }
}
