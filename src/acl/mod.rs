//! Access-control engine.
//!
//! A pure `check` over the entry list; the Access Control cluster that
//! exposes the list over IM lives in [`cluster`]. PASE sessions bypass ACL
//! entirely with implicit administer (a commissioner must be able to
//! configure a blank device).

pub mod cluster;

use crate::session::AuthMode;
use crate::tlv::TlvValue;

/// Privilege lattice, low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Privilege {
    /// Read attributes and subscribe.
    View = 1,
    /// View through a proxy.
    ProxyView = 2,
    /// Write attributes and invoke commands.
    Operate = 3,
    /// Manage cluster configuration.
    Manage = 4,
    /// Full administration, required for ACL writes.
    Administer = 5,
}

impl Privilege {
    /// Parse a wire value.
    pub fn from_value(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::View),
            2 => Some(Self::ProxyView),
            3 => Some(Self::Operate),
            4 => Some(Self::Manage),
            5 => Some(Self::Administer),
            _ => None,
        }
    }
}

/// Auth mode an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AclAuthMode {
    /// PASE commissioning sessions (never matched; PASE bypasses ACL).
    Pase = 1,
    /// CASE operational sessions.
    Case = 2,
    /// Group-keyed messages.
    Group = 3,
}

impl AclAuthMode {
    /// Parse a wire value.
    pub fn from_value(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Pase),
            2 => Some(Self::Case),
            3 => Some(Self::Group),
            _ => None,
        }
    }
}

/// Endpoint/cluster target; `None` components are wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclTarget {
    /// Cluster id, or any.
    pub cluster: Option<u32>,
    /// Endpoint id, or any.
    pub endpoint: Option<u16>,
}

/// One access-control entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AclEntry {
    /// Granted privilege.
    pub privilege: Privilege,
    /// Auth mode the entry matches.
    pub auth_mode: AclAuthMode,
    /// Subject node ids; `None` matches any subject.
    pub subjects: Option<Vec<u64>>,
    /// Targets; `None` matches any endpoint/cluster.
    pub targets: Option<Vec<AclTarget>>,
    /// Owning fabric.
    pub fabric_index: u8,
}

/// Who is asking: derived from the session at dispatch time.
#[derive(Debug, Clone, Copy)]
pub struct AccessContext {
    /// Session auth mode.
    pub auth_mode: AuthMode,
    /// Peer node id (subject).
    pub subject: u64,
    /// Accessing fabric index (0 for PASE).
    pub fabric_index: u8,
}

impl AccessContext {
    /// Context for a PASE commissioning session.
    pub fn pase() -> Self {
        Self { auth_mode: AuthMode::Pase, subject: 0, fabric_index: 0 }
    }

    /// Context for a CASE session.
    pub fn case(subject: u64, fabric_index: u8) -> Self {
        Self { auth_mode: AuthMode::Case, subject, fabric_index }
    }
}

/// Evaluate the ACL for one resolved path.
///
/// Allows iff some entry matches fabric, auth mode, subject, and target, and
/// grants at least `required`. PASE always allows.
pub fn check(
    context: &AccessContext,
    entries: &[AclEntry],
    required: Privilege,
    target: (u16, u32),
) -> bool {
    if context.auth_mode == AuthMode::Pase {
        return true;
    }
    let wanted_mode = match context.auth_mode {
        AuthMode::Case => AclAuthMode::Case,
        AuthMode::Group => AclAuthMode::Group,
        AuthMode::Pase => return true,
    };
    let (endpoint, cluster) = target;

    entries.iter().any(|entry| {
        entry.fabric_index == context.fabric_index
            && entry.auth_mode == wanted_mode
            && entry.privilege >= required
            && entry
                .subjects
                .as_ref()
                .is_none_or(|subjects| subjects.contains(&context.subject))
            && entry.targets.as_ref().is_none_or(|targets| {
                targets.iter().any(|t| {
                    t.endpoint.is_none_or(|e| e == endpoint)
                        && t.cluster.is_none_or(|c| c == cluster)
                })
            })
    })
}

// TLV tags of AccessControlEntryStruct.
const TAG_PRIVILEGE: u8 = 1;
const TAG_AUTH_MODE: u8 = 2;
const TAG_SUBJECTS: u8 = 3;
const TAG_TARGETS: u8 = 4;
const TAG_TARGET_CLUSTER: u8 = 0;
const TAG_TARGET_ENDPOINT: u8 = 1;
/// Fabric index tag shared by every fabric-scoped struct.
pub const TAG_FABRIC_INDEX: u8 = 254;

impl AclEntry {
    /// Normalize a wire TLV struct into an entry.
    pub fn from_tlv(value: &TlvValue) -> Option<Self> {
        let privilege = Privilege::from_value(value.field(TAG_PRIVILEGE)?.as_u64()?)?;
        let auth_mode = AclAuthMode::from_value(value.field(TAG_AUTH_MODE)?.as_u64()?)?;

        let subjects = match value.field(TAG_SUBJECTS) {
            None | Some(TlvValue::Null) => None,
            Some(TlvValue::Array(items)) => {
                let mut subjects = Vec::with_capacity(items.len());
                for item in items {
                    subjects.push(item.as_u64()?);
                }
                Some(subjects)
            }
            Some(_) => return None,
        };

        let targets = match value.field(TAG_TARGETS) {
            None | Some(TlvValue::Null) => None,
            Some(TlvValue::Array(items)) => {
                let mut targets = Vec::with_capacity(items.len());
                for item in items {
                    let cluster = match item.field(TAG_TARGET_CLUSTER) {
                        None | Some(TlvValue::Null) => None,
                        Some(v) => Some(u32::try_from(v.as_u64()?).ok()?),
                    };
                    let endpoint = match item.field(TAG_TARGET_ENDPOINT) {
                        None | Some(TlvValue::Null) => None,
                        Some(v) => Some(u16::try_from(v.as_u64()?).ok()?),
                    };
                    targets.push(AclTarget { cluster, endpoint });
                }
                Some(targets)
            }
            Some(_) => return None,
        };

        let fabric_index = value
            .field(TAG_FABRIC_INDEX)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u8::try_from(v).ok())
            .unwrap_or(0);

        Some(Self { privilege, auth_mode, subjects, targets, fabric_index })
    }

    /// Encode as the wire TLV struct.
    pub fn to_tlv(&self) -> TlvValue {
        let mut fields = vec![
            (TAG_PRIVILEGE, TlvValue::Unsigned(self.privilege as u64)),
            (TAG_AUTH_MODE, TlvValue::Unsigned(self.auth_mode as u64)),
        ];
        fields.push((
            TAG_SUBJECTS,
            match &self.subjects {
                None => TlvValue::Null,
                Some(subjects) => TlvValue::Array(
                    subjects.iter().map(|s| TlvValue::Unsigned(*s)).collect(),
                ),
            },
        ));
        fields.push((
            TAG_TARGETS,
            match &self.targets {
                None => TlvValue::Null,
                Some(targets) => TlvValue::Array(
                    targets
                        .iter()
                        .map(|t| {
                            TlvValue::Struct(vec![
                                (
                                    TAG_TARGET_CLUSTER,
                                    t.cluster.map_or(TlvValue::Null, |c| {
                                        TlvValue::Unsigned(u64::from(c))
                                    }),
                                ),
                                (
                                    TAG_TARGET_ENDPOINT,
                                    t.endpoint.map_or(TlvValue::Null, |e| {
                                        TlvValue::Unsigned(u64::from(e))
                                    }),
                                ),
                            ])
                        })
                        .collect(),
                ),
            },
        ));
        fields.push((TAG_FABRIC_INDEX, TlvValue::Unsigned(u64::from(self.fabric_index))));
        TlvValue::Struct(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin_entry(fabric: u8) -> AclEntry {
        AclEntry {
            privilege: Privilege::Administer,
            auth_mode: AclAuthMode::Case,
            subjects: Some(vec![100]),
            targets: None,
            fabric_index: fabric,
        }
    }

    #[test]
    fn test_pase_always_allows() {
        let context = AccessContext::pase();
        assert!(check(&context, &[], Privilege::Administer, (0, 0x001F)));
    }

    #[test]
    fn test_privilege_ordering() {
        assert!(Privilege::View < Privilege::ProxyView);
        assert!(Privilege::ProxyView < Privilege::Operate);
        assert!(Privilege::Operate < Privilege::Manage);
        assert!(Privilege::Manage < Privilege::Administer);
    }

    #[test]
    fn test_subject_must_match() {
        let entries = [admin_entry(1)];
        assert!(check(&AccessContext::case(100, 1), &entries, Privilege::View, (0, 6)));
        assert!(!check(&AccessContext::case(101, 1), &entries, Privilege::View, (0, 6)));
    }

    #[test]
    fn test_fabric_must_match() {
        let entries = [admin_entry(1)];
        assert!(!check(&AccessContext::case(100, 2), &entries, Privilege::View, (0, 6)));
    }

    #[test]
    fn test_null_subjects_match_any() {
        let mut entry = admin_entry(1);
        entry.subjects = None;
        assert!(check(&AccessContext::case(9999, 1), &[entry], Privilege::View, (0, 6)));
    }

    #[test]
    fn test_insufficient_privilege_denied() {
        let mut entry = admin_entry(1);
        entry.privilege = Privilege::Operate;
        let entries = [entry];
        assert!(check(&AccessContext::case(100, 1), &entries, Privilege::Operate, (0, 6)));
        assert!(!check(
            &AccessContext::case(100, 1),
            &entries,
            Privilege::Administer,
            (0, 0x001F)
        ));
    }

    #[test]
    fn test_target_wildcards() {
        let mut entry = admin_entry(1);
        entry.targets = Some(vec![AclTarget { cluster: Some(6), endpoint: None }]);
        let entries = [entry];
        let context = AccessContext::case(100, 1);
        assert!(check(&context, &entries, Privilege::View, (1, 6)));
        assert!(check(&context, &entries, Privilege::View, (2, 6)));
        assert!(!check(&context, &entries, Privilege::View, (1, 8)));
    }

    #[test]
    fn test_tlv_roundtrip() {
        let entry = AclEntry {
            privilege: Privilege::Operate,
            auth_mode: AclAuthMode::Case,
            subjects: Some(vec![1, 2, 3]),
            targets: Some(vec![
                AclTarget { cluster: Some(6), endpoint: Some(1) },
                AclTarget { cluster: None, endpoint: Some(2) },
            ]),
            fabric_index: 2,
        };
        assert_eq!(AclEntry::from_tlv(&entry.to_tlv()), Some(entry));
    }

    #[test]
    fn test_tlv_null_lists_roundtrip() {
        let entry = AclEntry {
            privilege: Privilege::Administer,
            auth_mode: AclAuthMode::Case,
            subjects: None,
            targets: None,
            fabric_index: 1,
        };
        assert_eq!(AclEntry::from_tlv(&entry.to_tlv()), Some(entry));
    }

    #[test]
    fn test_malformed_tlv_rejected() {
        assert!(AclEntry::from_tlv(&TlvValue::Struct(vec![])).is_none());
        let bad = TlvValue::Struct(vec![
            (TAG_PRIVILEGE, TlvValue::Unsigned(9)),
            (TAG_AUTH_MODE, TlvValue::Unsigned(2)),
        ]);
        assert!(AclEntry::from_tlv(&bad).is_none());
    }
}
