//! Interaction Model router.
//!
//! Walks the declared endpoint/cluster tree for each request, enforces ACL
//! and privilege, validates writes against declared attribute shapes, applies
//! fabric-scoped filtering/merging, and chunks ReportData.

use log::debug;

use crate::acl::{check, AccessContext, AclEntry, TAG_FABRIC_INDEX};
use crate::core::{ACCESS_CONTROL_CLUSTER, MAX_REPORTS_PER_CHUNK};
use crate::session::AuthMode;
use crate::tlv::TlvValue;

use super::cluster::{DataModel, InvokeReply};
use super::messages::{
    AttributeReport, InvokeRequest, InvokeResponse, InvokeResponseIb, ReadRequest, ReportData,
    WriteRequest, WriteResponse,
};
use super::path::ConcretePath;
use super::status::ImStatus;
use crate::acl::Privilege;

/// Fetch the current ACL entry list from the hosted Access Control cluster.
///
/// Absent cluster means an empty list: every CASE access is denied until a
/// commissioner installs entries.
pub fn acl_entries(model: &DataModel) -> Vec<AclEntry> {
    let Some(cluster) = model.find_cluster(ACCESS_CONTROL_CLUSTER) else {
        return Vec::new();
    };
    let pase = AccessContext::pase();
    match cluster.read(crate::acl::cluster::ATTR_ACL, &pase) {
        Ok(TlvValue::Array(items)) => items.iter().filter_map(AclEntry::from_tlv).collect(),
        _ => Vec::new(),
    }
}

fn required_write_privilege(cluster: u32) -> Privilege {
    if cluster == ACCESS_CONTROL_CLUSTER {
        Privilege::Administer
    } else {
        Privilege::Operate
    }
}

/// Diagnose why a concrete path failed to resolve.
fn resolve_failure(model: &DataModel, path: &ConcretePath) -> ImStatus {
    if !model.has_endpoint(path.endpoint) {
        ImStatus::UnsupportedEndpoint
    } else if !model.has_cluster(path.endpoint, path.cluster) {
        ImStatus::UnsupportedCluster
    } else {
        ImStatus::UnsupportedAttribute
    }
}

/// Drop fabric-scoped list entries that belong to other fabrics.
fn filter_fabric_scoped(value: TlvValue, ctx: &AccessContext) -> TlvValue {
    if ctx.auth_mode == AuthMode::Pase {
        return value;
    }
    let TlvValue::Array(items) = value else {
        return value;
    };
    TlvValue::Array(
        items
            .into_iter()
            .filter(|item| {
                item.field(TAG_FABRIC_INDEX)
                    .and_then(TlvValue::as_u64)
                    .is_none_or(|fabric| fabric == u64::from(ctx.fabric_index))
            })
            .collect(),
    )
}

/// Read one concrete path with ACL and fabric filtering applied.
pub fn read_concrete(
    model: &DataModel,
    entries: &[AclEntry],
    path: &ConcretePath,
    ctx: &AccessContext,
) -> Result<TlvValue, ImStatus> {
    let meta = model
        .attribute_metadata(path)
        .ok_or_else(|| resolve_failure(model, path))?;
    if !check(ctx, entries, Privilege::View, (path.endpoint, path.cluster)) {
        return Err(ImStatus::UnsupportedAccess);
    }
    let handler = model
        .cluster(path.endpoint, path.cluster)
        .ok_or(ImStatus::UnsupportedCluster)?;
    let value = handler.read(path.attribute, ctx)?;
    Ok(if meta.fabric_scoped { filter_fabric_scoped(value, ctx) } else { value })
}

/// Handle a ReadRequest, producing chunked ReportData messages.
pub fn handle_read(
    model: &DataModel,
    request: &ReadRequest,
    ctx: &AccessContext,
) -> Vec<ReportData> {
    let entries = acl_entries(model);
    let mut reports = Vec::new();

    for path in &request.paths {
        let wildcard =
            path.endpoint.is_none() || path.cluster.is_none() || path.attribute.is_none();
        let expanded = model.expand(path);

        if expanded.is_empty() {
            if let (Some(endpoint), Some(cluster), Some(attribute)) =
                (path.endpoint, path.cluster, path.attribute)
            {
                let concrete = ConcretePath { endpoint, cluster, attribute };
                reports.push(AttributeReport::Status {
                    path: concrete,
                    status: resolve_failure(model, &concrete),
                });
            }
            continue;
        }

        for concrete in expanded {
            match read_concrete(model, &entries, &concrete, ctx) {
                Ok(value) => reports.push(AttributeReport::Data { path: concrete, value }),
                // wildcard expansion skips inaccessible paths silently
                Err(_) if wildcard => {}
                Err(status) => {
                    reports.push(AttributeReport::Status { path: concrete, status });
                }
            }
        }
    }

    chunk_reports(reports, None)
}

/// Split reports into ReportData chunks of at most `MAX_REPORTS_PER_CHUNK`.
pub fn chunk_reports(
    reports: Vec<AttributeReport>,
    subscription_id: Option<u32>,
) -> Vec<ReportData> {
    if reports.is_empty() {
        return vec![ReportData { subscription_id, ..ReportData::default() }];
    }
    let mut chunks: Vec<ReportData> = Vec::new();
    let mut reports = reports;
    while !reports.is_empty() {
        let rest = reports.split_off(reports.len().min(MAX_REPORTS_PER_CHUNK));
        chunks.push(ReportData {
            subscription_id,
            reports,
            more_chunks: true,
            suppress_response: false,
        });
        reports = rest;
    }
    if let Some(last) = chunks.last_mut() {
        last.more_chunks = false;
    }
    chunks
}

/// Merge a fabric-scoped list write: entries of other fabrics are preserved,
/// the writer's entries are replaced and stamped with its fabric index.
fn merge_fabric_scoped(
    current: &TlvValue,
    incoming: &TlvValue,
    ctx: &AccessContext,
) -> Result<TlvValue, ImStatus> {
    let TlvValue::Array(new_items) = incoming else {
        return Err(ImStatus::ConstraintError);
    };
    if ctx.auth_mode == AuthMode::Pase {
        return Ok(incoming.clone());
    }

    let mut merged: Vec<TlvValue> = match current {
        TlvValue::Array(items) => items
            .iter()
            .filter(|item| {
                item.field(TAG_FABRIC_INDEX)
                    .and_then(TlvValue::as_u64)
                    .is_some_and(|fabric| fabric != u64::from(ctx.fabric_index))
            })
            .cloned()
            .collect(),
        _ => Vec::new(),
    };

    for item in new_items {
        let TlvValue::Struct(fields) = item else {
            return Err(ImStatus::ConstraintError);
        };
        let mut fields: Vec<(u8, TlvValue)> =
            fields.iter().filter(|(tag, _)| *tag != TAG_FABRIC_INDEX).cloned().collect();
        fields.push((
            TAG_FABRIC_INDEX,
            TlvValue::Unsigned(u64::from(ctx.fabric_index)),
        ));
        merged.push(TlvValue::Struct(fields));
    }
    Ok(TlvValue::Array(merged))
}

/// Handle a WriteRequest. `timed_ok` reports whether a timed window was armed
/// on the exchange.
pub fn handle_write(
    model: &mut DataModel,
    request: &WriteRequest,
    ctx: &AccessContext,
    timed_ok: bool,
) -> WriteResponse {
    let entries = acl_entries(model);
    let mut responses = Vec::with_capacity(request.writes.len());

    for (path, value) in &request.writes {
        let status = write_one(model, &entries, path, value, ctx, request.timed, timed_ok);
        if status != ImStatus::Success {
            debug!("write to {path:?} failed: {status:?}");
        }
        responses.push((*path, status));
    }
    WriteResponse { responses }
}

#[allow(clippy::too_many_arguments)]
fn write_one(
    model: &mut DataModel,
    entries: &[AclEntry],
    path: &ConcretePath,
    value: &TlvValue,
    ctx: &AccessContext,
    request_timed: bool,
    timed_ok: bool,
) -> ImStatus {
    let Some(meta) = model.attribute_metadata(path) else {
        return resolve_failure(model, path);
    };
    if !meta.writable {
        return ImStatus::UnsupportedWrite;
    }
    if meta.timed_write && !timed_ok {
        return ImStatus::NeedsTimedInteraction;
    }
    if request_timed && !timed_ok {
        return ImStatus::NeedsTimedInteraction;
    }
    let required = required_write_privilege(path.cluster);
    if !check(ctx, entries, required, (path.endpoint, path.cluster)) {
        return ImStatus::UnsupportedAccess;
    }
    if !meta.kind.accepts(value) {
        return ImStatus::ConstraintError;
    }

    let to_write = if meta.fabric_scoped {
        let current = match model
            .cluster(path.endpoint, path.cluster)
            .map(|handler| handler.read(path.attribute, &AccessContext::pase()))
        {
            Some(Ok(current)) => current,
            _ => TlvValue::Array(vec![]),
        };
        match merge_fabric_scoped(&current, value, ctx) {
            Ok(merged) => merged,
            Err(status) => return status,
        }
    } else {
        value.clone()
    };

    let Some(handler) = model.cluster_mut(path.endpoint, path.cluster) else {
        return ImStatus::UnsupportedCluster;
    };
    match handler.write(path.attribute, &to_write, ctx) {
        Ok(()) => ImStatus::Success,
        Err(status) => status,
    }
}

/// Handle an InvokeRequest.
pub fn handle_invoke(
    model: &mut DataModel,
    request: &InvokeRequest,
    ctx: &AccessContext,
    timed_ok: bool,
) -> InvokeResponse {
    let entries = acl_entries(model);
    let mut responses = Vec::with_capacity(request.invokes.len());

    for (path, fields) in &request.invokes {
        if request.timed && !timed_ok {
            responses.push(InvokeResponseIb::Status {
                path: *path,
                status: ImStatus::NeedsTimedInteraction,
            });
            continue;
        }
        if !model.has_endpoint(path.endpoint) {
            responses.push(InvokeResponseIb::Status {
                path: *path,
                status: ImStatus::UnsupportedEndpoint,
            });
            continue;
        }
        if !model.has_cluster(path.endpoint, path.cluster) {
            responses.push(InvokeResponseIb::Status {
                path: *path,
                status: ImStatus::UnsupportedCluster,
            });
            continue;
        }
        if !check(ctx, &entries, Privilege::Operate, (path.endpoint, path.cluster)) {
            responses.push(InvokeResponseIb::Status {
                path: *path,
                status: ImStatus::UnsupportedAccess,
            });
            continue;
        }
        let Some(handler) = model.cluster_mut(path.endpoint, path.cluster) else {
            continue;
        };
        match handler.invoke(path.command, fields, ctx) {
            Ok(InvokeReply::Command { path: response_path, fields }) => {
                responses.push(InvokeResponseIb::Command { path: response_path, fields });
            }
            Ok(InvokeReply::Status(status)) => {
                responses.push(InvokeResponseIb::Status { path: *path, status });
            }
            Err(status) => {
                responses.push(InvokeResponseIb::Status { path: *path, status });
            }
        }
    }
    InvokeResponse { responses }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::cluster::{AccessControlCluster, ATTR_ACL};
    use crate::acl::{AclAuthMode, AclTarget};
    use crate::im::cluster::testutil::TestOnOff;
    use crate::im::path::{AttributePath, CommandPath};

    fn acl_entry(fabric: u8, privilege: Privilege, subject: u64) -> AclEntry {
        AclEntry {
            privilege,
            auth_mode: AclAuthMode::Case,
            subjects: Some(vec![subject]),
            targets: None,
            fabric_index: fabric,
        }
    }

    /// Endpoint 0: Access Control; endpoint 1: test on/off cluster.
    fn model_with_acl(entries: Vec<AclEntry>) -> DataModel {
        let mut model = DataModel::new();
        model.add_cluster(0, Box::new(AccessControlCluster::with_entries(entries)));
        model.add_cluster(1, Box::new(TestOnOff::new()));
        model
    }

    fn acl_path() -> ConcretePath {
        ConcretePath { endpoint: 0, cluster: ACCESS_CONTROL_CLUSTER, attribute: ATTR_ACL }
    }

    #[test]
    fn test_read_with_pase_bypasses_acl() {
        let model = model_with_acl(vec![]);
        let request = ReadRequest {
            paths: vec![AttributePath::concrete(1, 6, 0)],
            fabric_filtered: false,
        };
        let chunks = handle_read(&model, &request, &AccessContext::pase());
        assert_eq!(chunks.len(), 1);
        assert!(matches!(
            chunks[0].reports[0],
            AttributeReport::Data { value: TlvValue::Bool(false), .. }
        ));
    }

    #[test]
    fn test_case_without_entries_denied() {
        let model = model_with_acl(vec![]);
        let request = ReadRequest {
            paths: vec![AttributePath::concrete(1, 6, 0)],
            fabric_filtered: false,
        };
        let chunks = handle_read(&model, &request, &AccessContext::case(100, 1));
        assert!(matches!(
            chunks[0].reports[0],
            AttributeReport::Status { status: ImStatus::UnsupportedAccess, .. }
        ));
    }

    #[test]
    fn test_unknown_paths_reported() {
        let model = model_with_acl(vec![]);
        let request = ReadRequest {
            paths: vec![
                AttributePath::concrete(9, 6, 0),
                AttributePath::concrete(1, 99, 0),
                AttributePath::concrete(1, 6, 99),
            ],
            fabric_filtered: false,
        };
        let chunks = handle_read(&model, &request, &AccessContext::pase());
        let statuses: Vec<_> = chunks[0]
            .reports
            .iter()
            .map(|r| match r {
                AttributeReport::Status { status, .. } => *status,
                AttributeReport::Data { .. } => panic!("expected status"),
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                ImStatus::UnsupportedEndpoint,
                ImStatus::UnsupportedCluster,
                ImStatus::UnsupportedAttribute
            ]
        );
    }

    #[test]
    fn test_report_chunking() {
        let mut model = DataModel::new();
        // 6 endpoints x 2 attributes = 12 reports -> 2 chunks at 9/chunk
        for endpoint in 1..=6 {
            model.add_cluster(endpoint, Box::new(TestOnOff::new()));
        }
        let request =
            ReadRequest { paths: vec![AttributePath::wildcard()], fabric_filtered: false };
        let chunks = handle_read(&model, &request, &AccessContext::pase());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].reports.len(), MAX_REPORTS_PER_CHUNK);
        assert_eq!(chunks[1].reports.len(), 3);
        assert!(chunks[0].more_chunks);
        assert!(!chunks[1].more_chunks);
    }

    #[test]
    fn test_write_type_validation() {
        let mut model = model_with_acl(vec![]);
        let request = WriteRequest {
            timed: false,
            writes: vec![(
                ConcretePath { endpoint: 1, cluster: 6, attribute: 1 },
                TlvValue::Utf8("wrong".into()),
            )],
        };
        let response = handle_write(&mut model, &request, &AccessContext::pase(), false);
        assert_eq!(response.responses[0].1, ImStatus::ConstraintError);
    }

    #[test]
    fn test_write_read_only_attribute() {
        let mut model = model_with_acl(vec![]);
        let request = WriteRequest {
            timed: false,
            writes: vec![(
                ConcretePath { endpoint: 1, cluster: 6, attribute: 0 },
                TlvValue::Bool(true),
            )],
        };
        let response = handle_write(&mut model, &request, &AccessContext::pase(), false);
        assert_eq!(response.responses[0].1, ImStatus::UnsupportedWrite);
    }

    #[test]
    fn test_timed_write_without_window() {
        let mut model = model_with_acl(vec![]);
        let request = WriteRequest {
            timed: true,
            writes: vec![(
                ConcretePath { endpoint: 1, cluster: 6, attribute: 1 },
                TlvValue::Unsigned(3),
            )],
        };
        let response = handle_write(&mut model, &request, &AccessContext::pase(), false);
        assert_eq!(response.responses[0].1, ImStatus::NeedsTimedInteraction);
        let response = handle_write(&mut model, &request, &AccessContext::pase(), true);
        assert_eq!(response.responses[0].1, ImStatus::Success);
    }

    #[test]
    fn test_acl_write_requires_administer() {
        let entries = vec![
            acl_entry(1, Privilege::Operate, 100),
            acl_entry(1, Privilege::Administer, 200),
        ];
        let mut model = model_with_acl(entries.clone());
        let new_list = TlvValue::Array(vec![acl_entry(1, Privilege::Operate, 100).to_tlv()]);
        let request = WriteRequest { timed: false, writes: vec![(acl_path(), new_list)] };

        // operate-only subject denied
        let response =
            handle_write(&mut model, &request, &AccessContext::case(100, 1), false);
        assert_eq!(response.responses[0].1, ImStatus::UnsupportedAccess);

        // administer subject allowed
        let response =
            handle_write(&mut model, &request, &AccessContext::case(200, 1), false);
        assert_eq!(response.responses[0].1, ImStatus::Success);
    }

    #[test]
    fn test_acl_fabric_isolation() {
        // fabric 1: administer for subject 100; fabric 2: operate for 200
        let fabric1 = acl_entry(1, Privilege::Administer, 100);
        let fabric2 = acl_entry(2, Privilege::Operate, 200);
        let model = model_with_acl(vec![fabric1.clone(), fabric2.clone()]);
        let request =
            ReadRequest { paths: vec![AttributePath::concrete(0, ACCESS_CONTROL_CLUSTER, 0)], fabric_filtered: true };

        // fabric 1 sees only its entry
        let chunks = handle_read(&model, &request, &AccessContext::case(100, 1));
        let AttributeReport::Data { value, .. } = &chunks[0].reports[0] else {
            panic!("expected data");
        };
        let entries: Vec<AclEntry> =
            value.as_array().unwrap().iter().filter_map(AclEntry::from_tlv).collect();
        assert_eq!(entries, vec![fabric1.clone()]);

        // fabric 2 sees only its entry
        let chunks = handle_read(&model, &request, &AccessContext::case(200, 2));
        let AttributeReport::Data { value, .. } = &chunks[0].reports[0] else {
            panic!("expected data");
        };
        let entries: Vec<AclEntry> =
            value.as_array().unwrap().iter().filter_map(AclEntry::from_tlv).collect();
        assert_eq!(entries, vec![fabric2.clone()]);

        // PASE sees both
        let chunks = handle_read(&model, &request, &AccessContext::pase());
        let AttributeReport::Data { value, .. } = &chunks[0].reports[0] else {
            panic!("expected data");
        };
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_acl_write_merge_preserves_other_fabric() {
        let fabric1 = acl_entry(1, Privilege::Administer, 100);
        let fabric2 = acl_entry(2, Privilege::Operate, 200);
        let mut model = model_with_acl(vec![fabric1, fabric2.clone()]);

        // fabric 1 replaces its own entries with two new ones
        let new_entries = TlvValue::Array(vec![
            acl_entry(1, Privilege::Administer, 100).to_tlv(),
            acl_entry(1, Privilege::View, 101).to_tlv(),
        ]);
        let request = WriteRequest { timed: false, writes: vec![(acl_path(), new_entries)] };
        let response =
            handle_write(&mut model, &request, &AccessContext::case(100, 1), false);
        assert_eq!(response.responses[0].1, ImStatus::Success);

        let all = acl_entries(&model);
        assert_eq!(all.len(), 3);
        assert!(all.contains(&fabric2), "fabric-2 entry must be preserved");
        assert!(all.iter().any(|e| e.fabric_index == 1 && e.subjects == Some(vec![101])));
    }

    #[test]
    fn test_invoke_flow() {
        let entries = vec![acl_entry(1, Privilege::Operate, 100)];
        let mut model = model_with_acl(entries);
        let request = InvokeRequest {
            suppress_response: false,
            timed: false,
            invokes: vec![(CommandPath::new(1, 6, 1), TlvValue::Struct(vec![]))],
        };
        let response =
            handle_invoke(&mut model, &request, &AccessContext::case(100, 1), false);
        assert_eq!(
            response.responses,
            vec![InvokeResponseIb::Status {
                path: CommandPath::new(1, 6, 1),
                status: ImStatus::Success
            }]
        );
        // the command took effect
        let read = handle_read(
            &model,
            &ReadRequest { paths: vec![AttributePath::concrete(1, 6, 0)], fabric_filtered: false },
            &AccessContext::pase(),
        );
        assert!(matches!(
            read[0].reports[0],
            AttributeReport::Data { value: TlvValue::Bool(true), .. }
        ));
    }

    #[test]
    fn test_invoke_unknown_command() {
        let mut model = model_with_acl(vec![]);
        let request = InvokeRequest {
            suppress_response: false,
            timed: false,
            invokes: vec![(CommandPath::new(1, 6, 99), TlvValue::Struct(vec![]))],
        };
        let response = handle_invoke(&mut model, &request, &AccessContext::pase(), false);
        assert_eq!(
            response.responses,
            vec![InvokeResponseIb::Status {
                path: CommandPath::new(1, 6, 99),
                status: ImStatus::UnsupportedCommand
            }]
        );
    }

    #[test]
    fn test_acl_target_scoping_applies() {
        // subject may operate only on cluster 6
        let entry = AclEntry {
            privilege: Privilege::Operate,
            auth_mode: AclAuthMode::Case,
            subjects: Some(vec![100]),
            targets: Some(vec![AclTarget { cluster: Some(6), endpoint: None }]),
            fabric_index: 1,
        };
        let model = model_with_acl(vec![entry]);
        let ctx = AccessContext::case(100, 1);
        let ok = ReadRequest { paths: vec![AttributePath::concrete(1, 6, 0)], fabric_filtered: false };
        assert!(matches!(
            handle_read(&model, &ok, &ctx)[0].reports[0],
            AttributeReport::Data { .. }
        ));
        let denied = ReadRequest {
            paths: vec![AttributePath::concrete(0, ACCESS_CONTROL_CLUSTER, 0)],
            fabric_filtered: false,
        };
        assert!(matches!(
            handle_read(&model, &denied, &ctx)[0].reports[0],
            AttributeReport::Status { status: ImStatus::UnsupportedAccess, .. }
        ));
    }
}
