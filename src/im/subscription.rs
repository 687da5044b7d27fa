//! Subscription engine.
//!
//! Timer-driven: on each ~1 s tick, a subscription reports all paths when
//! `max_interval` has elapsed (keep-alive) or only the changed paths when
//! `min_interval` has elapsed and a snapshot differs. It never reports more
//! often than `min_interval`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::acl::AccessContext;
use crate::tlv::TlvValue;

use super::cluster::DataModel;
use super::messages::{AttributeReport, ReportData, SubscribeRequest, SubscribeResponse};
use super::path::ConcretePath;
use super::router::{acl_entries, chunk_reports, read_concrete};
use super::status::ImStatus;

/// Default cap on live subscriptions.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 16;

/// One standing subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Subscription id.
    pub id: u32,
    /// Session the reports flow back on.
    pub session_id: u16,
    /// Access context captured at subscribe time.
    pub context: AccessContext,
    /// Minimum seconds between reports.
    pub min_interval: Duration,
    /// Maximum seconds between reports.
    pub max_interval: Duration,
    expanded: Vec<ConcretePath>,
    last_report: Instant,
    last_values: BTreeMap<ConcretePath, Option<TlvValue>>,
}

/// A batch of chunked reports owed to one session.
#[derive(Debug)]
pub struct ReportJob {
    /// Session to send on.
    pub session_id: u16,
    /// Chunked ReportData messages.
    pub chunks: Vec<ReportData>,
}

/// The subscription table and ticker.
#[derive(Debug)]
pub struct SubscriptionEngine {
    subscriptions: Vec<Subscription>,
    next_id: u32,
    max_subscriptions: usize,
}

impl SubscriptionEngine {
    /// Empty engine.
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
            next_id: 1,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
        }
    }

    /// Override the subscription cap.
    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }

    /// Establish a subscription: snapshot, priming report, response.
    pub fn subscribe(
        &mut self,
        model: &DataModel,
        request: &SubscribeRequest,
        session_id: u16,
        context: AccessContext,
        now: Instant,
    ) -> Result<(Vec<ReportData>, SubscribeResponse), ImStatus> {
        if self.subscriptions.len() >= self.max_subscriptions {
            return Err(ImStatus::ResourceExhausted);
        }

        let mut expanded = Vec::new();
        for path in &request.paths {
            expanded.extend(model.expand(path));
        }
        expanded.sort_unstable();
        expanded.dedup();
        if expanded.is_empty() {
            return Err(ImStatus::InvalidAction);
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let entries = acl_entries(model);
        let mut last_values = BTreeMap::new();
        let mut reports = Vec::new();
        for path in &expanded {
            match read_concrete(model, &entries, path, &context) {
                Ok(value) => {
                    reports.push(AttributeReport::Data { path: *path, value: value.clone() });
                    last_values.insert(*path, Some(value));
                }
                Err(_) => {
                    last_values.insert(*path, None);
                }
            }
        }

        let priming = chunk_reports(reports, Some(id));
        let response = SubscribeResponse {
            subscription_id: id,
            max_interval: request.max_interval,
        };

        self.subscriptions.push(Subscription {
            id,
            session_id,
            context,
            min_interval: Duration::from_secs(u64::from(request.min_interval)),
            max_interval: Duration::from_secs(u64::from(request.max_interval)),
            expanded,
            last_report: now,
            last_values,
        });
        debug!("subscription {id} established on session {session_id}");
        Ok((priming, response))
    }

    /// Periodic tick: evaluate every subscription against its intervals.
    pub fn tick(&mut self, model: &DataModel, now: Instant) -> Vec<ReportJob> {
        let entries = acl_entries(model);
        let mut jobs = Vec::new();

        for sub in &mut self.subscriptions {
            let elapsed = now.duration_since(sub.last_report);
            if elapsed < sub.min_interval {
                continue;
            }

            let keepalive = elapsed >= sub.max_interval;
            let mut changed = Vec::new();
            let mut current = BTreeMap::new();
            for path in &sub.expanded {
                let value = read_concrete(model, &entries, path, &sub.context).ok();
                if sub.last_values.get(path) != Some(&value) {
                    changed.push(*path);
                }
                current.insert(*path, value);
            }

            if !keepalive && changed.is_empty() {
                continue;
            }

            let report_paths: &[ConcretePath] =
                if keepalive { &sub.expanded } else { &changed };
            let reports = report_paths
                .iter()
                .filter_map(|path| {
                    current.get(path).and_then(Clone::clone).map(|value| {
                        AttributeReport::Data { path: *path, value }
                    })
                })
                .collect::<Vec<_>>();

            sub.last_values = current;
            sub.last_report = now;
            jobs.push(ReportJob {
                session_id: sub.session_id,
                chunks: chunk_reports(reports, Some(sub.id)),
            });
        }
        jobs
    }

    /// Cancel a subscription by id (peer sent `InvalidSubscription`).
    pub fn cancel(&mut self, id: u32) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        before != self.subscriptions.len()
    }

    /// Tear down every subscription on a closed session.
    pub fn close_session(&mut self, session_id: u16) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.session_id != session_id);
        before - self.subscriptions.len()
    }

    /// Live subscription count.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether no subscription is live.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl Default for SubscriptionEngine {
    fn default() -> Self {
        Self::new()
    }
}
