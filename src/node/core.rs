//! The node core: a single-owner state machine over all protocol state.
//!
//! Owns the session table, exchange manager, fabric table, data model, and
//! subscription engine. Transports feed it raw frames; it emits encoded
//! frames into an outbox the runtime drains. Everything here is synchronous
//! and I/O-free, so the full pipeline is unit-testable.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, warn};

use crate::acl::AccessContext;
use crate::core::{
    SecurityError, HANDSHAKE_TIMEOUT, PROTOCOL_INTERACTION_MODEL, PROTOCOL_SECURE_CHANNEL,
};
use crate::crypto::Keypair;
use crate::exchange::{ExchangeKey, ExchangeManager, InboundDisposition, RetransmitAction};
use crate::fabric::FabricTable;
use crate::im::messages::{
    ImOpcode, InvokeRequest, ReadRequest, StatusResponse, SubscribeRequest, TimedRequest,
    WriteRequest,
};
use crate::im::{DataModel, ImStatus, SubscriptionEngine};
use crate::message::{
    decode, encode_plain, encode_secured, DecodedFrame, Message, MessageHeader, ProtocolHeader,
    SealedMessage, SecureChannelOpcode, StatusReport,
};
use crate::secure_channel::{CaseResponder, PaseResponder};
use crate::session::{AuthMode, OutboundCounter, SessionTable, TransportBinding};
use crate::transport::TransportEvent;

/// Static configuration for a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Commissioning passcode.
    pub passcode: u32,
    /// PBKDF2 salt for the PASE verifier.
    pub pase_salt: Vec<u8>,
    /// PBKDF2 iteration count.
    pub pase_iterations: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            passcode: 20202021,
            pase_salt: vec![0x5B; 32],
            pase_iterations: 1000,
        }
    }
}

/// Observable node lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeNotification {
    /// A handshake completed and the session is usable.
    SessionEstablished {
        /// Local session id.
        session_id: u16,
        /// How it authenticated.
        auth_mode: AuthMode,
    },
    /// A session closed (explicit, transport loss, or handshake abort).
    SessionClosed {
        /// Local session id.
        session_id: u16,
    },
}

enum Handshake {
    Pase { fsm: PaseResponder, session_id: u16, deadline: Instant },
    Case { fsm: CaseResponder, session_id: u16, deadline: Instant },
}

impl Handshake {
    fn session_id(&self) -> u16 {
        match self {
            Handshake::Pase { session_id, .. } | Handshake::Case { session_id, .. } => {
                *session_id
            }
        }
    }

    fn deadline(&self) -> Instant {
        match self {
            Handshake::Pase { deadline, .. } | Handshake::Case { deadline, .. } => *deadline,
        }
    }
}

/// The node state machine.
pub struct NodeCore {
    config: NodeConfig,
    sessions: SessionTable,
    exchanges: ExchangeManager,
    fabrics: FabricTable,
    model: DataModel,
    subscriptions: SubscriptionEngine,
    handshakes: HashMap<ExchangeKey, Handshake>,
    exchange_bindings: HashMap<ExchangeKey, TransportBinding>,
    subscription_exchanges: HashMap<ExchangeKey, u32>,
    unsecured_counter: OutboundCounter,
    outbox: Vec<(TransportBinding, Vec<u8>)>,
    notifications: Vec<NodeNotification>,
}

impl NodeCore {
    /// New node core.
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            sessions: SessionTable::new(0),
            exchanges: ExchangeManager::new(),
            fabrics: FabricTable::new(),
            model: DataModel::new(),
            subscriptions: SubscriptionEngine::new(),
            handshakes: HashMap::new(),
            exchange_bindings: HashMap::new(),
            subscription_exchanges: HashMap::new(),
            unsecured_counter: OutboundCounter::new(),
            outbox: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// Mutable access to the hosted cluster tree.
    pub fn data_model_mut(&mut self) -> &mut DataModel {
        &mut self.model
    }

    /// The hosted cluster tree.
    pub fn data_model(&self) -> &DataModel {
        &self.model
    }

    /// Commissioned fabrics.
    pub fn fabrics(&self) -> &FabricTable {
        &self.fabrics
    }

    /// Install fabric credentials (commissioning writes them at
    /// CASE-success transitions; tests and restored state use this too).
    #[allow(clippy::too_many_arguments)]
    pub fn add_fabric(
        &mut self,
        fabric_id: u64,
        node_id: u64,
        root_public_key: [u8; 65],
        ipk: [u8; 16],
        noc: Vec<u8>,
        icac: Option<Vec<u8>>,
        operational_key: Keypair,
    ) -> u8 {
        // operational node id also feeds outbound nonces
        self.sessions.set_local_node_id(node_id);
        self.fabrics
            .add(fabric_id, node_id, root_public_key, ipk, noc, icac, operational_key)
    }

    /// Frames ready for the wire.
    pub fn take_outbox(&mut self) -> Vec<(TransportBinding, Vec<u8>)> {
        std::mem::take(&mut self.outbox)
    }

    /// Pending lifecycle notifications.
    pub fn take_notifications(&mut self) -> Vec<NodeNotification> {
        std::mem::take(&mut self.notifications)
    }

    /// Earliest timer deadline (MRP, acks, handshake expiry).
    pub fn next_deadline(&self) -> Option<Instant> {
        let handshake_deadline = self.handshakes.values().map(Handshake::deadline).min();
        match (self.exchanges.next_deadline(), handshake_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Process one transport event.
    pub fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Frame { binding, data } => self.on_frame(binding, &data, now),
            TransportEvent::Closed { binding } => self.on_transport_closed(binding),
        }
    }

    /// Process one raw frame.
    pub fn on_frame(&mut self, binding: TransportBinding, data: &[u8], now: Instant) {
        match decode(data) {
            Ok(DecodedFrame::Plain(message)) => self.on_plain(binding, &message, now),
            Ok(DecodedFrame::Sealed(sealed)) => self.on_sealed(binding, &sealed, now),
            Err(error) => debug!("dropping malformed frame: {error}"),
        }
    }

    /// Drive MRP and handshake timers.
    pub fn poll_timers(&mut self, now: Instant) {
        for (key, counter) in self.exchanges.due_standalone_acks(now) {
            self.send_standalone_ack(&key, counter);
        }

        for action in self.exchanges.due_retransmits(now) {
            match action {
                RetransmitAction::Resend { key, frame } => {
                    if let Some(binding) = self.binding_for(&key) {
                        debug!("retransmitting on exchange {key:?}");
                        self.outbox.push((binding, frame));
                    }
                }
                RetransmitAction::TimedOut { key } => {
                    warn!("exchange {key:?} timed out awaiting ack");
                    self.exchange_bindings.remove(&key);
                    self.subscription_exchanges.remove(&key);
                }
            }
        }

        let expired: Vec<ExchangeKey> = self
            .handshakes
            .iter()
            .filter(|(_, handshake)| handshake.deadline() <= now)
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            if let Some(handshake) = self.handshakes.remove(&key) {
                warn!("handshake on exchange {key:?} timed out");
                self.close_session(handshake.session_id());
            }
        }
    }

    /// Run the subscription engine tick.
    pub fn tick_subscriptions(&mut self, now: Instant) {
        let jobs = self.subscriptions.tick(&self.model, now);
        for job in jobs {
            let exchange_id = self.exchanges.allocate_exchange_id();
            let key = ExchangeKey {
                session_id: job.session_id,
                exchange_id,
                initiator: true,
            };
            let subscription_id = job.chunks.first().and_then(|c| c.subscription_id);
            if let Some(id) = subscription_id {
                self.subscription_exchanges.insert(key, id);
            }
            for chunk in &job.chunks {
                self.send_secured(
                    &key,
                    PROTOCOL_INTERACTION_MODEL,
                    ImOpcode::ReportData.as_byte(),
                    chunk.encode(),
                    true,
                    now,
                );
            }
        }
    }

    /// Close a session and everything hanging off it.
    pub fn close_session(&mut self, session_id: u16) {
        if self.sessions.close(session_id).is_some() {
            self.exchanges.close_session(session_id);
            let torn_down = self.subscriptions.close_session(session_id);
            if torn_down > 0 {
                debug!("closed {torn_down} subscriptions with session {session_id}");
            }
            self.notifications.push(NodeNotification::SessionClosed { session_id });
        }
    }

    fn on_transport_closed(&mut self, binding: TransportBinding) {
        for session_id in self.sessions.close_transport(binding) {
            self.exchanges.close_session(session_id);
            self.subscriptions.close_session(session_id);
            self.notifications.push(NodeNotification::SessionClosed { session_id });
        }
        self.exchange_bindings.retain(|_, b| *b != binding);
    }

    // =========================================================================
    // Unsecured path: handshakes and standalone acks
    // =========================================================================

    fn on_plain(&mut self, binding: TransportBinding, message: &Message, now: Instant) {
        let (disposition, key) = match self.exchanges.on_inbound(
            0,
            &message.protocol,
            message.header.counter,
            now,
        ) {
            Ok(result) => result,
            Err(error) => {
                warn!("rejecting unsecured frame: {error}");
                return;
            }
        };
        self.exchange_bindings.insert(key, binding);
        if disposition == InboundDisposition::Duplicate {
            return;
        }
        if message.protocol.protocol_id != PROTOCOL_SECURE_CHANNEL {
            debug!("dropping unsecured non-secure-channel frame");
            return;
        }

        let Some(opcode) = SecureChannelOpcode::from_byte(message.protocol.opcode) else {
            debug!("dropping unknown secure channel opcode {:#x}", message.protocol.opcode);
            return;
        };

        match opcode {
            SecureChannelOpcode::StandaloneAck => {
                self.exchanges.release_if_idle(&key);
            }
            SecureChannelOpcode::PbkdfParamRequest => {
                self.on_pbkdf_param_request(binding, &key, message, now);
            }
            SecureChannelOpcode::Pake1 => self.on_pase_message(&key, message, false, now),
            SecureChannelOpcode::Pake3 => self.on_pase_message(&key, message, true, now),
            SecureChannelOpcode::Sigma1 => self.on_sigma1(binding, &key, message, now),
            SecureChannelOpcode::Sigma3 => self.on_sigma3(&key, message, now),
            SecureChannelOpcode::StatusReport => {
                if let Ok(report) = StatusReport::from_bytes(&message.payload) {
                    debug!("peer status report: {report:?}");
                }
            }
            _ => debug!("ignoring secure channel opcode {opcode:?}"),
        }
    }

    fn on_pbkdf_param_request(
        &mut self,
        binding: TransportBinding,
        key: &ExchangeKey,
        message: &Message,
        now: Instant,
    ) {
        let session_id = match self.sessions.create_provisional(binding) {
            Ok(id) => id,
            Err(error) => {
                warn!("cannot start PASE: {error}");
                self.send_handshake_failure(key, now);
                return;
            }
        };
        let mut fsm = PaseResponder::new(
            self.config.passcode,
            self.config.pase_salt.clone(),
            self.config.pase_iterations,
            session_id,
        );
        match fsm.on_pbkdf_param_request(&message.payload) {
            Ok(response) => {
                self.handshakes.insert(
                    *key,
                    Handshake::Pase { fsm, session_id, deadline: now + HANDSHAKE_TIMEOUT },
                );
                self.send_unsecured(
                    key,
                    SecureChannelOpcode::PbkdfParamResponse.as_byte(),
                    response,
                    true,
                    now,
                );
            }
            Err(error) => {
                debug!("PASE aborted: {error}");
                self.close_session(session_id);
                self.send_handshake_failure(key, now);
            }
        }
    }

    fn on_pase_message(
        &mut self,
        key: &ExchangeKey,
        message: &Message,
        is_pake3: bool,
        now: Instant,
    ) {
        let Some(Handshake::Pase { fsm, session_id, .. }) = self.handshakes.get_mut(key) else {
            debug!("PASE message without a handshake in flight");
            self.send_handshake_failure(key, now);
            return;
        };
        let session_id = *session_id;

        if is_pake3 {
            match fsm.on_pake3(&message.payload) {
                Ok(secrets) => {
                    let auth_mode = secrets.auth_mode;
                    if self.sessions.commit(session_id, secrets).is_err() {
                        self.close_session(session_id);
                        self.send_handshake_failure(key, now);
                        return;
                    }
                    self.handshakes.remove(key);
                    self.send_status_report(
                        key,
                        StatusReport::session_establishment_success(),
                        now,
                    );
                    self.notifications.push(NodeNotification::SessionEstablished {
                        session_id,
                        auth_mode,
                    });
                }
                Err(error) => {
                    debug!("PASE failed at pake3: {error}");
                    self.handshakes.remove(key);
                    self.close_session(session_id);
                    self.send_handshake_failure(key, now);
                }
            }
        } else {
            match fsm.on_pake1(&message.payload) {
                Ok(response) => {
                    self.send_unsecured(
                        key,
                        SecureChannelOpcode::Pake2.as_byte(),
                        response,
                        true,
                        now,
                    );
                }
                Err(error) => {
                    debug!("PASE failed at pake1: {error}");
                    self.handshakes.remove(key);
                    self.close_session(session_id);
                    self.send_handshake_failure(key, now);
                }
            }
        }
    }

    fn on_sigma1(
        &mut self,
        binding: TransportBinding,
        key: &ExchangeKey,
        message: &Message,
        now: Instant,
    ) {
        let session_id = match self.sessions.create_provisional(binding) {
            Ok(id) => id,
            Err(error) => {
                warn!("cannot start CASE: {error}");
                self.send_handshake_failure(key, now);
                return;
            }
        };
        let mut fsm = CaseResponder::new(session_id);
        match fsm.on_sigma1(&self.fabrics, &message.payload) {
            Ok(response) => {
                self.handshakes.insert(
                    *key,
                    Handshake::Case { fsm, session_id, deadline: now + HANDSHAKE_TIMEOUT },
                );
                self.send_unsecured(
                    key,
                    SecureChannelOpcode::Sigma2.as_byte(),
                    response,
                    true,
                    now,
                );
            }
            Err(error) => {
                debug!("CASE aborted at sigma1: {error}");
                self.close_session(session_id);
                self.send_handshake_failure(key, now);
            }
        }
    }

    fn on_sigma3(&mut self, key: &ExchangeKey, message: &Message, now: Instant) {
        let Some(Handshake::Case { fsm, session_id, .. }) = self.handshakes.get_mut(key) else {
            debug!("sigma3 without a handshake in flight");
            self.send_handshake_failure(key, now);
            return;
        };
        let session_id = *session_id;

        match fsm.on_sigma3(&self.fabrics, &message.payload) {
            Ok(secrets) => {
                let auth_mode = secrets.auth_mode;
                if self.sessions.commit(session_id, secrets).is_err() {
                    self.close_session(session_id);
                    self.send_handshake_failure(key, now);
                    return;
                }
                self.handshakes.remove(key);
                self.send_status_report(key, StatusReport::session_establishment_success(), now);
                self.notifications.push(NodeNotification::SessionEstablished {
                    session_id,
                    auth_mode,
                });
            }
            Err(error) => {
                debug!("CASE failed at sigma3: {error}");
                self.handshakes.remove(key);
                self.close_session(session_id);
                self.send_handshake_failure(key, now);
            }
        }
    }

    fn send_handshake_failure(&mut self, key: &ExchangeKey, now: Instant) {
        // all failures look identical on the wire
        self.send_status_report(key, StatusReport::session_establishment_failure(), now);
    }

    fn send_status_report(&mut self, key: &ExchangeKey, report: StatusReport, now: Instant) {
        self.send_unsecured(
            key,
            SecureChannelOpcode::StatusReport.as_byte(),
            report.to_bytes().to_vec(),
            true,
            now,
        );
    }

    // =========================================================================
    // Secured path: IM dispatch
    // =========================================================================

    fn on_sealed(&mut self, binding: TransportBinding, sealed: &SealedMessage, now: Instant) {
        if sealed.header.security_flags.is_group() {
            debug!("dropping group-keyed frame: {}", SecurityError::SessionMismatch);
            return;
        }
        let session_id = sealed.header.session_id;
        let message = {
            let Ok(session) = self.sessions.lookup_active(session_id) else {
                debug!("dropping frame: {}", SecurityError::SessionMismatch);
                return;
            };
            let key = match session.decrypt_key() {
                Ok(key) => key.clone(),
                Err(error) => {
                    debug!("dropping frame: {error}");
                    return;
                }
            };
            let message = match crate::message::open_sealed(sealed, &key, session.peer_node_id())
            {
                Ok(message) => message,
                Err(error) => {
                    debug!("dropping frame: {error}");
                    return;
                }
            };
            match session.inbound_counter_check(message.header.counter) {
                Ok(()) => {}
                Err(SecurityError::Duplicate) => {
                    // acknowledged but never redelivered
                    let _ = self.exchanges.on_inbound(
                        session_id,
                        &message.protocol,
                        message.header.counter,
                        now,
                    );
                    return;
                }
                Err(error) => {
                    debug!("dropping frame: {error}");
                    return;
                }
            }
            // a roaming UDP peer rebinds its session
            if matches!(binding, TransportBinding::Udp(_)) && session.transport() != binding {
                session.rebind_transport(binding);
            }
            message
        };

        let (disposition, key) = match self.exchanges.on_inbound(
            session_id,
            &message.protocol,
            message.header.counter,
            now,
        ) {
            Ok(result) => result,
            Err(error) => {
                warn!("rejecting frame: {error}");
                return;
            }
        };
        if disposition == InboundDisposition::Duplicate {
            return;
        }

        match message.protocol.protocol_id {
            PROTOCOL_SECURE_CHANNEL => {
                let opcode = SecureChannelOpcode::from_byte(message.protocol.opcode);
                if opcode == Some(SecureChannelOpcode::StandaloneAck) {
                    self.exchanges.release_if_idle(&key);
                } else {
                    debug!("ignoring secured secure-channel opcode {:?}", opcode);
                }
            }
            PROTOCOL_INTERACTION_MODEL => self.on_im(&key, session_id, &message, now),
            other => debug!("dropping frame for unknown protocol {other:#x}"),
        }
    }

    fn access_context(&mut self, session_id: u16) -> Option<AccessContext> {
        let session = self.sessions.lookup(session_id)?;
        Some(match session.auth_mode() {
            AuthMode::Pase => AccessContext::pase(),
            AuthMode::Case | AuthMode::Group => {
                AccessContext::case(session.peer_node_id(), session.fabric_index())
            }
        })
    }

    fn on_im(&mut self, key: &ExchangeKey, session_id: u16, message: &Message, now: Instant) {
        let Some(context) = self.access_context(session_id) else {
            return;
        };
        let Some(opcode) = ImOpcode::from_byte(message.protocol.opcode) else {
            debug!("dropping unknown IM opcode {:#x}", message.protocol.opcode);
            return;
        };

        match opcode {
            ImOpcode::ReadRequest => match ReadRequest::decode(&message.payload) {
                Ok(request) => {
                    let chunks = crate::im::router::handle_read(&self.model, &request, &context);
                    for chunk in &chunks {
                        self.send_secured(
                            key,
                            PROTOCOL_INTERACTION_MODEL,
                            ImOpcode::ReportData.as_byte(),
                            chunk.encode(),
                            true,
                            now,
                        );
                    }
                }
                Err(_) => self.send_im_status(key, ImStatus::InvalidAction, now),
            },
            ImOpcode::WriteRequest => match WriteRequest::decode(&message.payload) {
                Ok(request) => {
                    let timed_ok = self.exchanges.consume_timed(key, now);
                    let response = crate::im::router::handle_write(
                        &mut self.model,
                        &request,
                        &context,
                        timed_ok,
                    );
                    self.send_secured(
                        key,
                        PROTOCOL_INTERACTION_MODEL,
                        ImOpcode::WriteResponse.as_byte(),
                        response.encode(),
                        true,
                        now,
                    );
                }
                Err(_) => self.send_im_status(key, ImStatus::InvalidAction, now),
            },
            ImOpcode::InvokeRequest => match InvokeRequest::decode(&message.payload) {
                Ok(request) => {
                    let timed_ok = self.exchanges.consume_timed(key, now);
                    let response = crate::im::router::handle_invoke(
                        &mut self.model,
                        &request,
                        &context,
                        timed_ok,
                    );
                    if !request.suppress_response {
                        self.send_secured(
                            key,
                            PROTOCOL_INTERACTION_MODEL,
                            ImOpcode::InvokeResponse.as_byte(),
                            response.encode(),
                            true,
                            now,
                        );
                    }
                }
                Err(_) => self.send_im_status(key, ImStatus::InvalidAction, now),
            },
            ImOpcode::SubscribeRequest => match SubscribeRequest::decode(&message.payload) {
                Ok(request) => {
                    match self.subscriptions.subscribe(
                        &self.model,
                        &request,
                        session_id,
                        context,
                        now,
                    ) {
                        Ok((priming, response)) => {
                            for chunk in &priming {
                                self.send_secured(
                                    key,
                                    PROTOCOL_INTERACTION_MODEL,
                                    ImOpcode::ReportData.as_byte(),
                                    chunk.encode(),
                                    true,
                                    now,
                                );
                            }
                            self.send_secured(
                                key,
                                PROTOCOL_INTERACTION_MODEL,
                                ImOpcode::SubscribeResponse.as_byte(),
                                response.encode(),
                                true,
                                now,
                            );
                        }
                        Err(status) => self.send_im_status(key, status, now),
                    }
                }
                Err(_) => self.send_im_status(key, ImStatus::InvalidAction, now),
            },
            ImOpcode::TimedRequest => match TimedRequest::decode(&message.payload) {
                Ok(request) => {
                    self.exchanges.arm_timed(
                        *key,
                        std::time::Duration::from_millis(u64::from(request.timeout_ms)),
                        now,
                    );
                    self.send_im_status(key, ImStatus::Success, now);
                }
                Err(_) => self.send_im_status(key, ImStatus::InvalidAction, now),
            },
            ImOpcode::StatusResponse => {
                if let Ok(response) = StatusResponse::decode(&message.payload) {
                    if response.status == ImStatus::InvalidSubscription {
                        if let Some(subscription_id) = self.subscription_exchanges.remove(key) {
                            self.subscriptions.cancel(subscription_id);
                            debug!("peer cancelled subscription {subscription_id}");
                        }
                    }
                }
                self.exchanges.release_if_idle(key);
            }
            _ => debug!("ignoring IM opcode {opcode:?}"),
        }
    }

    fn send_im_status(&mut self, key: &ExchangeKey, status: ImStatus, now: Instant) {
        let payload = StatusResponse { status }.encode();
        self.send_secured(
            key,
            PROTOCOL_INTERACTION_MODEL,
            ImOpcode::StatusResponse.as_byte(),
            payload,
            true,
            now,
        );
    }

    // =========================================================================
    // Outbound encoding
    // =========================================================================

    fn binding_for(&self, key: &ExchangeKey) -> Option<TransportBinding> {
        if key.session_id == 0 {
            self.exchange_bindings.get(key).copied()
        } else {
            self.sessions.lookup(key.session_id).map(|s| s.transport())
        }
    }

    fn send_unsecured(
        &mut self,
        key: &ExchangeKey,
        opcode: u8,
        payload: Vec<u8>,
        reliable: bool,
        now: Instant,
    ) {
        let Some(binding) = self.binding_for(key) else {
            warn!("no binding for exchange {key:?}");
            return;
        };
        let counter = self.unsecured_counter.next();
        let mut protocol =
            ProtocolHeader::new(PROTOCOL_SECURE_CHANNEL, opcode, key.exchange_id, key.initiator);
        protocol.reliability = reliable && binding.needs_mrp();
        if let Some(acked) = self.exchanges.take_ack_to_piggyback(key) {
            protocol.ack_counter = Some(acked);
        }
        let message = Message {
            header: MessageHeader::unsecured(counter),
            protocol,
            payload,
        };
        let frame = encode_plain(&message);
        if reliable && binding.needs_mrp() {
            self.exchanges.register_reliable(*key, counter, frame.clone(), now);
        }
        self.outbox.push((binding, frame));
    }

    fn send_standalone_ack(&mut self, key: &ExchangeKey, acked_counter: u32) {
        let Some(binding) = self.binding_for(key) else {
            return;
        };
        let opcode = SecureChannelOpcode::StandaloneAck.as_byte();
        if key.session_id == 0 {
            let counter = self.unsecured_counter.next();
            let mut protocol = ProtocolHeader::new(
                PROTOCOL_SECURE_CHANNEL,
                opcode,
                key.exchange_id,
                key.initiator,
            );
            protocol.ack_counter = Some(acked_counter);
            let message = Message {
                header: MessageHeader::unsecured(counter),
                protocol,
                payload: Vec::new(),
            };
            self.outbox.push((binding, encode_plain(&message)));
        } else {
            let frame = {
                let Ok(session) = self.sessions.lookup_active(key.session_id) else {
                    return;
                };
                let counter = session.next_outbound_counter();
                let mut protocol = ProtocolHeader::new(
                    PROTOCOL_SECURE_CHANNEL,
                    opcode,
                    key.exchange_id,
                    key.initiator,
                );
                protocol.ack_counter = Some(acked_counter);
                let message = Message {
                    header: MessageHeader {
                        session_id: session.peer_session_id(),
                        security_flags: crate::message::SecurityFlags::UNICAST,
                        counter,
                        source_node_id: None,
                        destination: crate::message::Destination::None,
                    },
                    protocol,
                    payload: Vec::new(),
                };
                let Ok(key_material) = session.encrypt_key() else {
                    return;
                };
                match encode_secured(&message, key_material, session.local_node_id()) {
                    Ok(frame) => frame,
                    Err(error) => {
                        warn!("cannot encode standalone ack: {error}");
                        return;
                    }
                }
            };
            self.outbox.push((binding, frame));
        }
        self.exchanges.release_if_idle(key);
    }

    fn send_secured(
        &mut self,
        key: &ExchangeKey,
        protocol_id: u16,
        opcode: u8,
        payload: Vec<u8>,
        reliable: bool,
        now: Instant,
    ) {
        let ack = self.exchanges.take_ack_to_piggyback(key);
        let (frame, binding, counter, needs_mrp) = {
            let Ok(session) = self.sessions.lookup_active(key.session_id) else {
                warn!("send on unknown session {}", key.session_id);
                return;
            };
            let binding = session.transport();
            let counter = session.next_outbound_counter();
            let mut protocol =
                ProtocolHeader::new(protocol_id, opcode, key.exchange_id, key.initiator);
            protocol.reliability = reliable && binding.needs_mrp();
            protocol.ack_counter = ack;
            let message = Message {
                header: MessageHeader {
                    session_id: session.peer_session_id(),
                    security_flags: crate::message::SecurityFlags::UNICAST,
                    counter,
                    source_node_id: None,
                    destination: crate::message::Destination::None,
                },
                protocol,
                payload,
            };
            let Ok(key_material) = session.encrypt_key() else {
                return;
            };
            let frame = match encode_secured(&message, key_material, session.local_node_id()) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!("cannot encode frame: {error}");
                    return;
                }
            };
            (frame, binding, counter, binding.needs_mrp())
        };
        if reliable && needs_mrp {
            self.exchanges.register_reliable(*key, counter, frame.clone(), now);
        }
        self.outbox.push((binding, frame));
    }
}

impl std::fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCore")
            .field("sessions", &self.sessions.len())
            .field("exchanges", &self.exchanges.len())
            .field("fabrics", &self.fabrics.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}
