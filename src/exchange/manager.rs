//! Exchange table and MRP bookkeeping.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;
use rand::Rng;

use crate::core::{
    MatterError, MRP_BACKOFF_BASE, MRP_BACKOFF_JITTER, MRP_BACKOFF_MULTIPLIER, MRP_MAX_RETRIES,
    MRP_STANDALONE_ACK_TIMEOUT,
};
use crate::message::ProtocolHeader;

/// Default cap on concurrent exchanges.
pub const DEFAULT_MAX_EXCHANGES: usize = 64;

/// Exchange identity: session, 16-bit exchange id, and whether the local
/// side initiated it. The initiator flag keeps our exchange 5 distinct from
/// the peer's exchange 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    /// Local session id carrying the exchange.
    pub session_id: u16,
    /// 16-bit exchange id.
    pub exchange_id: u16,
    /// True when the local side initiated the exchange.
    pub initiator: bool,
}

/// What the manager decided about an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDisposition {
    /// New message: deliver to the protocol handler.
    Deliver,
    /// Already seen: acknowledge again but do not redeliver.
    Duplicate,
}

/// A retransmit-queue event.
#[derive(Debug)]
pub enum RetransmitAction {
    /// Resend the stored frame.
    Resend {
        /// Exchange owning the frame.
        key: ExchangeKey,
        /// Encoded frame to put back on the wire.
        frame: Vec<u8>,
    },
    /// Retransmit budget exhausted; the exchange is closed.
    TimedOut {
        /// Exchange that gave up.
        key: ExchangeKey,
    },
}

#[derive(Debug)]
struct Outstanding {
    counter: u32,
    frame: Vec<u8>,
    attempts: u32,
    interval: Duration,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct Exchange {
    /// Highest counter delivered upstream; enforces in-order delivery.
    last_delivered: Option<u32>,
    /// Inbound reliable counter awaiting our ack.
    ack_pending: Option<(u32, Instant)>,
    /// Our reliable message awaiting the peer's ack.
    outstanding: Option<Outstanding>,
    /// Deadline armed by a TimedRequest for the next write/invoke.
    timed_deadline: Option<Instant>,
    /// Protocol and opcode of the last message seen (diagnostics).
    last_protocol: Option<(u16, u8)>,
}

impl Exchange {
    fn is_idle(&self) -> bool {
        self.ack_pending.is_none() && self.outstanding.is_none() && self.timed_deadline.is_none()
    }
}

/// The exchange manager.
#[derive(Debug)]
pub struct ExchangeManager {
    exchanges: HashMap<ExchangeKey, Exchange>,
    next_exchange_id: u16,
    max_exchanges: usize,
}

impl ExchangeManager {
    /// New manager.
    pub fn new() -> Self {
        Self {
            exchanges: HashMap::new(),
            next_exchange_id: 1,
            max_exchanges: DEFAULT_MAX_EXCHANGES,
        }
    }

    /// Override the exchange cap.
    pub fn with_max_exchanges(mut self, max: usize) -> Self {
        self.max_exchanges = max;
        self
    }

    /// Allocate a locally initiated exchange id (monotonic, wrapping).
    pub fn allocate_exchange_id(&mut self) -> u16 {
        let id = self.next_exchange_id;
        self.next_exchange_id = self.next_exchange_id.wrapping_add(1);
        if self.next_exchange_id == 0 {
            self.next_exchange_id = 1;
        }
        id
    }

    /// Process an inbound protocol header.
    ///
    /// Clears the retransmit slot when an ack is piggybacked, creates the
    /// exchange if the peer opened a new one, deduplicates, and schedules an
    /// ack when the sender requested reliability.
    pub fn on_inbound(
        &mut self,
        session_id: u16,
        header: &ProtocolHeader,
        counter: u32,
        now: Instant,
    ) -> Result<(InboundDisposition, ExchangeKey), MatterError> {
        let key = ExchangeKey {
            session_id,
            exchange_id: header.exchange_id,
            // a message from the exchange initiator lands on our responder
            // side, and vice versa
            initiator: !header.initiator,
        };

        if let Some(acked) = header.ack_counter {
            self.clear_outstanding(&key, acked);
        }

        if !self.exchanges.contains_key(&key) && self.exchanges.len() >= self.max_exchanges {
            return Err(MatterError::ResourceExhausted("exchange table full"));
        }
        let exchange = self.exchanges.entry(key).or_default();
        exchange.last_protocol = Some((header.protocol_id, header.opcode));

        let duplicate = match exchange.last_delivered {
            Some(last) => counter <= last,
            None => false,
        };

        if header.reliability {
            // piggyback for a while; due_standalone_acks fires otherwise
            exchange.ack_pending = Some((counter, now + MRP_STANDALONE_ACK_TIMEOUT));
        }

        if duplicate {
            debug!("exchange {key:?}: duplicate counter {counter}");
            return Ok((InboundDisposition::Duplicate, key));
        }
        exchange.last_delivered = Some(counter);
        Ok((InboundDisposition::Deliver, key))
    }

    /// Record an outbound reliable frame for retransmission.
    pub fn register_reliable(
        &mut self,
        key: ExchangeKey,
        counter: u32,
        frame: Vec<u8>,
        now: Instant,
    ) {
        let exchange = self.exchanges.entry(key).or_default();
        let interval = MRP_BACKOFF_BASE;
        exchange.outstanding = Some(Outstanding {
            counter,
            frame,
            attempts: 0,
            interval,
            deadline: now + jittered(interval),
        });
    }

    /// Take a pending inbound ack to piggyback on the next outbound message
    /// for this exchange.
    pub fn take_ack_to_piggyback(&mut self, key: &ExchangeKey) -> Option<u32> {
        let exchange = self.exchanges.get_mut(key)?;
        exchange.ack_pending.take().map(|(counter, _)| counter)
    }

    /// Pending ack counter without consuming it (duplicate re-acks).
    pub fn pending_ack(&self, key: &ExchangeKey) -> Option<u32> {
        self.exchanges.get(key)?.ack_pending.map(|(counter, _)| counter)
    }

    /// Acks whose piggyback window has expired; the caller must emit
    /// standalone acks for them.
    pub fn due_standalone_acks(&mut self, now: Instant) -> Vec<(ExchangeKey, u32)> {
        let mut due = Vec::new();
        for (key, exchange) in &mut self.exchanges {
            if let Some((counter, deadline)) = exchange.ack_pending {
                if deadline <= now {
                    exchange.ack_pending = None;
                    due.push((*key, counter));
                }
            }
        }
        due
    }

    /// Retransmit-queue events due at `now`.
    pub fn due_retransmits(&mut self, now: Instant) -> Vec<RetransmitAction> {
        let mut actions = Vec::new();
        let mut dead = Vec::new();
        for (key, exchange) in &mut self.exchanges {
            let Some(outstanding) = exchange.outstanding.as_mut() else {
                continue;
            };
            if outstanding.deadline > now {
                continue;
            }
            if outstanding.attempts >= MRP_MAX_RETRIES {
                debug!("exchange {key:?}: retransmit budget exhausted");
                exchange.outstanding = None;
                dead.push(*key);
                actions.push(RetransmitAction::TimedOut { key: *key });
                continue;
            }
            outstanding.attempts += 1;
            outstanding.interval *= MRP_BACKOFF_MULTIPLIER;
            outstanding.deadline = now + jittered(outstanding.interval);
            actions.push(RetransmitAction::Resend {
                key: *key,
                frame: outstanding.frame.clone(),
            });
        }
        for key in dead {
            self.release_if_idle(&key);
        }
        actions
    }

    /// Earliest deadline the caller must wake up for (acks + retransmits +
    /// timed windows).
    pub fn next_deadline(&self) -> Option<Instant> {
        let mut next: Option<Instant> = None;
        let mut consider = |deadline: Instant| {
            next = Some(match next {
                Some(current) if current <= deadline => current,
                _ => deadline,
            });
        };
        for exchange in self.exchanges.values() {
            if let Some((_, deadline)) = exchange.ack_pending {
                consider(deadline);
            }
            if let Some(outstanding) = &exchange.outstanding {
                consider(outstanding.deadline);
            }
        }
        next
    }

    /// Arm a timed-interaction window on an exchange.
    pub fn arm_timed(&mut self, key: ExchangeKey, timeout: Duration, now: Instant) {
        let exchange = self.exchanges.entry(key).or_default();
        exchange.timed_deadline = Some(now + timeout);
    }

    /// Consume the timed window; true when one was armed and still open.
    pub fn consume_timed(&mut self, key: &ExchangeKey, now: Instant) -> bool {
        let Some(exchange) = self.exchanges.get_mut(key) else {
            return false;
        };
        match exchange.timed_deadline.take() {
            Some(deadline) => deadline >= now,
            None => false,
        }
    }

    /// Drop an exchange if it carries no remaining obligations.
    pub fn release_if_idle(&mut self, key: &ExchangeKey) {
        if let Some(exchange) = self.exchanges.get(key) {
            if exchange.is_idle() {
                self.exchanges.remove(key);
            }
        }
    }

    /// Tear down every exchange on a session; returns how many were dropped.
    pub fn close_session(&mut self, session_id: u16) -> usize {
        let before = self.exchanges.len();
        self.exchanges.retain(|key, _| key.session_id != session_id);
        before - self.exchanges.len()
    }

    /// Number of live exchanges.
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    fn clear_outstanding(&mut self, key: &ExchangeKey, acked_counter: u32) {
        if let Some(exchange) = self.exchanges.get_mut(key) {
            let matches = exchange
                .outstanding
                .as_ref()
                .is_some_and(|o| o.counter == acked_counter);
            if matches {
                exchange.outstanding = None;
            }
        }
    }
}

impl Default for ExchangeManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply the MRP jitter to a backoff interval.
fn jittered(interval: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.0..MRP_BACKOFF_JITTER);
    interval.mul_f64(1.0 + jitter)
}
