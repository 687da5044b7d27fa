//! Exchange manager and Message Reliability Protocol.
//!
//! Guarantees at-most-once, in-order delivery per exchange over unreliable
//! transports: dedup, acks (piggybacked or standalone), and jittered
//! exponential retransmits. TCP- and BLE-bound sessions delegate reliability
//! to the transport, so their messages are never registered for retransmit.
//!
//! The manager is sans-I/O: the node actor feeds it inbound headers and
//! polls `next_deadline`/`due_*` to drive timers.

mod manager;

pub use manager::{
    ExchangeKey, ExchangeManager, InboundDisposition, RetransmitAction, DEFAULT_MAX_EXCHANGES,
};
