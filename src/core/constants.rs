//! Protocol constants fixed by the Matter specification.
//!
//! These values are fixed by the protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// AES-128-CCM authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// AES-128-CCM nonce size.
pub const AEAD_NONCE_SIZE: usize = 13;

/// Symmetric session key size (AES-128).
pub const SESSION_KEY_SIZE: usize = 16;

/// SHA-256 hash output size.
pub const HASH_SIZE: usize = 32;

/// Uncompressed SEC1 P-256 public key size (`0x04 || X || Y`).
pub const P256_PUBLIC_KEY_SIZE: usize = 65;

/// Raw ECDSA-P256 signature size (`r || s`).
pub const P256_SIGNATURE_SIZE: usize = 64;

/// Attestation challenge size (third slice of the session key block).
pub const ATTESTATION_CHALLENGE_SIZE: usize = 16;

/// Identity protection key size.
pub const IPK_SIZE: usize = 16;

/// PBKDF2 output consumed by the SPAKE2+ verifier computation.
pub const SPAKE_VERIFIER_MATERIAL_SIZE: usize = 80;

// =============================================================================
// MESSAGE LAYER
// =============================================================================

/// Message format version carried in the plaintext header.
pub const MESSAGE_VERSION: u8 = 0;

/// Session id reserved for unsecured messages (handshake, standalone acks).
pub const UNSECURED_SESSION_ID: u16 = 0;

/// Highest allocatable local session id.
pub const MAX_SESSION_ID: u16 = 65534;

/// Replay window width in message-counter positions.
pub const REPLAY_WINDOW_SIZE: u32 = 32;

// =============================================================================
// PROTOCOL IDS
// =============================================================================

/// Secure Channel protocol id.
pub const PROTOCOL_SECURE_CHANNEL: u16 = 0x0000;

/// Interaction Model protocol id.
pub const PROTOCOL_INTERACTION_MODEL: u16 = 0x0001;

// =============================================================================
// MRP TIMING (Matter spec 4.11 defaults)
// =============================================================================

/// Base retransmission interval before backoff.
pub const MRP_BACKOFF_BASE: Duration = Duration::from_millis(300);

/// Jitter applied to each retransmission deadline (fraction of interval).
pub const MRP_BACKOFF_JITTER: f64 = 0.25;

/// Backoff multiplier per attempt.
pub const MRP_BACKOFF_MULTIPLIER: u32 = 2;

/// Retransmission attempts before the exchange times out.
pub const MRP_MAX_RETRIES: u32 = 5;

/// Window for piggybacking an ack on the next outbound message before a
/// standalone ack is emitted.
pub const MRP_STANDALONE_ACK_TIMEOUT: Duration = Duration::from_millis(200);

// =============================================================================
// HANDSHAKE
// =============================================================================

/// Wall-clock deadline for an in-flight PASE or CASE handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// HKDF info string for the session key block (both handshakes).
pub const SESSION_KEYS_INFO: &[u8] = b"SessionKeys";

/// Length of the derived session key block: I2R, R2I, attestation challenge.
pub const SESSION_KEY_BLOCK_SIZE: usize = 48;

// =============================================================================
// TRANSPORTS
// =============================================================================

/// Default Matter UDP/TCP port.
pub const DEFAULT_PORT: u16 = 5540;

/// TCP stream framing: little-endian length prefix size.
pub const TCP_LENGTH_PREFIX_SIZE: usize = 4;

/// Default BTP fragment size before MTU negotiation.
pub const BTP_DEFAULT_MTU: u16 = 247;

/// Default BTP receive window (fragments).
pub const BTP_DEFAULT_WINDOW: u8 = 6;

/// BTP protocol version implemented here.
pub const BTP_VERSION: u8 = 4;

// =============================================================================
// INTERACTION MODEL
// =============================================================================

/// `InteractionModelRevision` carried in every IM payload (context tag 0xFF).
pub const IM_REVISION: u8 = 11;

/// Attribute reports per ReportData chunk.
pub const MAX_REPORTS_PER_CHUNK: usize = 9;

/// Subscription engine tick period.
pub const SUBSCRIPTION_TICK: Duration = Duration::from_secs(1);

/// Cluster id of the Access Control cluster (writes demand administer).
pub const ACCESS_CONTROL_CLUSTER: u32 = 0x001F;
