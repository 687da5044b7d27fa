//! Cryptographic primitives for the Matter stack.
//!
//! Fixed suite, no negotiation: SHA-256 everywhere, HKDF/PBKDF2 key
//! derivation, AES-128-CCM framing, ECDSA/ECDH over P-256, and SPAKE2+ for
//! the commissioning handshake.

mod aead;
mod kdf;
mod keys;
pub mod spake2p;

pub use aead::{build_nonce, decrypt, decrypt_payload, encrypt, encrypt_payload, SessionKey};
pub use kdf::{hkdf_sha256, hmac_sha256, pbkdf2_sha256, sha256};
pub use keys::{ecdh_shared_secret, EcdhKeypair, Keypair, verify_signature};
