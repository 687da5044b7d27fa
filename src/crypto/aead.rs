//! AES-128-CCM session framing.
//!
//! The 13-byte nonce is `security_flags(1) ‖ counter_le32(4) ‖ node_id_le64(8)`
//! where the node id is the sender's. The plaintext message header is passed
//! as AAD so a tampered header fails authentication.

use aes::Aes128;
use ccm::aead::{Aead, KeyInit, Payload};
use ccm::consts::{U13, U16};
use ccm::Ccm;
use zeroize::Zeroize;

use crate::core::{SecurityError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, SESSION_KEY_SIZE};

type Aes128Ccm = Ccm<Aes128, U16, U13>;

/// A 16-byte AES-128-CCM session key, zeroized on drop.
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Wrap a key slice; fails on wrong length.
    pub fn from_slice(key: &[u8]) -> Option<Self> {
        let key: [u8; SESSION_KEY_SIZE] = key.try_into().ok()?;
        Some(Self { key })
    }

    /// Raw key bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Build the 13-byte AEAD nonce.
///
/// `node_id` is the sender's: local for outbound frames, the peer's for
/// inbound frames.
pub fn build_nonce(security_flags: u8, counter: u32, node_id: u64) -> [u8; AEAD_NONCE_SIZE] {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    nonce[0] = security_flags;
    nonce[1..5].copy_from_slice(&counter.to_le_bytes());
    nonce[5..13].copy_from_slice(&node_id.to_le_bytes());
    nonce
}

/// Encrypt `plaintext`, returning ciphertext with the 16-byte tag appended.
pub fn encrypt(
    key: &SessionKey,
    nonce: &[u8; AEAD_NONCE_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, SecurityError> {
    let cipher = Aes128Ccm::new(key.as_bytes().into());
    cipher
        .encrypt(nonce.into(), Payload { msg: plaintext, aad })
        .map_err(|_| SecurityError::AuthFailed)
}

/// Decrypt `ciphertext` (tag appended).
///
/// Any mismatch in key, nonce, AAD, ciphertext, or tag yields `AuthFailed`
/// with no further detail.
pub fn decrypt(
    key: &SessionKey,
    nonce: &[u8; AEAD_NONCE_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, SecurityError> {
    if ciphertext.len() < AEAD_TAG_SIZE {
        return Err(SecurityError::AuthFailed);
    }
    let cipher = Aes128Ccm::new(key.as_bytes().into());
    cipher
        .decrypt(nonce.into(), Payload { msg: ciphertext, aad })
        .map_err(|_| SecurityError::AuthFailed)
}

/// Encrypt with a nonce built from the handshake's fixed 13-byte literal
/// (CASE Sigma2/Sigma3 use `"NCASE_Sigma2N"` / `"NCASE_Sigma3N"`).
pub fn encrypt_payload(
    key: &SessionKey,
    nonce_literal: &[u8; AEAD_NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, SecurityError> {
    encrypt(key, nonce_literal, &[], plaintext)
}

/// Counterpart of [`encrypt_payload`].
pub fn decrypt_payload(
    key: &SessionKey,
    nonce_literal: &[u8; AEAD_NONCE_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, SecurityError> {
    decrypt(key, nonce_literal, &[], ciphertext)
}
