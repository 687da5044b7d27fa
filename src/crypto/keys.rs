//! P-256 key material: ECDSA signing/verification and ECDH agreement.
//!
//! Matter wires raw 64-byte `r ‖ s` signatures; DER is accepted on ingest
//! because certificate signatures arrive DER-encoded.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use crate::core::{SecurityError, P256_PUBLIC_KEY_SIZE, P256_SIGNATURE_SIZE};

/// An ECDSA-P256 signing keypair (operational or CA key).
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self { signing: SigningKey::random(&mut OsRng) }
    }

    /// Load a keypair from a 32-byte private scalar.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self, SecurityError> {
        let signing = SigningKey::from_slice(bytes).map_err(|_| SecurityError::AuthFailed)?;
        Ok(Self { signing })
    }

    /// Uncompressed SEC1 public key (`0x04 ‖ X ‖ Y`).
    pub fn public_key_sec1(&self) -> [u8; P256_PUBLIC_KEY_SIZE] {
        let point = self.signing.verifying_key().to_encoded_point(false);
        let mut out = [0u8; P256_PUBLIC_KEY_SIZE];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Private scalar bytes (for credential storage hand-off).
    pub fn private_key_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.signing.to_bytes());
        out
    }

    /// ECDSA-SHA256 sign, returning the raw 64-byte `r ‖ s` form.
    pub fn sign_raw(&self, message: &[u8]) -> [u8; P256_SIGNATURE_SIZE] {
        let signature: Signature = self.signing.sign(message);
        let mut out = [0u8; P256_SIGNATURE_SIZE];
        out.copy_from_slice(&signature.to_bytes());
        out
    }

    /// ECDSA-SHA256 sign, DER-encoded (certificate signatures).
    pub fn sign_der(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing.sign(message);
        signature.to_der().as_bytes().to_vec()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Keypair(..)")
    }
}

/// Verify an ECDSA-SHA256 signature in either raw 64-byte or DER form.
///
/// All failure modes collapse to `AuthFailed`.
pub fn verify_signature(
    public_sec1: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SecurityError> {
    let key = VerifyingKey::from_sec1_bytes(public_sec1).map_err(|_| SecurityError::AuthFailed)?;
    let sig = if signature.len() == P256_SIGNATURE_SIZE {
        Signature::from_slice(signature).map_err(|_| SecurityError::AuthFailed)?
    } else {
        Signature::from_der(signature).map_err(|_| SecurityError::AuthFailed)?
    };
    key.verify(message, &sig).map_err(|_| SecurityError::AuthFailed)
}

/// An ECDH-P256 keypair for handshake key agreement.
pub struct EcdhKeypair {
    secret: SecretKey,
}

impl EcdhKeypair {
    /// Generate a fresh ephemeral keypair.
    pub fn generate() -> Self {
        Self { secret: SecretKey::random(&mut OsRng) }
    }

    /// Load from a 32-byte private scalar (deterministic tests).
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self, SecurityError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| SecurityError::AuthFailed)?;
        Ok(Self { secret })
    }

    /// Uncompressed SEC1 public key.
    pub fn public_key_sec1(&self) -> [u8; P256_PUBLIC_KEY_SIZE] {
        let point = self.secret.public_key().to_encoded_point(false);
        let mut out = [0u8; P256_PUBLIC_KEY_SIZE];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// ECDH shared secret (X coordinate) with a peer's SEC1 public key.
    pub fn shared_secret(&self, peer_public_sec1: &[u8]) -> Result<[u8; 32], SecurityError> {
        let peer = PublicKey::from_sec1_bytes(peer_public_sec1)
            .map_err(|_| SecurityError::AuthFailed)?;
        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        let mut out = [0u8; 32];
        out.copy_from_slice(shared.raw_secret_bytes());
        Ok(out)
    }
}

impl std::fmt::Debug for EcdhKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EcdhKeypair(..)")
    }
}

/// One-shot ECDH between a raw private scalar and a peer public key.
pub fn ecdh_shared_secret(
    private_bytes: &[u8],
    peer_public_sec1: &[u8],
) -> Result<[u8; 32], SecurityError> {
    EcdhKeypair::from_private_bytes(private_bytes)?.shared_secret(peer_public_sec1)
}
