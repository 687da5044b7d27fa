//! PASE: passcode-authenticated session establishment.
//!
//! Device (responder) FSM: `idle → pbkdf_sent → pake2_sent → established|failed`.
//! Commissioner (initiator) FSM: `idle → pbkdf_sent → pake1_sent → pake3_sent
//! → established|failed`. Message payloads are TLV structs; the SPAKE2+
//! transcript context is `SHA256("CHIP PAKE V1 Commissioning" ‖ request ‖
//! response)` over the two PBKDF-parameter payloads.

use rand::RngCore;

use crate::core::{
    HandshakeError, CodecError, ATTESTATION_CHALLENGE_SIZE, SESSION_KEYS_INFO,
    SESSION_KEY_BLOCK_SIZE, SESSION_KEY_SIZE,
};
use crate::crypto::spake2p::{
    compute_verifier, prover_finish, prover_start, verifier_respond, PakeKeys, ProverContext,
    VerifierData,
};
use crate::crypto::{hkdf_sha256, sha256, SessionKey};
use crate::session::{AuthMode, SessionSecrets};
use crate::tlv::{decode as tlv_decode, encode as tlv_encode, TlvValue};

const CONTEXT_PREFIX: &[u8] = b"CHIP PAKE V1 Commissioning";

// PBKDFParamRequest tags.
const TAG_INITIATOR_RANDOM: u8 = 1;
const TAG_INITIATOR_SESSION_ID: u8 = 2;
const TAG_PASSCODE_ID: u8 = 3;
const TAG_HAS_PBKDF_PARAMS: u8 = 4;

// PBKDFParamResponse tags.
const TAG_RESPONDER_RANDOM: u8 = 2;
const TAG_RESPONDER_SESSION_ID: u8 = 3;
const TAG_PBKDF_PARAMS: u8 = 4;
const TAG_PARAM_ITERATIONS: u8 = 1;
const TAG_PARAM_SALT: u8 = 2;

// Pake1/2/3 tags.
const TAG_PA: u8 = 1;
const TAG_PB: u8 = 1;
const TAG_CB: u8 = 2;
const TAG_CA: u8 = 1;

fn random_32() -> [u8; 32] {
    let mut out = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

fn get_bytes<'a>(value: &'a TlvValue, tag: u8) -> Result<&'a [u8], HandshakeError> {
    value
        .field(tag)
        .and_then(TlvValue::as_bytes)
        .ok_or(HandshakeError::Codec(CodecError::InvalidMessage))
}

fn get_u64(value: &TlvValue, tag: u8) -> Result<u64, HandshakeError> {
    value
        .field(tag)
        .and_then(TlvValue::as_u64)
        .ok_or(HandshakeError::Codec(CodecError::InvalidMessage))
}

/// Split the HKDF session-key block into I2R/R2I/attestation.
fn derive_session_keys(ke: &[u8]) -> ([u8; 16], [u8; 16], [u8; ATTESTATION_CHALLENGE_SIZE]) {
    let block = hkdf_sha256(&[], ke, SESSION_KEYS_INFO, SESSION_KEY_BLOCK_SIZE);
    let mut i2r = [0u8; SESSION_KEY_SIZE];
    let mut r2i = [0u8; SESSION_KEY_SIZE];
    let mut attestation = [0u8; ATTESTATION_CHALLENGE_SIZE];
    i2r.copy_from_slice(&block[..16]);
    r2i.copy_from_slice(&block[16..32]);
    attestation.copy_from_slice(&block[32..48]);
    (i2r, r2i, attestation)
}

/// Device-side (responder) PASE state machine.
pub struct PaseResponder {
    state: ResponderState,
    verifier: VerifierData,
    salt: Vec<u8>,
    iterations: u32,
    local_session_id: u16,
    peer_session_id: u16,
    context: Vec<u8>,
    keys: Option<PakeKeys>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponderState {
    Idle,
    PbkdfSent,
    Pake2Sent,
    Established,
    Failed,
}

impl PaseResponder {
    /// Precompute the verifier from the onboarding passcode.
    pub fn new(passcode: u32, salt: Vec<u8>, iterations: u32, local_session_id: u16) -> Self {
        let verifier = compute_verifier(passcode, &salt, iterations);
        Self {
            state: ResponderState::Idle,
            verifier,
            salt,
            iterations,
            local_session_id,
            peer_session_id: 0,
            context: Vec::new(),
            keys: None,
        }
    }

    /// Handle PBKDFParamRequest; returns the PBKDFParamResponse payload.
    pub fn on_pbkdf_param_request(&mut self, payload: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        if self.state != ResponderState::Idle {
            return Err(self.fail_state());
        }
        let request = tlv_decode(payload).map_err(|e| self.fail(e.into()))?;
        get_bytes(&request, TAG_INITIATOR_RANDOM).map_err(|e| self.fail(e))?;
        let peer_session = get_u64(&request, TAG_INITIATOR_SESSION_ID)
            .and_then(|v| u16::try_from(v).map_err(|_| CodecError::InvalidMessage.into()))
            .map_err(|e| self.fail(e))?;
        self.peer_session_id = peer_session;

        let response = tlv_encode(&TlvValue::Struct(vec![
            (TAG_INITIATOR_RANDOM, TlvValue::Bytes(
                get_bytes(&request, TAG_INITIATOR_RANDOM)?.to_vec(),
            )),
            (TAG_RESPONDER_RANDOM, TlvValue::Bytes(random_32().to_vec())),
            (
                TAG_RESPONDER_SESSION_ID,
                TlvValue::Unsigned(u64::from(self.local_session_id)),
            ),
            (
                TAG_PBKDF_PARAMS,
                TlvValue::Struct(vec![
                    (TAG_PARAM_ITERATIONS, TlvValue::Unsigned(u64::from(self.iterations))),
                    (TAG_PARAM_SALT, TlvValue::Bytes(self.salt.clone())),
                ]),
            ),
        ]));

        let mut seed = CONTEXT_PREFIX.to_vec();
        seed.extend_from_slice(payload);
        seed.extend_from_slice(&response);
        self.context = sha256(&seed).to_vec();

        self.state = ResponderState::PbkdfSent;
        Ok(response)
    }

    /// Handle Pake1; returns the Pake2 payload.
    pub fn on_pake1(&mut self, payload: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        if self.state != ResponderState::PbkdfSent {
            return Err(self.fail_state());
        }
        let message = tlv_decode(payload).map_err(|e| self.fail(e.into()))?;
        let pa = get_bytes(&message, TAG_PA).map_err(|e| self.fail(e))?;

        let (pb, keys) = verifier_respond(&self.context, pa, self.verifier.w0, &self.verifier.l)
            .map_err(|e| self.fail(e))?;
        let pake2 = tlv_encode(&TlvValue::Struct(vec![
            (TAG_PB, TlvValue::Bytes(pb)),
            (TAG_CB, TlvValue::Bytes(keys.c_b.to_vec())),
        ]));
        self.keys = Some(keys);
        self.state = ResponderState::Pake2Sent;
        Ok(pake2)
    }

    /// Handle Pake3: verify cA and promote. Returns the committed secrets;
    /// the caller sends `StatusReport(success)` and commits the session.
    pub fn on_pake3(&mut self, payload: &[u8]) -> Result<SessionSecrets, HandshakeError> {
        if self.state != ResponderState::Pake2Sent {
            return Err(self.fail_state());
        }
        let message = tlv_decode(payload).map_err(|e| self.fail(e.into()))?;
        let ca = get_bytes(&message, TAG_CA).map_err(|e| self.fail(e))?;
        let keys = self.keys.as_ref().ok_or(HandshakeError::SessionEstablishmentFailed)?;

        if ca != keys.c_a {
            return Err(self.fail(HandshakeError::ConfirmationFailed));
        }

        let (i2r, r2i, attestation) = derive_session_keys(&keys.ke);
        self.state = ResponderState::Established;
        Ok(SessionSecrets {
            // responder encrypts R2I, decrypts I2R
            encrypt_key: SessionKey::from_bytes(r2i),
            decrypt_key: SessionKey::from_bytes(i2r),
            attestation_challenge: attestation,
            peer_session_id: self.peer_session_id,
            peer_node_id: 0,
            fabric_index: 0,
            auth_mode: AuthMode::Pase,
        })
    }

    /// Whether the handshake has failed.
    pub fn is_failed(&self) -> bool {
        self.state == ResponderState::Failed
    }

    /// Whether the handshake completed.
    pub fn is_established(&self) -> bool {
        self.state == ResponderState::Established
    }

    fn fail(&mut self, error: HandshakeError) -> HandshakeError {
        self.state = ResponderState::Failed;
        error
    }

    fn fail_state(&mut self) -> HandshakeError {
        let state = match self.state {
            ResponderState::Idle => "idle",
            ResponderState::PbkdfSent => "pbkdf_sent",
            ResponderState::Pake2Sent => "pake2_sent",
            ResponderState::Established => "established",
            ResponderState::Failed => "failed",
        };
        self.state = ResponderState::Failed;
        HandshakeError::UnexpectedMessage { state }
    }
}

/// Commissioner-side (initiator) PASE state machine.
pub struct PaseInitiator {
    state: InitiatorState,
    passcode: u32,
    local_session_id: u16,
    peer_session_id: u16,
    request_payload: Vec<u8>,
    prover: Option<ProverContext>,
    context: Vec<u8>,
    keys: Option<PakeKeys>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitiatorState {
    Idle,
    PbkdfSent,
    Pake1Sent,
    Pake3Sent,
    Established,
    Failed,
}

impl PaseInitiator {
    /// New initiator for a passcode.
    pub fn new(passcode: u32, local_session_id: u16) -> Self {
        Self {
            state: InitiatorState::Idle,
            passcode,
            local_session_id,
            peer_session_id: 0,
            request_payload: Vec::new(),
            prover: None,
            context: Vec::new(),
            keys: None,
        }
    }

    /// Produce the PBKDFParamRequest payload.
    pub fn start(&mut self) -> Result<Vec<u8>, HandshakeError> {
        if self.state != InitiatorState::Idle {
            return Err(self.fail_state());
        }
        let request = tlv_encode(&TlvValue::Struct(vec![
            (TAG_INITIATOR_RANDOM, TlvValue::Bytes(random_32().to_vec())),
            (
                TAG_INITIATOR_SESSION_ID,
                TlvValue::Unsigned(u64::from(self.local_session_id)),
            ),
            (TAG_PASSCODE_ID, TlvValue::Unsigned(0)),
            (TAG_HAS_PBKDF_PARAMS, TlvValue::Bool(false)),
        ]));
        self.request_payload = request.clone();
        self.state = InitiatorState::PbkdfSent;
        Ok(request)
    }

    /// Handle PBKDFParamResponse; returns the Pake1 payload.
    pub fn on_pbkdf_param_response(&mut self, payload: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        if self.state != InitiatorState::PbkdfSent {
            return Err(self.fail_state());
        }
        let response = tlv_decode(payload).map_err(|e| self.fail(e.into()))?;
        let iterations = response
            .path(&[TAG_PBKDF_PARAMS, TAG_PARAM_ITERATIONS])
            .and_then(TlvValue::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| self.fail(CodecError::InvalidMessage.into()))?;
        let salt = response
            .path(&[TAG_PBKDF_PARAMS, TAG_PARAM_SALT])
            .and_then(TlvValue::as_bytes)
            .ok_or_else(|| self.fail(CodecError::InvalidMessage.into()))?
            .to_vec();
        let peer_session = get_u64(&response, TAG_RESPONDER_SESSION_ID)
            .and_then(|v| u16::try_from(v).map_err(|_| CodecError::InvalidMessage.into()))
            .map_err(|e| self.fail(e))?;
        self.peer_session_id = peer_session;

        let mut seed = CONTEXT_PREFIX.to_vec();
        seed.extend_from_slice(&self.request_payload);
        seed.extend_from_slice(payload);
        self.context = sha256(&seed).to_vec();

        let verifier = compute_verifier(self.passcode, &salt, iterations);
        let (pa, prover) = prover_start(verifier.w0, verifier.w1);
        self.prover = Some(prover);

        let pake1 = tlv_encode(&TlvValue::Struct(vec![(TAG_PA, TlvValue::Bytes(pa))]));
        self.state = InitiatorState::Pake1Sent;
        Ok(pake1)
    }

    /// Handle Pake2: verify cB; returns the Pake3 payload.
    pub fn on_pake2(&mut self, payload: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        if self.state != InitiatorState::Pake1Sent {
            return Err(self.fail_state());
        }
        let message = tlv_decode(payload).map_err(|e| self.fail(e.into()))?;
        let pb = get_bytes(&message, TAG_PB).map_err(|e| self.fail(e))?.to_vec();
        let cb = get_bytes(&message, TAG_CB).map_err(|e| self.fail(e))?.to_vec();

        let prover = self.prover.take().ok_or(HandshakeError::SessionEstablishmentFailed)?;
        let keys = prover_finish(&prover, &self.context, &pb).map_err(|e| self.fail(e))?;

        if cb != keys.c_b {
            return Err(self.fail(HandshakeError::ConfirmationFailed));
        }

        let pake3 =
            tlv_encode(&TlvValue::Struct(vec![(TAG_CA, TlvValue::Bytes(keys.c_a.to_vec()))]));
        self.keys = Some(keys);
        self.state = InitiatorState::Pake3Sent;
        Ok(pake3)
    }

    /// Handle the closing StatusReport; on success returns the secrets.
    pub fn on_status(&mut self, success: bool) -> Result<SessionSecrets, HandshakeError> {
        if self.state != InitiatorState::Pake3Sent {
            return Err(self.fail_state());
        }
        if !success {
            return Err(self.fail(HandshakeError::SessionEstablishmentFailed));
        }
        let keys = self.keys.as_ref().ok_or(HandshakeError::SessionEstablishmentFailed)?;
        let (i2r, r2i, attestation) = derive_session_keys(&keys.ke);
        self.state = InitiatorState::Established;
        Ok(SessionSecrets {
            // initiator encrypts I2R, decrypts R2I
            encrypt_key: SessionKey::from_bytes(i2r),
            decrypt_key: SessionKey::from_bytes(r2i),
            attestation_challenge: attestation,
            peer_session_id: self.peer_session_id,
            peer_node_id: 0,
            fabric_index: 0,
            auth_mode: AuthMode::Pase,
        })
    }

    /// Whether the handshake has failed.
    pub fn is_failed(&self) -> bool {
        self.state == InitiatorState::Failed
    }

    fn fail(&mut self, error: HandshakeError) -> HandshakeError {
        self.state = InitiatorState::Failed;
        error
    }

    fn fail_state(&mut self) -> HandshakeError {
        let state = match self.state {
            InitiatorState::Idle => "idle",
            InitiatorState::PbkdfSent => "pbkdf_sent",
            InitiatorState::Pake1Sent => "pake1_sent",
            InitiatorState::Pake3Sent => "pake3_sent",
            InitiatorState::Established => "established",
            InitiatorState::Failed => "failed",
        };
        self.state = InitiatorState::Failed;
        HandshakeError::UnexpectedMessage { state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSCODE: u32 = 20202021;
    const ITERATIONS: u32 = 1000;

    fn run_to_pake2(
        device: &mut PaseResponder,
        commissioner: &mut PaseInitiator,
    ) -> Result<Vec<u8>, HandshakeError> {
        let request = commissioner.start().unwrap();
        let response = device.on_pbkdf_param_request(&request).unwrap();
        let pake1 = commissioner.on_pbkdf_param_response(&response).unwrap();
        let pake2 = device.on_pake1(&pake1).unwrap();
        commissioner.on_pake2(&pake2)
    }

    #[test]
    fn test_pase_round_trip_derives_matching_keys() {
        let salt = random_32().to_vec();
        let mut device = PaseResponder::new(PASSCODE, salt, ITERATIONS, 1);
        let mut commissioner = PaseInitiator::new(PASSCODE, 2);

        let pake3 = run_to_pake2(&mut device, &mut commissioner).unwrap();
        let device_secrets = device.on_pake3(&pake3).unwrap();
        let commissioner_secrets = commissioner.on_status(true).unwrap();

        assert!(device.is_established());
        assert_eq!(
            device_secrets.encrypt_key.as_bytes(),
            commissioner_secrets.decrypt_key.as_bytes()
        );
        assert_eq!(
            device_secrets.decrypt_key.as_bytes(),
            commissioner_secrets.encrypt_key.as_bytes()
        );
        assert_eq!(
            device_secrets.attestation_challenge,
            commissioner_secrets.attestation_challenge
        );
        assert_eq!(device_secrets.encrypt_key.as_bytes().len(), 16);

        // session ids crossed over
        assert_eq!(device_secrets.peer_session_id, 2);
        assert_eq!(commissioner_secrets.peer_session_id, 1);
    }

    #[test]
    fn test_mismatched_passcode_fails_at_cb() {
        let salt = random_32().to_vec();
        let mut device = PaseResponder::new(PASSCODE, salt, ITERATIONS, 1);
        let mut commissioner = PaseInitiator::new(PASSCODE + 1, 2);

        let result = run_to_pake2(&mut device, &mut commissioner);
        assert_eq!(result.unwrap_err(), HandshakeError::ConfirmationFailed);
        assert!(commissioner.is_failed());
    }

    #[test]
    fn test_tampered_ca_fails_on_device() {
        let salt = random_32().to_vec();
        let mut device = PaseResponder::new(PASSCODE, salt, ITERATIONS, 1);
        let mut commissioner = PaseInitiator::new(PASSCODE, 2);

        let pake3 = run_to_pake2(&mut device, &mut commissioner).unwrap();
        let mut bad = tlv_decode(&pake3).unwrap();
        if let TlvValue::Struct(fields) = &mut bad {
            if let TlvValue::Bytes(ca) = &mut fields[0].1 {
                ca[0] ^= 0xFF;
            }
        }
        let result = device.on_pake3(&tlv_encode(&bad));
        assert_eq!(result.unwrap_err(), HandshakeError::ConfirmationFailed);
        assert!(device.is_failed());
    }

    #[test]
    fn test_out_of_order_message_fails() {
        let mut device = PaseResponder::new(PASSCODE, vec![0; 32], ITERATIONS, 1);
        let result = device.on_pake1(&[0x15, 0x18]);
        assert!(matches!(
            result.unwrap_err(),
            HandshakeError::UnexpectedMessage { state: "idle" }
        ));
        assert!(device.is_failed());
    }

    #[test]
    fn test_malformed_payload_fails() {
        let mut device = PaseResponder::new(PASSCODE, vec![0; 32], ITERATIONS, 1);
        assert!(device.on_pbkdf_param_request(&[0xFF, 0x00]).is_err());
        assert!(device.is_failed());
    }
}
