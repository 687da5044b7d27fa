//! CASE: certificate-authenticated session establishment.
//!
//! Initiator FSM: `idle → sigma1_sent → sigma3_sent → established|failed`.
//! Responder FSM: `idle → sigma2_sent → established|failed`. Peers
//! authenticate with their NOCs over an ephemeral P-256 ECDH; the IPK salts
//! every derivation so only fabric members can even address the device
//! (destination id).

use rand::RngCore;

use crate::cert::{parse_noc, verify_chain};
use crate::core::{
    CodecError, HandshakeError, ATTESTATION_CHALLENGE_SIZE, SESSION_KEYS_INFO,
    SESSION_KEY_BLOCK_SIZE, SESSION_KEY_SIZE,
};
use crate::crypto::{
    decrypt_payload, encrypt_payload, hkdf_sha256, sha256, verify_signature, EcdhKeypair,
    SessionKey,
};
use crate::fabric::{Fabric, FabricTable};
use crate::session::{AuthMode, SessionSecrets};
use crate::tlv::{decode as tlv_decode, encode as tlv_encode, TlvValue};

const SIGMA2_NONCE: &[u8; 13] = b"NCASE_Sigma2N";
const SIGMA3_NONCE: &[u8; 13] = b"NCASE_Sigma3N";
const SIGMA2_INFO: &[u8] = b"Sigma2";
const SIGMA3_INFO: &[u8] = b"Sigma3";

// Sigma1 tags.
const TAG_S1_RANDOM: u8 = 1;
const TAG_S1_SESSION_ID: u8 = 2;
const TAG_S1_DESTINATION_ID: u8 = 3;
const TAG_S1_EPH_PUB: u8 = 4;

// Sigma2 tags.
const TAG_S2_RANDOM: u8 = 1;
const TAG_S2_SESSION_ID: u8 = 2;
const TAG_S2_EPH_PUB: u8 = 3;
const TAG_S2_ENCRYPTED: u8 = 4;

// Sigma3 tags.
const TAG_S3_ENCRYPTED: u8 = 1;

// TBE (to-be-encrypted) tags.
const TAG_TBE_NOC: u8 = 1;
const TAG_TBE_ICAC: u8 = 2;
const TAG_TBE_SIGNATURE: u8 = 3;
const TAG_TBE_RESUMPTION_ID: u8 = 4;

// TBS (to-be-signed) tags.
const TAG_TBS_NOC: u8 = 1;
const TAG_TBS_ICAC: u8 = 2;
const TAG_TBS_SENDER_EPH: u8 = 3;
const TAG_TBS_RECEIVER_EPH: u8 = 4;

fn get_bytes<'a>(value: &'a TlvValue, tag: u8) -> Result<&'a [u8], HandshakeError> {
    value
        .field(tag)
        .and_then(TlvValue::as_bytes)
        .ok_or(HandshakeError::Codec(CodecError::InvalidMessage))
}

fn get_u16(value: &TlvValue, tag: u8) -> Result<u16, HandshakeError> {
    value
        .field(tag)
        .and_then(TlvValue::as_u64)
        .and_then(|v| u16::try_from(v).ok())
        .ok_or(HandshakeError::Codec(CodecError::InvalidMessage))
}

/// Signature input binding certificates to the ephemeral exchange.
fn encode_tbs(
    noc: &[u8],
    icac: Option<&[u8]>,
    sender_eph: &[u8],
    receiver_eph: &[u8],
) -> Vec<u8> {
    let mut fields = vec![(TAG_TBS_NOC, TlvValue::Bytes(noc.to_vec()))];
    if let Some(icac) = icac {
        fields.push((TAG_TBS_ICAC, TlvValue::Bytes(icac.to_vec())));
    }
    fields.push((TAG_TBS_SENDER_EPH, TlvValue::Bytes(sender_eph.to_vec())));
    fields.push((TAG_TBS_RECEIVER_EPH, TlvValue::Bytes(receiver_eph.to_vec())));
    tlv_encode(&TlvValue::Struct(fields))
}

fn derive_case_session_keys(
    fabric_ipk: &[u8],
    shared: &[u8],
    transcript: &[u8],
) -> ([u8; 16], [u8; 16], [u8; ATTESTATION_CHALLENGE_SIZE]) {
    let mut salt = fabric_ipk.to_vec();
    salt.extend_from_slice(&sha256(transcript));
    let block = hkdf_sha256(&salt, shared, SESSION_KEYS_INFO, SESSION_KEY_BLOCK_SIZE);
    let mut i2r = [0u8; SESSION_KEY_SIZE];
    let mut r2i = [0u8; SESSION_KEY_SIZE];
    let mut attestation = [0u8; ATTESTATION_CHALLENGE_SIZE];
    i2r.copy_from_slice(&block[..16]);
    r2i.copy_from_slice(&block[16..32]);
    attestation.copy_from_slice(&block[32..48]);
    (i2r, r2i, attestation)
}

/// Validate a peer's TBE contents: chain, fabric binding, TBS signature.
fn validate_peer_credentials(
    fabric: &Fabric,
    tbe: &TlvValue,
    sender_eph: &[u8],
    receiver_eph: &[u8],
) -> Result<u64, HandshakeError> {
    let noc = get_bytes(tbe, TAG_TBE_NOC)?;
    let icac = tbe.field(TAG_TBE_ICAC).and_then(TlvValue::as_bytes);
    let signature = get_bytes(tbe, TAG_TBE_SIGNATURE)?;

    let info = parse_noc(noc)?;
    if info.fabric_id != fabric.fabric_id {
        return Err(HandshakeError::SessionEstablishmentFailed);
    }
    verify_chain(noc, icac, &fabric.root_public_key)?;

    let tbs = encode_tbs(noc, icac, sender_eph, receiver_eph);
    verify_signature(&info.public_key, &tbs, signature)
        .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
    Ok(info.node_id)
}

/// Device-side (responder) CASE state machine.
pub struct CaseResponder {
    state: ResponderState,
    local_session_id: u16,
    peer_session_id: u16,
    fabric_index: u8,
    eph: Option<EcdhKeypair>,
    shared: [u8; 32],
    initiator_eph_pub: Vec<u8>,
    sigma1_payload: Vec<u8>,
    sigma2_payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponderState {
    Idle,
    Sigma2Sent,
    Established,
    Failed,
}

impl CaseResponder {
    /// New responder for a provisional session.
    pub fn new(local_session_id: u16) -> Self {
        Self {
            state: ResponderState::Idle,
            local_session_id,
            peer_session_id: 0,
            fabric_index: 0,
            eph: None,
            shared: [0; 32],
            initiator_eph_pub: Vec::new(),
            sigma1_payload: Vec::new(),
            sigma2_payload: Vec::new(),
        }
    }

    /// Handle Sigma1; returns the Sigma2 payload.
    pub fn on_sigma1(
        &mut self,
        fabrics: &FabricTable,
        payload: &[u8],
    ) -> Result<Vec<u8>, HandshakeError> {
        if self.state != ResponderState::Idle {
            return Err(self.fail_state());
        }
        let sigma1 = tlv_decode(payload).map_err(|e| self.fail(e.into()))?;
        let initiator_random = get_bytes(&sigma1, TAG_S1_RANDOM).map_err(|e| self.fail(e))?;
        let destination_id =
            get_bytes(&sigma1, TAG_S1_DESTINATION_ID).map_err(|e| self.fail(e))?;
        let initiator_eph_pub =
            get_bytes(&sigma1, TAG_S1_EPH_PUB).map_err(|e| self.fail(e))?.to_vec();
        let peer_session_id = get_u16(&sigma1, TAG_S1_SESSION_ID).map_err(|e| self.fail(e))?;

        let fabric = fabrics
            .by_destination_id(initiator_random, destination_id)
            .map_err(|e| self.fail(e))?;

        let eph = EcdhKeypair::generate();
        let responder_eph_pub = eph.public_key_sec1().to_vec();
        let shared = eph
            .shared_secret(&initiator_eph_pub)
            .map_err(|_| self.fail(HandshakeError::SessionEstablishmentFailed))?;

        // sign our credentials into TBEData2
        let tbs = encode_tbs(
            &fabric.noc,
            fabric.icac.as_deref(),
            &responder_eph_pub,
            &initiator_eph_pub,
        );
        let signature = fabric.operational_key().sign_raw(&tbs);
        let mut resumption_id = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut resumption_id);

        let mut tbe_fields = vec![(TAG_TBE_NOC, TlvValue::Bytes(fabric.noc.clone()))];
        if let Some(icac) = &fabric.icac {
            tbe_fields.push((TAG_TBE_ICAC, TlvValue::Bytes(icac.clone())));
        }
        tbe_fields.push((TAG_TBE_SIGNATURE, TlvValue::Bytes(signature.to_vec())));
        tbe_fields.push((TAG_TBE_RESUMPTION_ID, TlvValue::Bytes(resumption_id.to_vec())));
        let tbe = tlv_encode(&TlvValue::Struct(tbe_fields));

        let mut responder_random = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut responder_random);

        let mut salt = fabric.ipk.to_vec();
        salt.extend_from_slice(&responder_random);
        salt.extend_from_slice(&responder_eph_pub);
        salt.extend_from_slice(&sha256(payload));
        let s2k = hkdf_sha256(&salt, &shared, SIGMA2_INFO, SESSION_KEY_SIZE);
        let s2k = SessionKey::from_slice(&s2k)
            .ok_or(HandshakeError::SessionEstablishmentFailed)?;
        let encrypted2 = encrypt_payload(&s2k, SIGMA2_NONCE, &tbe)
            .map_err(|_| self.fail(HandshakeError::SessionEstablishmentFailed))?;

        let sigma2 = tlv_encode(&TlvValue::Struct(vec![
            (TAG_S2_RANDOM, TlvValue::Bytes(responder_random.to_vec())),
            (
                TAG_S2_SESSION_ID,
                TlvValue::Unsigned(u64::from(self.local_session_id)),
            ),
            (TAG_S2_EPH_PUB, TlvValue::Bytes(responder_eph_pub)),
            (TAG_S2_ENCRYPTED, TlvValue::Bytes(encrypted2)),
        ]));

        self.peer_session_id = peer_session_id;
        self.fabric_index = fabric.index;
        self.eph = Some(eph);
        self.shared = shared;
        self.initiator_eph_pub = initiator_eph_pub;
        self.sigma1_payload = payload.to_vec();
        self.sigma2_payload = sigma2.clone();
        self.state = ResponderState::Sigma2Sent;
        Ok(sigma2)
    }

    /// Handle Sigma3: validate the initiator and promote. The caller sends
    /// `StatusReport(success)` and commits the session.
    pub fn on_sigma3(
        &mut self,
        fabrics: &FabricTable,
        payload: &[u8],
    ) -> Result<SessionSecrets, HandshakeError> {
        if self.state != ResponderState::Sigma2Sent {
            return Err(self.fail_state());
        }
        let fabric = fabrics
            .by_index(self.fabric_index)
            .ok_or(HandshakeError::SessionEstablishmentFailed)?;
        let sigma3 = tlv_decode(payload).map_err(|e| self.fail(e.into()))?;
        let encrypted3 = get_bytes(&sigma3, TAG_S3_ENCRYPTED).map_err(|e| self.fail(e))?;

        let mut transcript = self.sigma1_payload.clone();
        transcript.extend_from_slice(&self.sigma2_payload);

        let mut salt = fabric.ipk.to_vec();
        salt.extend_from_slice(&sha256(&transcript));
        let s3k = hkdf_sha256(&salt, &self.shared, SIGMA3_INFO, SESSION_KEY_SIZE);
        let s3k = SessionKey::from_slice(&s3k)
            .ok_or(HandshakeError::SessionEstablishmentFailed)?;
        let tbe_bytes = decrypt_payload(&s3k, SIGMA3_NONCE, encrypted3)
            .map_err(|_| self.fail(HandshakeError::SessionEstablishmentFailed))?;
        let tbe = tlv_decode(&tbe_bytes).map_err(|e| self.fail(e.into()))?;

        let eph = self.eph.as_ref().ok_or(HandshakeError::SessionEstablishmentFailed)?;
        let responder_eph_pub = eph.public_key_sec1();
        let peer_node_id = validate_peer_credentials(
            fabric,
            &tbe,
            &self.initiator_eph_pub,
            &responder_eph_pub,
        )
        .map_err(|e| self.fail(e))?;

        transcript.extend_from_slice(payload);
        let (i2r, r2i, attestation) =
            derive_case_session_keys(&fabric.ipk, &self.shared, &transcript);

        self.state = ResponderState::Established;
        Ok(SessionSecrets {
            encrypt_key: SessionKey::from_bytes(r2i),
            decrypt_key: SessionKey::from_bytes(i2r),
            attestation_challenge: attestation,
            peer_session_id: self.peer_session_id,
            peer_node_id,
            fabric_index: fabric.index,
            auth_mode: AuthMode::Case,
        })
    }

    /// Whether the handshake has failed.
    pub fn is_failed(&self) -> bool {
        self.state == ResponderState::Failed
    }

    fn fail(&mut self, error: HandshakeError) -> HandshakeError {
        self.state = ResponderState::Failed;
        error
    }

    fn fail_state(&mut self) -> HandshakeError {
        let state = match self.state {
            ResponderState::Idle => "idle",
            ResponderState::Sigma2Sent => "sigma2_sent",
            ResponderState::Established => "established",
            ResponderState::Failed => "failed",
        };
        self.state = ResponderState::Failed;
        HandshakeError::UnexpectedMessage { state }
    }
}

/// Initiator-side CASE state machine.
pub struct CaseInitiator {
    state: InitiatorState,
    local_session_id: u16,
    peer_node_id: u64,
    peer_session_id: u16,
    eph: EcdhKeypair,
    shared: [u8; 32],
    sigma1_payload: Vec<u8>,
    sigma2_payload: Vec<u8>,
    sigma3_payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitiatorState {
    Idle,
    Sigma1Sent,
    Sigma3Sent,
    Established,
    Failed,
}

impl CaseInitiator {
    /// New initiator targeting a peer node on a fabric.
    pub fn new(local_session_id: u16, peer_node_id: u64) -> Self {
        Self {
            state: InitiatorState::Idle,
            local_session_id,
            peer_node_id,
            peer_session_id: 0,
            eph: EcdhKeypair::generate(),
            shared: [0; 32],
            sigma1_payload: Vec::new(),
            sigma2_payload: Vec::new(),
            sigma3_payload: Vec::new(),
        }
    }

    /// Produce the Sigma1 payload.
    pub fn start(&mut self, fabric: &Fabric) -> Result<Vec<u8>, HandshakeError> {
        if self.state != InitiatorState::Idle {
            return Err(self.fail_state());
        }
        let mut initiator_random = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut initiator_random);
        let destination_id =
            fabric.destination_id_for_node(&initiator_random, self.peer_node_id);

        let sigma1 = tlv_encode(&TlvValue::Struct(vec![
            (TAG_S1_RANDOM, TlvValue::Bytes(initiator_random.to_vec())),
            (
                TAG_S1_SESSION_ID,
                TlvValue::Unsigned(u64::from(self.local_session_id)),
            ),
            (TAG_S1_DESTINATION_ID, TlvValue::Bytes(destination_id.to_vec())),
            (TAG_S1_EPH_PUB, TlvValue::Bytes(self.eph.public_key_sec1().to_vec())),
        ]));
        self.sigma1_payload = sigma1.clone();
        self.state = InitiatorState::Sigma1Sent;
        Ok(sigma1)
    }

    /// Handle Sigma2: validate the responder; returns the Sigma3 payload.
    pub fn on_sigma2(
        &mut self,
        fabric: &Fabric,
        payload: &[u8],
    ) -> Result<Vec<u8>, HandshakeError> {
        if self.state != InitiatorState::Sigma1Sent {
            return Err(self.fail_state());
        }
        let sigma2 = tlv_decode(payload).map_err(|e| self.fail(e.into()))?;
        let responder_random = get_bytes(&sigma2, TAG_S2_RANDOM).map_err(|e| self.fail(e))?;
        let responder_eph_pub =
            get_bytes(&sigma2, TAG_S2_EPH_PUB).map_err(|e| self.fail(e))?.to_vec();
        let encrypted2 = get_bytes(&sigma2, TAG_S2_ENCRYPTED).map_err(|e| self.fail(e))?;
        self.peer_session_id = get_u16(&sigma2, TAG_S2_SESSION_ID).map_err(|e| self.fail(e))?;

        let shared = self
            .eph
            .shared_secret(&responder_eph_pub)
            .map_err(|_| self.fail(HandshakeError::SessionEstablishmentFailed))?;

        let mut salt = fabric.ipk.to_vec();
        salt.extend_from_slice(responder_random);
        salt.extend_from_slice(&responder_eph_pub);
        salt.extend_from_slice(&sha256(&self.sigma1_payload));
        let s2k = hkdf_sha256(&salt, &shared, SIGMA2_INFO, SESSION_KEY_SIZE);
        let s2k = SessionKey::from_slice(&s2k)
            .ok_or(HandshakeError::SessionEstablishmentFailed)?;
        let tbe_bytes = decrypt_payload(&s2k, SIGMA2_NONCE, encrypted2)
            .map_err(|_| self.fail(HandshakeError::SessionEstablishmentFailed))?;
        let tbe = tlv_decode(&tbe_bytes).map_err(|e| self.fail(e.into()))?;

        let initiator_eph_pub = self.eph.public_key_sec1();
        let responder_node = validate_peer_credentials(
            fabric,
            &tbe,
            &responder_eph_pub,
            &initiator_eph_pub,
        )
        .map_err(|e| self.fail(e))?;
        if responder_node != self.peer_node_id {
            return Err(self.fail(HandshakeError::SessionEstablishmentFailed));
        }

        // our own credentials into TBEData3
        let tbs = encode_tbs(
            &fabric.noc,
            fabric.icac.as_deref(),
            &initiator_eph_pub,
            &responder_eph_pub,
        );
        let signature = fabric.operational_key().sign_raw(&tbs);
        let mut tbe_fields = vec![(TAG_TBE_NOC, TlvValue::Bytes(fabric.noc.clone()))];
        if let Some(icac) = &fabric.icac {
            tbe_fields.push((TAG_TBE_ICAC, TlvValue::Bytes(icac.clone())));
        }
        tbe_fields.push((TAG_TBE_SIGNATURE, TlvValue::Bytes(signature.to_vec())));
        let tbe3 = tlv_encode(&TlvValue::Struct(tbe_fields));

        let mut transcript = self.sigma1_payload.clone();
        transcript.extend_from_slice(payload);
        let mut salt = fabric.ipk.to_vec();
        salt.extend_from_slice(&sha256(&transcript));
        let s3k = hkdf_sha256(&salt, &shared, SIGMA3_INFO, SESSION_KEY_SIZE);
        let s3k = SessionKey::from_slice(&s3k)
            .ok_or(HandshakeError::SessionEstablishmentFailed)?;
        let encrypted3 = encrypt_payload(&s3k, SIGMA3_NONCE, &tbe3)
            .map_err(|_| self.fail(HandshakeError::SessionEstablishmentFailed))?;

        let sigma3 = tlv_encode(&TlvValue::Struct(vec![(
            TAG_S3_ENCRYPTED,
            TlvValue::Bytes(encrypted3),
        )]));

        self.shared = shared;
        self.sigma2_payload = payload.to_vec();
        self.sigma3_payload = sigma3.clone();
        self.state = InitiatorState::Sigma3Sent;
        Ok(sigma3)
    }

    /// Handle the closing StatusReport; on success returns the secrets.
    pub fn on_status(
        &mut self,
        fabric: &Fabric,
        success: bool,
    ) -> Result<SessionSecrets, HandshakeError> {
        if self.state != InitiatorState::Sigma3Sent {
            return Err(self.fail_state());
        }
        if !success {
            return Err(self.fail(HandshakeError::SessionEstablishmentFailed));
        }

        let mut transcript = self.sigma1_payload.clone();
        transcript.extend_from_slice(&self.sigma2_payload);
        transcript.extend_from_slice(&self.sigma3_payload);
        let (i2r, r2i, attestation) =
            derive_case_session_keys(&fabric.ipk, &self.shared, &transcript);

        self.state = InitiatorState::Established;
        Ok(SessionSecrets {
            encrypt_key: SessionKey::from_bytes(i2r),
            decrypt_key: SessionKey::from_bytes(r2i),
            attestation_challenge: attestation,
            peer_session_id: self.peer_session_id,
            peer_node_id: self.peer_node_id,
            fabric_index: fabric.index,
            auth_mode: AuthMode::Case,
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
            InitiatorState::Sigma1Sent => "sigma1_sent",
            InitiatorState::Sigma3Sent => "sigma3_sent",
            InitiatorState::Established => "established",
            InitiatorState::Failed => "failed",
        };
        self.state = InitiatorState::Failed;
        HandshakeError::UnexpectedMessage { state }
    }
}
