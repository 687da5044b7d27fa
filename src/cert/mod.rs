//! Matter operational certificate handling.
//!
//! A deliberately narrow X.509 parser: it extracts only the Matter node id
//! (OID 1.3.6.1.4.1.37244.1.1), fabric id (…1.5), and the SPKI public key,
//! and verifies ECDSA-SHA256 chain signatures. Everything else in a
//! certificate is ignored; anything malformed is rejected. Only DER X.509 is
//! accepted; there is no simplified test-only certificate form.

#[cfg(test)]
pub(crate) mod testutil;

use const_oid::ObjectIdentifier;
use x509_cert::der::asn1::Utf8StringRef;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use crate::core::HandshakeError;
use crate::crypto::verify_signature;

/// Matter DN attribute: node id as 16 uppercase hex chars.
pub const OID_MATTER_NODE_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.1");

/// Matter DN attribute: fabric id as 16 uppercase hex chars.
pub const OID_MATTER_FABRIC_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.5");

/// The identity a NOC binds: node, fabric, and operational public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NocInfo {
    /// Operational node id.
    pub node_id: u64,
    /// Fabric id.
    pub fabric_id: u64,
    /// SEC1 uncompressed operational public key.
    pub public_key: Vec<u8>,
}

fn subject_hex_field(cert: &Certificate, oid: ObjectIdentifier) -> Option<u64> {
    for rdn in cert.tbs_certificate.subject.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid != oid {
                continue;
            }
            let text = atv.value.decode_as::<Utf8StringRef<'_>>().ok()?;
            return u64::from_str_radix(text.as_str(), 16).ok();
        }
    }
    None
}

fn public_key_of(cert: &Certificate) -> Result<Vec<u8>, HandshakeError> {
    cert.tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .as_bytes()
        .map(<[u8]>::to_vec)
        .ok_or(HandshakeError::SessionEstablishmentFailed)
}

/// Parse a NOC, extracting node id, fabric id, and the operational key.
pub fn parse_noc(der: &[u8]) -> Result<NocInfo, HandshakeError> {
    let cert =
        Certificate::from_der(der).map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
    let node_id = subject_hex_field(&cert, OID_MATTER_NODE_ID)
        .ok_or(HandshakeError::SessionEstablishmentFailed)?;
    let fabric_id = subject_hex_field(&cert, OID_MATTER_FABRIC_ID)
        .ok_or(HandshakeError::SessionEstablishmentFailed)?;
    let public_key = public_key_of(&cert)?;
    Ok(NocInfo { node_id, fabric_id, public_key })
}

/// Verify one certificate's signature against an issuer public key.
fn verify_issued_by(cert_der: &[u8], issuer_public: &[u8]) -> Result<(), HandshakeError> {
    let cert = Certificate::from_der(cert_der)
        .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or(HandshakeError::SessionEstablishmentFailed)?;
    verify_signature(issuer_public, &tbs, signature)
        .map_err(|_| HandshakeError::SessionEstablishmentFailed)
}

/// Verify that a NOC (optionally through an ICAC) chains to a known root
/// public key.
pub fn verify_chain(
    noc_der: &[u8],
    icac_der: Option<&[u8]>,
    root_public_key: &[u8],
) -> Result<(), HandshakeError> {
    match icac_der {
        Some(icac) => {
            verify_issued_by(icac, root_public_key)?;
            let icac_cert = Certificate::from_der(icac)
                .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
            let icac_key = public_key_of(&icac_cert)?;
            verify_issued_by(noc_der, &icac_key)
        }
        None => verify_issued_by(noc_der, root_public_key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn test_parse_noc_extracts_identity() {
        let ca = testutil::TestCa::new();
        let op_key = Keypair::generate();
        let noc = ca.issue_noc(0xDEAD00000001, 0x2906, &op_key.public_key_sec1());

        let info = parse_noc(&noc).unwrap();
        assert_eq!(info.node_id, 0xDEAD00000001);
        assert_eq!(info.fabric_id, 0x2906);
        assert_eq!(info.public_key, op_key.public_key_sec1().to_vec());
    }

    #[test]
    fn test_chain_verifies_against_root() {
        let ca = testutil::TestCa::new();
        let op_key = Keypair::generate();
        let noc = ca.issue_noc(1, 1, &op_key.public_key_sec1());
        verify_chain(&noc, None, &ca.root_public_key()).unwrap();
    }

    #[test]
    fn test_chain_rejects_wrong_root() {
        let ca = testutil::TestCa::new();
        let other = testutil::TestCa::new();
        let op_key = Keypair::generate();
        let noc = ca.issue_noc(1, 1, &op_key.public_key_sec1());
        assert!(verify_chain(&noc, None, &other.root_public_key()).is_err());
    }

    #[test]
    fn test_chain_via_icac() {
        let ca = testutil::TestCa::new();
        let intermediate = Keypair::generate();
        let icac = ca.issue_icac(0x1111, &intermediate.public_key_sec1());
        let op_key = Keypair::generate();
        let noc = testutil::issue_noc_signed_by(
            &intermediate,
            2,
            0x2906,
            &op_key.public_key_sec1(),
        );
        verify_chain(&noc, Some(&icac), &ca.root_public_key()).unwrap();
        // NOC signed by the intermediate does not verify directly against root
        assert!(verify_chain(&noc, None, &ca.root_public_key()).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_noc(&[0x30, 0x03, 0x01, 0x01, 0x00]).is_err());
        assert!(parse_noc(b"not a certificate").is_err());
    }
}
