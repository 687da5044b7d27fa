//! In-test X.509 issuance so handshake tests run against real DER chains.

use std::time::Duration;

use const_oid::db::rfc5912::{ECDSA_WITH_SHA_256, ID_EC_PUBLIC_KEY, SECP_256_R_1};
use const_oid::ObjectIdentifier;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::der::asn1::{BitString, SetOfVec, UtcTime, Utf8StringRef};
use x509_cert::der::{Any, Encode};
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use x509_cert::certificate::{Certificate, TbsCertificate, Version};

use crate::crypto::Keypair;

use super::{OID_MATTER_FABRIC_ID, OID_MATTER_NODE_ID};

/// Matter DN attribute: root CA id.
const OID_MATTER_RCAC_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.4");

/// Matter DN attribute: intermediate CA id.
const OID_MATTER_ICAC_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.3");

fn hex_name(fields: &[(ObjectIdentifier, u64)]) -> RdnSequence {
    let mut rdns = Vec::new();
    for (oid, value) in fields {
        let text = format!("{value:016X}");
        let atv = AttributeTypeAndValue {
            oid: *oid,
            value: Any::encode_from(&Utf8StringRef::new(&text).unwrap()).unwrap(),
        };
        let mut set = SetOfVec::new();
        set.insert(atv).unwrap();
        rdns.push(RelativeDistinguishedName(set));
    }
    RdnSequence(rdns)
}

fn ec_spki(public_sec1: &[u8]) -> SubjectPublicKeyInfoOwned {
    SubjectPublicKeyInfoOwned {
        algorithm: AlgorithmIdentifierOwned {
            oid: ID_EC_PUBLIC_KEY,
            parameters: Some(Any::encode_from(&SECP_256_R_1).unwrap()),
        },
        subject_public_key: BitString::from_bytes(public_sec1).unwrap(),
    }
}

fn validity() -> Validity {
    Validity {
        not_before: Time::UtcTime(
            UtcTime::from_unix_duration(Duration::from_secs(1_600_000_000)).unwrap(),
        ),
        not_after: Time::UtcTime(
            UtcTime::from_unix_duration(Duration::from_secs(2_400_000_000)).unwrap(),
        ),
    }
}

fn issue(
    signer: &Keypair,
    issuer: RdnSequence,
    subject: RdnSequence,
    subject_public_sec1: &[u8],
    serial: u8,
) -> Vec<u8> {
    let algorithm = AlgorithmIdentifierOwned { oid: ECDSA_WITH_SHA_256, parameters: None };
    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[serial]).unwrap(),
        signature: algorithm.clone(),
        issuer,
        validity: validity(),
        subject,
        subject_public_key_info: ec_spki(subject_public_sec1),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    let tbs_der = tbs.to_der().unwrap();
    let signature = signer.sign_der(&tbs_der);
    let certificate = Certificate {
        tbs_certificate: tbs,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&signature).unwrap(),
    };
    certificate.to_der().unwrap()
}

/// Issue a NOC signed by an arbitrary key (for ICAC chains).
pub fn issue_noc_signed_by(
    signer: &Keypair,
    node_id: u64,
    fabric_id: u64,
    subject_public_sec1: &[u8],
) -> Vec<u8> {
    issue(
        signer,
        hex_name(&[(OID_MATTER_ICAC_ID, 0x1111)]),
        hex_name(&[(OID_MATTER_NODE_ID, node_id), (OID_MATTER_FABRIC_ID, fabric_id)]),
        subject_public_sec1,
        3,
    )
}

/// A root CA for tests.
pub struct TestCa {
    root: Keypair,
}

impl TestCa {
    /// Fresh CA with a random root key.
    pub fn new() -> Self {
        Self { root: Keypair::generate() }
    }

    /// Root public key (SEC1 uncompressed).
    pub fn root_public_key(&self) -> [u8; 65] {
        self.root.public_key_sec1()
    }

    /// Issue a NOC directly under the root.
    pub fn issue_noc(&self, node_id: u64, fabric_id: u64, subject_public_sec1: &[u8]) -> Vec<u8> {
        issue(
            &self.root,
            hex_name(&[(OID_MATTER_RCAC_ID, 0xCACA)]),
            hex_name(&[(OID_MATTER_NODE_ID, node_id), (OID_MATTER_FABRIC_ID, fabric_id)]),
            subject_public_sec1,
            1,
        )
    }

    /// Issue an ICAC under the root.
    pub fn issue_icac(&self, icac_id: u64, subject_public_sec1: &[u8]) -> Vec<u8> {
        issue(
            &self.root,
            hex_name(&[(OID_MATTER_RCAC_ID, 0xCACA)]),
            hex_name(&[(OID_MATTER_ICAC_ID, icac_id)]),
            subject_public_sec1,
            2,
        )
    }
}
