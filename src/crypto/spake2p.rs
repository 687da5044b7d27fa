//! SPAKE2+ over P-256 with Matter's fixed M and N points.
//!
//! Implements the draft-01 flow used by PASE: the device precomputes a
//! verifier `(w0, w1, L)` from the onboarding passcode, the commissioner
//! proves knowledge of the passcode, and both sides derive
//! `{Ke, Ka, KcA, KcB, cA, cB}` from the shared transcript.
//!
//! The transcript is
//! `SHA256(len‖context ‖ len‖idP ‖ len‖idV ‖ len‖M ‖ len‖N ‖ len‖pA ‖ len‖pB
//! ‖ len‖Z ‖ len‖V ‖ len‖w0)` with 8-byte little-endian length prefixes and
//! empty prover/verifier identities.

use crypto_bigint::{Encoding, NonZero, U640};
use p256::elliptic_curve::group::Group;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::elliptic_curve::PrimeField;
use p256::{AffinePoint, EncodedPoint, NonZeroScalar, ProjectivePoint, Scalar};
use rand::rngs::OsRng;

use crate::core::{HandshakeError, SPAKE_VERIFIER_MATERIAL_SIZE};
use crate::crypto::{hkdf_sha256, hmac_sha256, pbkdf2_sha256, sha256};

/// Matter/draft-01 point M, SEC1 compressed.
const M_BYTES: [u8; 33] = [
    0x02, 0x88, 0x6e, 0x2f, 0x97, 0xac, 0xe4, 0x6e, 0x55, 0xba, 0x9d, 0xd7, 0x24, 0x25, 0x79,
    0xf2, 0x99, 0x3b, 0x64, 0xe1, 0x6e, 0xf3, 0xdc, 0xab, 0x95, 0xaf, 0xd4, 0x97, 0x33, 0x3d,
    0x8f, 0xa1, 0x2f,
];

/// Matter/draft-01 point N, SEC1 compressed.
const N_BYTES: [u8; 33] = [
    0x03, 0xd8, 0xbb, 0xd6, 0xc6, 0x39, 0xc6, 0x29, 0x37, 0xb0, 0x4d, 0x99, 0x7f, 0x38, 0xc3,
    0x77, 0x07, 0x19, 0xc6, 0x29, 0xd7, 0x01, 0x4d, 0x49, 0xa2, 0x4b, 0x4f, 0x98, 0xba, 0xa1,
    0x29, 0x2b, 0x49,
];

/// P-256 group order, big-endian.
const ORDER_BYTES: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xbc, 0xe6, 0xfa, 0xad, 0xa7, 0x17, 0x9e, 0x84, 0xf3, 0xb9, 0xca, 0xc2, 0xfc, 0x63,
    0x25, 0x51,
];

/// Derived key map shared by prover and verifier after the exchange.
#[derive(Clone)]
pub struct PakeKeys {
    /// Session-key seed; PASE expands it into I2R/R2I/attestation keys.
    pub ke: [u8; 16],
    /// Confirmation-key seed.
    pub ka: [u8; 16],
    /// Prover confirmation key.
    pub kc_a: [u8; 16],
    /// Verifier confirmation key.
    pub kc_b: [u8; 16],
    /// Prover confirmation value (sent in Pake3).
    pub c_a: [u8; 32],
    /// Verifier confirmation value (sent in Pake2).
    pub c_b: [u8; 32],
}

impl std::fmt::Debug for PakeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PakeKeys(..)")
    }
}

/// Verifier material derived from the passcode.
///
/// The device stores `w0` and `L`; `w1` exists only on the side that knows
/// the passcode.
#[derive(Clone)]
pub struct VerifierData {
    /// First password scalar.
    pub w0: Scalar,
    /// Second password scalar.
    pub w1: Scalar,
    /// Registration record `L = w1·G`.
    pub l: ProjectivePoint,
}

/// In-flight prover state between `prover_start` and `prover_finish`.
pub struct ProverContext {
    x: Scalar,
    w0: Scalar,
    w1: Scalar,
    pa: [u8; 65],
}

fn fixed_point(bytes: &[u8]) -> ProjectivePoint {
    let encoded = EncodedPoint::from_bytes(bytes).unwrap_or_else(|_| unreachable!());
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .unwrap_or_else(|| unreachable!());
    ProjectivePoint::from(affine)
}

fn m_point() -> ProjectivePoint {
    fixed_point(&M_BYTES)
}

fn n_point() -> ProjectivePoint {
    fixed_point(&N_BYTES)
}

/// Reduce a 40-byte big-endian value modulo the group order.
fn scalar_from_wide(bytes: &[u8]) -> Scalar {
    let mut wide = [0u8; 80];
    wide[80 - bytes.len()..].copy_from_slice(bytes);
    let value = U640::from_be_slice(&wide);

    let mut order_wide = [0u8; 80];
    order_wide[48..].copy_from_slice(&ORDER_BYTES);
    let order = Option::from(NonZero::new(U640::from_be_slice(&order_wide)))
        .unwrap_or_else(|| unreachable!());

    let (_, reduced) = value.div_rem(&order);
    let reduced = reduced.to_be_bytes();
    let mut repr = [0u8; 32];
    repr.copy_from_slice(&reduced[48..]);
    Option::<Scalar>::from(Scalar::from_repr(repr.into())).unwrap_or_else(|| unreachable!())
}

fn encode_point(point: &ProjectivePoint) -> [u8; 65] {
    let encoded = point.to_affine().to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(encoded.as_bytes());
    out
}

fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint, HandshakeError> {
    // peers must wire the uncompressed SEC1 form
    if bytes.len() != 65 {
        return Err(HandshakeError::SessionEstablishmentFailed);
    }
    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or(HandshakeError::SessionEstablishmentFailed)?;
    let point = ProjectivePoint::from(affine);
    if bool::from(point.is_identity()) {
        return Err(HandshakeError::SessionEstablishmentFailed);
    }
    Ok(point)
}

/// Compute `(w0, w1, L)` from the passcode, salt, and PBKDF2 iteration count.
pub fn compute_verifier(passcode: u32, salt: &[u8], iterations: u32) -> VerifierData {
    let material = pbkdf2_sha256(
        &passcode.to_le_bytes(),
        salt,
        iterations,
        SPAKE_VERIFIER_MATERIAL_SIZE,
    );
    let w0 = scalar_from_wide(&material[..40]);
    let w1 = scalar_from_wide(&material[40..]);
    let l = ProjectivePoint::GENERATOR * w1;
    VerifierData { w0, w1, l }
}

/// Prover first flow: `pA = x·G + w0·M`.
pub fn prover_start(w0: Scalar, w1: Scalar) -> (Vec<u8>, ProverContext) {
    let x = *NonZeroScalar::random(&mut OsRng);
    prover_start_with_scalar(w0, w1, x)
}

fn prover_start_with_scalar(w0: Scalar, w1: Scalar, x: Scalar) -> (Vec<u8>, ProverContext) {
    let pa_point = ProjectivePoint::GENERATOR * x + m_point() * w0;
    let pa = encode_point(&pa_point);
    (pa.to_vec(), ProverContext { x, w0, w1, pa })
}

/// Verifier flow: consume `pA`, produce `pB = y·G + w0·N` and the key map.
pub fn verifier_respond(
    context: &[u8],
    pa: &[u8],
    w0: Scalar,
    l: &ProjectivePoint,
) -> Result<(Vec<u8>, PakeKeys), HandshakeError> {
    let y = *NonZeroScalar::random(&mut OsRng);
    verifier_respond_with_scalar(context, pa, w0, l, y)
}

fn verifier_respond_with_scalar(
    context: &[u8],
    pa: &[u8],
    w0: Scalar,
    l: &ProjectivePoint,
    y: Scalar,
) -> Result<(Vec<u8>, PakeKeys), HandshakeError> {
    let pa_point = decode_point(pa)?;
    let pb_point = ProjectivePoint::GENERATOR * y + n_point() * w0;
    let pb = encode_point(&pb_point);

    let z = (pa_point - m_point() * w0) * y;
    let v = *l * y;
    if bool::from(z.is_identity()) {
        return Err(HandshakeError::SessionEstablishmentFailed);
    }

    let mut pa_fixed = [0u8; 65];
    pa_fixed.copy_from_slice(pa);
    let keys = derive_keys(context, &pa_fixed, &pb, &z, &v, &w0);
    Ok((pb.to_vec(), keys))
}

/// Prover second flow: consume `pB`, derive the key map.
pub fn prover_finish(ctx: &ProverContext, context: &[u8], pb: &[u8]) -> Result<PakeKeys, HandshakeError> {
    let pb_point = decode_point(pb)?;
    let shared_base = pb_point - n_point() * ctx.w0;
    let z = shared_base * ctx.x;
    let v = shared_base * ctx.w1;
    if bool::from(z.is_identity()) {
        return Err(HandshakeError::SessionEstablishmentFailed);
    }

    let mut pb_fixed = [0u8; 65];
    pb_fixed.copy_from_slice(pb);
    Ok(derive_keys(context, &ctx.pa, &pb_fixed, &z, &v, &ctx.w0))
}

fn push_with_len(tt: &mut Vec<u8>, data: &[u8]) {
    tt.extend_from_slice(&(data.len() as u64).to_le_bytes());
    tt.extend_from_slice(data);
}

/// Assemble the draft-01 transcript TT.
///
/// Matter's profile runs with empty prover/verifier identities; the draft's
/// numbered test vectors use `"client"`/`"server"`, so the identities stay
/// parameters here.
// TODO: vendor draft-01 test vectors 1 and 4 as fixtures against this
// assembler once the draft text is importable.
#[allow(clippy::too_many_arguments)]
fn build_transcript(
    context: &[u8],
    id_prover: &[u8],
    id_verifier: &[u8],
    pa: &[u8],
    pb: &[u8],
    z: &[u8],
    v: &[u8],
    w0: &[u8],
) -> Vec<u8> {
    let mut tt = Vec::with_capacity(512);
    push_with_len(&mut tt, context);
    push_with_len(&mut tt, id_prover);
    push_with_len(&mut tt, id_verifier);
    push_with_len(&mut tt, &encode_point(&m_point()));
    push_with_len(&mut tt, &encode_point(&n_point()));
    push_with_len(&mut tt, pa);
    push_with_len(&mut tt, pb);
    push_with_len(&mut tt, z);
    push_with_len(&mut tt, v);
    push_with_len(&mut tt, w0);
    tt
}

fn derive_keys(
    context: &[u8],
    pa: &[u8; 65],
    pb: &[u8; 65],
    z: &ProjectivePoint,
    v: &ProjectivePoint,
    w0: &Scalar,
) -> PakeKeys {
    let tt = build_transcript(
        context,
        &[],
        &[],
        pa,
        pb,
        &encode_point(z),
        &encode_point(v),
        &w0.to_repr(),
    );

    let hash = sha256(&tt);
    let mut ka = [0u8; 16];
    let mut ke = [0u8; 16];
    ka.copy_from_slice(&hash[..16]);
    ke.copy_from_slice(&hash[16..]);

    let confirmation = hkdf_sha256(&[], &ka, b"ConfirmationKeys", 32);
    let mut kc_a = [0u8; 16];
    let mut kc_b = [0u8; 16];
    kc_a.copy_from_slice(&confirmation[..16]);
    kc_b.copy_from_slice(&confirmation[16..]);

    let c_a = hmac_sha256(&kc_a, pb);
    let c_b = hmac_sha256(&kc_b, pa);

    PakeKeys { ke, ka, kc_a, kc_b, c_a, c_b }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_from_u64(v: u64) -> Scalar {
        let mut repr = [0u8; 32];
        repr[24..].copy_from_slice(&v.to_be_bytes());
        Option::<Scalar>::from(Scalar::from_repr(repr.into())).unwrap()
    }

    #[test]
    fn test_verifier_registration_record() {
        let data = compute_verifier(20202021, b"SPAKE2P Key Salt", 1000);
        // L must be the registration record of w1
        assert_eq!(data.l, ProjectivePoint::GENERATOR * data.w1);
        assert_ne!(data.w0, data.w1);
    }

    #[test]
    fn test_verifier_deterministic() {
        let a = compute_verifier(20202021, b"salt", 1000);
        let b = compute_verifier(20202021, b"salt", 1000);
        assert_eq!(a.w0.to_repr(), b.w0.to_repr());
        assert_eq!(a.w1.to_repr(), b.w1.to_repr());
    }

    #[test]
    fn test_scalar_wide_reduction() {
        // 40 bytes of 0xFF is far above the order; reduction must land in range
        let s = scalar_from_wide(&[0xFF; 40]);
        let again = scalar_from_wide(&[0xFF; 40]);
        assert_eq!(s.to_repr(), again.to_repr());
        // a value below the order reduces to itself
        let small = scalar_from_wide(&[0x01; 32]);
        assert_eq!(small.to_repr().as_slice(), &[0x01; 32]);
    }

    #[test]
    fn test_transcript_layout() {
        // every transcript field is prefixed with its 8-byte little-endian
        // length, in the order: context, idProver, idVerifier, M, N, pA,
        // pB, Z, V, w0; the fixture spells the prefixes out byte by byte
        let context = [0xC7; 32];
        let id_prover = *b"client";
        let id_verifier = *b"server";
        let pa = [0xA1; 65];
        let pb = [0xB2; 65];
        let z = [0x2C; 65];
        let v = [0x5E; 65];
        let w0 = [0x07; 32];

        let mut expected = Vec::new();
        expected.extend_from_slice(&[32, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&context);
        expected.extend_from_slice(&[6, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&id_prover);
        expected.extend_from_slice(&[6, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&id_verifier);
        expected.extend_from_slice(&[65, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&encode_point(&m_point()));
        expected.extend_from_slice(&[65, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&encode_point(&n_point()));
        for field in [&pa[..], &pb[..], &z[..], &v[..]] {
            expected.extend_from_slice(&[65, 0, 0, 0, 0, 0, 0, 0]);
            expected.extend_from_slice(field);
        }
        expected.extend_from_slice(&[32, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&w0);

        assert_eq!(
            build_transcript(&context, &id_prover, &id_verifier, &pa, &pb, &z, &v, &w0),
            expected
        );

        // empty identities still emit their zero length prefixes
        let tt = build_transcript(&context, &[], &[], &pa, &pb, &z, &v, &w0);
        assert_eq!(&tt[40..48], &[0u8; 8]);
        assert_eq!(&tt[48..56], &[0u8; 8]);
    }

    #[test]
    fn test_fixed_points_decompress_consistently() {
        let m = encode_point(&m_point());
        let n = encode_point(&n_point());
        assert_eq!(m[0], 0x04);
        assert_eq!(n[0], 0x04);
        // decompression preserves the stored x coordinates
        assert_eq!(&m[1..33], &M_BYTES[1..]);
        assert_eq!(&n[1..33], &N_BYTES[1..]);
    }

    #[test]
    fn test_matching_passcode_agrees() {
        let context = sha256(b"test context");
        let data = compute_verifier(20202021, b"salt bytes here", 1000);

        let (pa, ctx) = prover_start(data.w0, data.w1);
        let (pb, verifier_keys) = verifier_respond(&context, &pa, data.w0, &data.l).unwrap();
        let prover_keys = prover_finish(&ctx, &context, &pb).unwrap();

        assert_eq!(prover_keys.ke, verifier_keys.ke);
        assert_eq!(prover_keys.c_a, verifier_keys.c_a);
        assert_eq!(prover_keys.c_b, verifier_keys.c_b);
    }

    #[test]
    fn test_deterministic_scalars_agree() {
        let context = sha256(b"fixed context");
        let data = compute_verifier(123456, b"another salt", 2000);
        let x = scalar_from_u64(0x1234_5678_9abc_def1);
        let y = scalar_from_u64(0x0fed_cba9_8765_4321);

        let (pa, ctx) = prover_start_with_scalar(data.w0, data.w1, x);
        let (pb, vk) =
            verifier_respond_with_scalar(&context, &pa, data.w0, &data.l, y).unwrap();
        let pk = prover_finish(&ctx, &context, &pb).unwrap();

        assert_eq!(pk.ke, vk.ke);
        assert_eq!(pk.ka, vk.ka);
        assert_eq!(pk.kc_a, vk.kc_a);
        assert_eq!(pk.kc_b, vk.kc_b);
        assert_eq!(pk.c_a, vk.c_a);
        assert_eq!(pk.c_b, vk.c_b);

        // reruns are bit-stable
        let (pa2, _) = prover_start_with_scalar(data.w0, data.w1, x);
        assert_eq!(pa, pa2);
    }

    #[test]
    fn test_wrong_passcode_diverges() {
        let context = sha256(b"ctx");
        let good = compute_verifier(20202021, b"salt", 1000);
        let bad = compute_verifier(20202022, b"salt", 1000);

        // prover uses the wrong passcode against the device's verifier
        let (pa, ctx) = prover_start(bad.w0, bad.w1);
        let (pb, verifier_keys) = verifier_respond(&context, &pa, good.w0, &good.l).unwrap();
        let prover_keys = prover_finish(&ctx, &context, &pb).unwrap();

        assert_ne!(prover_keys.c_a, verifier_keys.c_a);
        assert_ne!(prover_keys.ke, verifier_keys.ke);
    }

    #[test]
    fn test_invalid_point_rejected() {
        let context = sha256(b"ctx");
        let data = compute_verifier(1, b"s", 100);
        assert!(verifier_respond(&context, &[0u8; 65], data.w0, &data.l).is_err());
        assert!(verifier_respond(&context, &[0x04; 10], data.w0, &data.l).is_err());
    }
}
