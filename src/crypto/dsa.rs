//! DSA-SHA1 signatures over the overlay's fixed 1024-bit group.
//!
//! Router identities carry a 128-byte DSA public value; the group
//! parameters (p, q, g) are network-wide constants, so only y travels
//! in the identity. Signatures are the raw 40-byte `r || s` form, each
//! half big-endian and left-padded to 20 bytes.

use super::CryptoError;
use dsa::{Components, Signature, VerifyingKey};
pub use dsa::SigningKey;
use num_bigint_dig::BigUint;
use rand::RngCore;
use sha1::{Digest, Sha1};
use signature::{DigestSigner, DigestVerifier};
use std::sync::LazyLock;

/// Size of a DSA public value (y) in a router identity.
pub const DSA_PUBLIC_SIZE: usize = 128;

/// Size of a raw DSA signature on the wire.
pub const DSA_SIGNATURE_SIZE: usize = 40;

const DSA_P_HEX: &[u8] = b"\
9C05B2AA960D9B97B8931963C9CC9E8C3026E9B8ED92FAD0A69CC886D5BF8015\
FCADAE31A0AD18FAB3F01B00A358DE237655C4964AFAA2B337E96AD316B9FB1C\
C564B5AEC5B69A9FF6C3E4548707FEF8503D91DD8602E867E6D35D2235C1869C\
E2479C3B9D5401DE04E0727FB33D6511285D4CF29538D9E3B6051F5B22CC1C93";

const DSA_Q_HEX: &[u8] = b"A5DFC28FEF4CA1E286744CD8EED9D29D684046B7";

const DSA_G_HEX: &[u8] = b"\
0C1F4D27D40093B429E962D7223824E0BBC47E7C832A39236FC683AF84889581\
075FF9082ED32353D4374D7301CDA1D23C431F4698599DDA02451824FF369752\
593647CC3DDC197DE985E43D136CDCFC6BD5409CD2F450821142A5E6F8EB1C3A\
B5D0484B8129FCF17BCE4F7F33321C3CB3DBB14A905E7B2B3E93BE4708CBCC82";

static DSA_P: LazyLock<BigUint> =
    LazyLock::new(|| BigUint::parse_bytes(DSA_P_HEX, 16).expect("p constant parses"));
static DSA_Q: LazyLock<BigUint> =
    LazyLock::new(|| BigUint::parse_bytes(DSA_Q_HEX, 16).expect("q constant parses"));
static DSA_G: LazyLock<BigUint> =
    LazyLock::new(|| BigUint::parse_bytes(DSA_G_HEX, 16).expect("g constant parses"));

fn components() -> Components {
    Components::from_components(DSA_P.clone(), DSA_Q.clone(), DSA_G.clone())
        .expect("fixed group parameters are valid")
}

/// Generate a signing key in the fixed group, returning it together
/// with the 128-byte public value for embedding in a router identity.
pub fn generate_signing_key() -> (SigningKey, [u8; DSA_PUBLIC_SIZE]) {
    // x uniform in [1, q): 20 random bytes reduced mod q, retried on 0.
    let x = loop {
        let mut bytes = [0u8; 20];
        rand::rng().fill_bytes(&mut bytes);
        let candidate = BigUint::from_bytes_be(&bytes) % &*DSA_Q;
        if candidate != BigUint::from(0u32) {
            break candidate;
        }
    };
    let y = DSA_G.modpow(&x, &DSA_P);

    let verifying_key =
        VerifyingKey::from_components(components(), y.clone()).expect("y = g^x mod p is valid");
    let signing_key =
        SigningKey::from_components(verifying_key, x).expect("x matches public value");

    let mut public = [0u8; DSA_PUBLIC_SIZE];
    let y_bytes = y.to_bytes_be();
    public[DSA_PUBLIC_SIZE - y_bytes.len()..].copy_from_slice(&y_bytes);
    (signing_key, public)
}

/// Sign `data` with DSA-SHA1, returning the raw 40-byte signature.
pub fn sign(key: &SigningKey, data: &[u8]) -> Result<[u8; DSA_SIGNATURE_SIZE], CryptoError> {
    let signature: Signature = key
        .try_sign_digest(Sha1::new_with_prefix(data))
        .map_err(|_| CryptoError::SigningFailed)?;

    let mut out = [0u8; DSA_SIGNATURE_SIZE];
    let r = signature.r().to_bytes_be();
    let s = signature.s().to_bytes_be();
    if r.len() > 20 || s.len() > 20 {
        return Err(CryptoError::SigningFailed);
    }
    out[20 - r.len()..20].copy_from_slice(&r);
    out[40 - s.len()..].copy_from_slice(&s);
    Ok(out)
}

/// Verify a raw 40-byte DSA-SHA1 signature against a 128-byte public
/// value from a router identity.
pub fn verify(
    public: &[u8; DSA_PUBLIC_SIZE],
    data: &[u8],
    signature: &[u8; DSA_SIGNATURE_SIZE],
) -> Result<(), CryptoError> {
    let y = BigUint::from_bytes_be(public);
    let verifying_key = VerifyingKey::from_components(components(), y)
        .map_err(|_| CryptoError::InvalidKey("dsa public value outside group"))?;

    let r = BigUint::from_bytes_be(&signature[..20]);
    let s = BigUint::from_bytes_be(&signature[20..]);
    let signature =
        Signature::from_components(r, s).map_err(|_| CryptoError::SignatureInvalid)?;

    verifying_key
        .verify_digest(Sha1::new_with_prefix(data), &signature)
        .map_err(|_| CryptoError::SignatureInvalid)
}
