//! Key derivation for the Noise-XK session request.
//!
//! Derives the symmetric key protecting the session-request options
//! block. The chaining key starts as the protocol name, the transcript
//! hash absorbs the responder's static key and the initiator's
//! ephemeral, and three HMAC-SHA-256 steps produce the next chaining
//! key and the message key.

use super::{hmac_sha256, sha256, sha256_pair};
use x25519_dalek::{PublicKey, StaticSecret};

/// Noise protocol name; exactly 32 bytes, used directly as the initial
/// chaining key.
pub const NOISE_PROTOCOL_NAME: &[u8; 32] = b"Noise_XK_25519_ChaChaPoly_SHA256";

/// Derive the session-request message key.
///
/// `remote_static` is the responder's published static key, `local_pub`
/// the initiator's ephemeral public key, `local_priv` the matching
/// secret. Returns `(key, h)` where `key` encrypts the options block
/// and `h` is the transcript hash that the later messages of the XK
/// pattern bind to.
pub fn session_request_key(
    remote_static: &[u8; 32],
    local_pub: &[u8; 32],
    local_priv: &StaticSecret,
) -> ([u8; 32], [u8; 32]) {
    let ck = NOISE_PROTOCOL_NAME;

    // h = SHA256(ck); h = SHA256(h || rs); h = SHA256(h || pub)
    let mut h = sha256(ck);
    h = sha256_pair(&h, remote_static);
    h = sha256_pair(&h, local_pub);

    // ikm = X25519(priv, rs)
    let ikm = local_priv.diffie_hellman(&PublicKey::from(*remote_static));

    // temp_key = HMAC(ck, ikm); ck' = HMAC(temp_key, 0x01);
    // derived = HMAC(temp_key, ck' || 0x02)
    let temp_key = hmac_sha256(ck, ikm.as_bytes());
    let ck_next = hmac_sha256(&temp_key, &[0x01]);
    let mut ck_and_tag = [0u8; 33];
    ck_and_tag[..32].copy_from_slice(&ck_next);
    ck_and_tag[32] = 0x02;
    let derived = hmac_sha256(&temp_key, &ck_and_tag);

    (derived, h)
}
