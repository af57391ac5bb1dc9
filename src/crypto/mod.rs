//! Cryptographic primitives for session establishment and framing.
//!
//! Thin adapters over the RustCrypto crates, shaped to what the wire
//! protocols need: one-shot SHA-256 and HMAC-SHA-256, streaming
//! AES-256-CBC contexts whose chaining state survives across calls,
//! the overlay's fixed 2048-bit MODP Diffie-Hellman group, DSA-SHA1
//! signatures over the overlay's fixed 1024-bit group, the Noise-XK
//! key-derivation schedule, and the Adler-32 frame checksum.

pub mod aes;
pub mod dh;
pub mod dsa;
pub mod kdf;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub use self::aes::{CbcDecryptor, CbcEncryptor};

/// Errors from cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("diffie-hellman agreement failed")]
    DhAgreement,

    #[error("invalid key material: {0}")]
    InvalidKey(&'static str),

    #[error("signing failed")]
    SigningFailed,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("mac verification failed")]
    MacMismatch,
}

/// One-shot SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 over the concatenation of two buffers.
pub fn sha256_pair(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// One-shot HMAC-SHA-256.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    use hmac::{Hmac, Mac};
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Adler-32 checksum as used by the post-handshake frame trailer.
pub fn adler32(data: &[u8]) -> u32 {
    adler32::RollingAdler32::from_buffer(data).hash()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_pair_matches_concat() {
        let a = b"hello ";
        let b = b"world";
        assert_eq!(sha256_pair(a, b), sha256(b"hello world"));
    }

    #[test]
    fn test_adler32_known_value() {
        // RFC 1950 example: "Wikipedia" -> 0x11E60398
        assert_eq!(adler32(b"Wikipedia"), 0x11E60398);
    }

    #[test]
    fn test_hmac_sha256_key_separation() {
        let m1 = hmac_sha256(b"key-one", b"data");
        let m2 = hmac_sha256(b"key-two", b"data");
        assert_ne!(m1, m2);
    }
}
