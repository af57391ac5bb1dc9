//! NTCP2 establishment (Noise-XK successor to the legacy handshake).
//!
//! The initiator side of message 1 (session request) is implemented:
//!
//! ```text
//! [AES-CBC(H(Bob), bobIV, X):32][ChaCha20Poly1305(k, options):32][padding]
//! ```
//!
//! X is the initiator's X25519 ephemeral key, obfuscated under the
//! responder's ident hash and published IV. The 16-byte options block
//! is MACed with Poly1305 under the KDF-derived key, the MAC placed in
//! the second half of the 32-byte block, and the first half then
//! encrypted with ChaCha20 (nonce 0, counter 0). The responder flow
//! (session created / session confirmed) is a forward extension.
//!
//! Options block, all fields big-endian:
//!
//! ```text
//! [ver:2 = 2][padLen:2][m3p2Len:2][rsvd:2][tsA:4][rsvd:4]
//! ```

use crate::crypto::kdf;
use crate::crypto::CbcEncryptor;
use crate::identity::{IdentHash, Ntcp2Params, RouterInfo};
use crate::ntcp::{unix_timestamp, ProtocolError};
use crate::session::SessionError;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use poly1305::universal_hash::KeyInit;
use poly1305::Poly1305;
use rand::{Rng, RngCore};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};

/// Session request size before padding: obfuscated X plus the
/// encrypted options block.
pub const SESSION_REQUEST_PREFIX_SIZE: usize = 64;

/// Padding length is drawn below this bound so the whole message stays
/// within the 287-byte limit routers that also publish a legacy
/// address enforce.
pub const SESSION_REQUEST_MAX_PADDING: usize = 287 - SESSION_REQUEST_PREFIX_SIZE;

/// Build a session request deterministically from its inputs.
///
/// Byte-reproducible given the ephemeral key, timestamp, and padding,
/// which is what makes the construction testable; `client_login` draws
/// those fresh per connection.
pub fn build_session_request(
    remote_ident: &IdentHash,
    remote: &Ntcp2Params,
    ephemeral: &StaticSecret,
    ts_a: u32,
    padding: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    if padding.len() > SESSION_REQUEST_MAX_PADDING {
        return Err(ProtocolError::Malformed("session request padding too long"));
    }

    // Obfuscate X under the responder's ident hash and published IV.
    let x = PublicKey::from(ephemeral).to_bytes();
    let mut x_enc = x;
    CbcEncryptor::new(remote_ident.as_bytes(), &remote.iv).process(&mut x_enc);

    let (key, _transcript) = kdf::session_request_key(&remote.static_key, &x, ephemeral);

    let mut options = [0u8; 32];
    options[..2].copy_from_slice(&2u16.to_be_bytes()); // ver
    options[2..4].copy_from_slice(&(padding.len() as u16).to_be_bytes());
    // m3p2Len and reserved fields stay zero.
    options[8..12].copy_from_slice(&ts_a.to_be_bytes());

    // MAC over the plaintext options, then encrypt the first half.
    let tag = Poly1305::new((&key).into()).compute_unpadded(&options[..16]);
    options[16..].copy_from_slice(tag.as_slice());
    ChaCha20::new((&key).into(), (&[0u8; 12]).into()).apply_keystream(&mut options[..16]);

    let mut request = Vec::with_capacity(SESSION_REQUEST_PREFIX_SIZE + padding.len());
    request.extend_from_slice(&x_enc);
    request.extend_from_slice(&options);
    request.extend_from_slice(padding);
    Ok(request)
}

/// Initiate an NTCP2 session: build a session request with a fresh
/// ephemeral key and random padding and submit it as one write.
pub async fn client_login(
    stream: &mut TcpStream,
    remote: &RouterInfo,
) -> Result<(), SessionError> {
    let ident = remote
        .ident_hash()
        .ok_or(ProtocolError::IdentityRequired)?;
    let params = remote.ntcp2().ok_or(ProtocolError::Ntcp2ParamsMissing)?;

    let mut secret = [0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    let ephemeral = StaticSecret::from(secret);

    let pad_len = rand::rng().random_range(0..SESSION_REQUEST_MAX_PADDING);
    let mut padding = vec![0u8; pad_len];
    rand::rng().fill_bytes(&mut padding);

    let request = build_session_request(ident, params, &ephemeral, unix_timestamp(), &padding)?;
    stream.write_all(&request).await?;
    debug!(remote = %ident, len = request.len(), "session request sent");
    Ok(())
}

/// Responder side of the NTCP2 establishment. Not yet supported;
/// inbound peers use the legacy handshake.
pub fn server_login() -> Result<(), ProtocolError> {
    Err(ProtocolError::Unsupported("ntcp2 responder"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CbcDecryptor;

    fn fixed_params() -> (IdentHash, Ntcp2Params, StaticSecret) {
        let ident = IdentHash::from_bytes([0x5A; 32]);
        let responder_static = StaticSecret::from([0x33; 32]);
        let params = Ntcp2Params {
            static_key: PublicKey::from(&responder_static).to_bytes(),
            iv: [0x1F; 16],
        };
        let ephemeral = StaticSecret::from([0x77; 32]);
        (ident, params, ephemeral)
    }

    #[test]
    fn test_session_request_deterministic() {
        let (ident, params, ephemeral) = fixed_params();
        let padding = [0xEE; 40];

        let a = build_session_request(&ident, &params, &ephemeral, 1_700_000_000, &padding)
            .unwrap();
        let b = build_session_request(&ident, &params, &ephemeral, 1_700_000_000, &padding)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), SESSION_REQUEST_PREFIX_SIZE + padding.len());
        // The 64-byte prefix is fully determined by the inputs.
        assert_eq!(a[..64], b[..64]);
    }

    #[test]
    fn test_obfuscated_x_recoverable_by_responder() {
        let (ident, params, ephemeral) = fixed_params();
        let request =
            build_session_request(&ident, &params, &ephemeral, 1_700_000_000, &[]).unwrap();

        let mut x = [0u8; 32];
        x.copy_from_slice(&request[..32]);
        CbcDecryptor::new(ident.as_bytes(), &params.iv).process(&mut x);
        assert_eq!(x, PublicKey::from(&ephemeral).to_bytes());
    }

    #[test]
    fn test_options_block_decrypts_and_authenticates() {
        let (ident, params, ephemeral) = fixed_params();
        let ts_a = 1_700_000_123;
        let padding = [0u8; 17];
        let request =
            build_session_request(&ident, &params, &ephemeral, ts_a, &padding).unwrap();

        let x = PublicKey::from(&ephemeral).to_bytes();
        let (key, _) = kdf::session_request_key(&params.static_key, &x, &ephemeral);

        let mut options = [0u8; 32];
        options.copy_from_slice(&request[32..64]);
        ChaCha20::new((&key).into(), (&[0u8; 12]).into())
            .apply_keystream(&mut options[..16]);

        // MAC over the recovered plaintext matches the embedded tag.
        let tag = Poly1305::new((&key).into()).compute_unpadded(&options[..16]);
        assert_eq!(&options[16..], tag.as_slice());

        // Field layout.
        assert_eq!(&options[..2], &[0, 2]); // ver
        assert_eq!(&options[2..4], &17u16.to_be_bytes()); // padLen
        assert_eq!(&options[4..6], &[0, 0]); // m3p2Len
        assert_eq!(&options[8..12], &ts_a.to_be_bytes());
    }

    #[test]
    fn test_padding_bound_enforced() {
        let (ident, params, ephemeral) = fixed_params();
        let oversized = vec![0u8; SESSION_REQUEST_MAX_PADDING + 1];
        assert!(
            build_session_request(&ident, &params, &ephemeral, 0, &oversized).is_err()
        );
    }

    #[test]
    fn test_server_login_unsupported() {
        assert!(matches!(
            server_login(),
            Err(ProtocolError::Unsupported(_))
        ));
    }
}
