//! Diffie-Hellman over the overlay's fixed 2048-bit MODP group.
//!
//! The legacy handshake exchanges 256-byte public values computed in
//! the RFC 3526 group 14 (2048-bit) prime field with generator 2. The
//! agreed secret is folded down to a 32-byte AES session key: if the
//! most significant bit of the secret is set, the key is a zero byte
//! followed by the first 31 secret bytes, otherwise the first 32.

use super::CryptoError;
use num_bigint_dig::BigUint;
use rand::RngCore;
use std::sync::LazyLock;

/// Size of a DH public value on the wire.
pub const DH_PUBLIC_SIZE: usize = 256;

/// RFC 3526 group 14 prime (2048 bits).
const MODP_PRIME_HEX: &[u8] = b"\
FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF";

static MODP_PRIME: LazyLock<BigUint> = LazyLock::new(|| {
    BigUint::parse_bytes(MODP_PRIME_HEX, 16).expect("prime constant parses")
});

/// Group generator.
fn generator() -> BigUint {
    BigUint::from(2u32)
}

/// Generate a DH keypair: a private exponent and the 256-byte
/// big-endian public value `g^x mod p`.
pub fn generate_keypair() -> (BigUint, [u8; DH_PUBLIC_SIZE]) {
    let mut bytes = [0u8; DH_PUBLIC_SIZE];
    rand::rng().fill_bytes(&mut bytes);
    let private = BigUint::from_bytes_be(&bytes) % &*MODP_PRIME;
    let public = generator().modpow(&private, &MODP_PRIME);
    (private, to_fixed_be(&public))
}

/// Agree on a shared secret and fold it to the 32-byte AES session key.
///
/// Both sides of a handshake derive the identical key from each other's
/// public values. Rejects degenerate public values (0, 1, p-1, >= p).
pub fn session_key(
    remote_public: &[u8],
    local_private: &BigUint,
) -> Result<[u8; 32], CryptoError> {
    if remote_public.len() != DH_PUBLIC_SIZE {
        return Err(CryptoError::InvalidKey("dh public value must be 256 bytes"));
    }
    let y = BigUint::from_bytes_be(remote_public);
    let p = &*MODP_PRIME;
    if y <= BigUint::from(1u32) || y >= p - 1u32 {
        return Err(CryptoError::DhAgreement);
    }

    let secret = to_fixed_be(&y.modpow(local_private, p));

    let mut key = [0u8; 32];
    if secret[0] & 0x80 != 0 {
        key[1..].copy_from_slice(&secret[..31]);
    } else {
        key.copy_from_slice(&secret[..32]);
    }
    Ok(key)
}

/// Serialize to 256 bytes big-endian, left-padded with zeros.
fn to_fixed_be(value: &BigUint) -> [u8; DH_PUBLIC_SIZE] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; DH_PUBLIC_SIZE];
    out[DH_PUBLIC_SIZE - bytes.len()..].copy_from_slice(&bytes);
    out
}
