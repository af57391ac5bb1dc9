//! Local router identity with signing capability.

use super::{IdentHash, RouterIdentity, IDENTITY_CERT_SIZE};
use crate::crypto::dsa::SigningKey;
use crate::crypto::{dh, dsa, CryptoError};
use num_bigint_dig::BigUint;
use std::fmt;

/// The local router: its identity plus the private keys backing it.
///
/// Holds the DH private exponent used by handshake key agreement and
/// the DSA signing key used to authenticate handshake transcripts.
pub struct RouterContext {
    identity: RouterIdentity,
    ident_hash: IdentHash,
    dh_private: BigUint,
    signing_key: SigningKey,
}

impl RouterContext {
    /// Create a new random router identity.
    pub fn generate() -> Self {
        let (dh_private, public_key) = dh::generate_keypair();
        let (signing_key, signing_public) = dsa::generate_signing_key();
        let identity = RouterIdentity {
            public_key,
            signing_key: signing_public,
            certificate: [0u8; IDENTITY_CERT_SIZE],
        };
        let ident_hash = identity.hash();
        Self {
            identity,
            ident_hash,
            dh_private,
            signing_key,
        }
    }

    /// The public identity.
    pub fn identity(&self) -> &RouterIdentity {
        &self.identity
    }

    /// The local ident hash.
    pub fn ident_hash(&self) -> &IdentHash {
        &self.ident_hash
    }

    /// The DH private exponent, for handshake key agreement.
    pub(crate) fn dh_private(&self) -> &BigUint {
        &self.dh_private
    }

    /// Sign a buffer with the router's DSA key.
    pub fn sign(&self, data: &[u8]) -> Result<[u8; dsa::DSA_SIGNATURE_SIZE], CryptoError> {
        dsa::sign(&self.signing_key, data)
    }
}

impl fmt::Debug for RouterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterContext")
            .field("ident_hash", &self.ident_hash)
            .finish()
    }
}
