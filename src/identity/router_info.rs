//! Remote router descriptor.

use super::{IdentHash, RouterIdentity};
use crate::crypto::{dsa, CryptoError};

/// Published NTCP2 parameters for a router: its static Noise key and
/// the IV used to obfuscate the initiator's ephemeral key.
#[derive(Clone)]
pub struct Ntcp2Params {
    pub static_key: [u8; 32],
    pub iv: [u8; 16],
}

/// What we know about a remote router.
///
/// For outbound connections the full identity comes from the network
/// database before dialing. For inbound connections it starts unknown
/// and is learned during the handshake.
#[derive(Clone, Default)]
pub struct RouterInfo {
    identity: Option<RouterIdentity>,
    ident_hash: Option<IdentHash>,
    ntcp2: Option<Ntcp2Params>,
}

impl RouterInfo {
    /// Descriptor for a known router.
    pub fn new(identity: RouterIdentity) -> Self {
        let ident_hash = identity.hash();
        Self {
            identity: Some(identity),
            ident_hash: Some(ident_hash),
            ntcp2: None,
        }
    }

    /// Descriptor for a not-yet-identified router (inbound connections).
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Attach published NTCP2 parameters.
    pub fn with_ntcp2(mut self, params: Ntcp2Params) -> Self {
        self.ntcp2 = Some(params);
        self
    }

    pub fn identity(&self) -> Option<&RouterIdentity> {
        self.identity.as_ref()
    }

    pub fn ident_hash(&self) -> Option<&IdentHash> {
        self.ident_hash.as_ref()
    }

    pub fn ntcp2(&self) -> Option<&Ntcp2Params> {
        self.ntcp2.as_ref()
    }

    /// Adopt an identity learned during a handshake.
    pub fn set_identity(&mut self, identity: RouterIdentity) {
        self.ident_hash = Some(identity.hash());
        self.identity = Some(identity);
    }

    /// Verify a signature against this router's advertised DSA key.
    pub fn verify(
        &self,
        data: &[u8],
        signature: &[u8; dsa::DSA_SIGNATURE_SIZE],
    ) -> Result<(), CryptoError> {
        let identity = self
            .identity
            .as_ref()
            .ok_or(CryptoError::InvalidKey("router identity unknown"))?;
        dsa::verify(&identity.signing_key, data, signature)
    }
}
