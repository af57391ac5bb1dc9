//! Router identities.
//!
//! A router identity is a fixed 387-byte structure: the 256-byte DH
//! public value, the 128-byte DSA public value, and a 3-byte
//! certificate. Routers address each other by the SHA-256 of those
//! bytes, the ident hash.

mod local;
mod router_info;

use crate::crypto::sha256;
use std::fmt;
use thiserror::Error;

pub use local::RouterContext;
pub use router_info::{Ntcp2Params, RouterInfo};

/// Size of the DH public value in an identity.
pub const IDENTITY_PUBLIC_SIZE: usize = 256;

/// Size of the DSA public value in an identity.
pub const IDENTITY_SIGNING_SIZE: usize = 128;

/// Size of the certificate field in an identity.
pub const IDENTITY_CERT_SIZE: usize = 3;

/// Total serialized size of a router identity.
pub const ROUTER_IDENTITY_SIZE: usize =
    IDENTITY_PUBLIC_SIZE + IDENTITY_SIGNING_SIZE + IDENTITY_CERT_SIZE; // 387

/// Errors from identity handling.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid identity length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

/// SHA-256 of a router's full identity bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentHash([u8; 32]);

impl IdentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for IdentHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for IdentHash {
    /// First eight bytes as hex, enough to tell routers apart in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for IdentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentHash({})", self)
    }
}

/// A router's public identity.
#[derive(Clone)]
pub struct RouterIdentity {
    /// DH public value (`g^x mod p` in the fixed MODP group).
    pub public_key: [u8; IDENTITY_PUBLIC_SIZE],
    /// DSA public value.
    pub signing_key: [u8; IDENTITY_SIGNING_SIZE],
    /// Certificate (type, length), null for current routers.
    pub certificate: [u8; IDENTITY_CERT_SIZE],
}

impl RouterIdentity {
    /// Serialize to the canonical 387-byte form.
    pub fn to_bytes(&self) -> [u8; ROUTER_IDENTITY_SIZE] {
        let mut out = [0u8; ROUTER_IDENTITY_SIZE];
        out[..IDENTITY_PUBLIC_SIZE].copy_from_slice(&self.public_key);
        out[IDENTITY_PUBLIC_SIZE..IDENTITY_PUBLIC_SIZE + IDENTITY_SIGNING_SIZE]
            .copy_from_slice(&self.signing_key);
        out[IDENTITY_PUBLIC_SIZE + IDENTITY_SIGNING_SIZE..].copy_from_slice(&self.certificate);
        out
    }

    /// Parse from canonical bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.len() != ROUTER_IDENTITY_SIZE {
            return Err(IdentityError::InvalidLength {
                expected: ROUTER_IDENTITY_SIZE,
                got: bytes.len(),
            });
        }
        let mut public_key = [0u8; IDENTITY_PUBLIC_SIZE];
        let mut signing_key = [0u8; IDENTITY_SIGNING_SIZE];
        let mut certificate = [0u8; IDENTITY_CERT_SIZE];
        public_key.copy_from_slice(&bytes[..IDENTITY_PUBLIC_SIZE]);
        signing_key.copy_from_slice(
            &bytes[IDENTITY_PUBLIC_SIZE..IDENTITY_PUBLIC_SIZE + IDENTITY_SIGNING_SIZE],
        );
        certificate.copy_from_slice(&bytes[IDENTITY_PUBLIC_SIZE + IDENTITY_SIGNING_SIZE..]);
        Ok(Self {
            public_key,
            signing_key,
            certificate,
        })
    }

    /// The ident hash: SHA-256 over the serialized identity.
    pub fn hash(&self) -> IdentHash {
        IdentHash(sha256(&self.to_bytes()))
    }
}
