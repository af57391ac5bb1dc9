//! Legacy NTCP establishment protocol.
//!
//! A four-record handshake authenticates both routers and seeds the
//! AES-CBC contexts the record layer keeps for the life of the
//! session:
//!
//! ```text
//!   Alice                                Bob
//!   Phase1 (X, H(X)^H(Bob)) ------------->
//!   <------------- Phase2 (Y, enc{H(XY), tsB, filler})
//!   Phase3 (enc{ident, tsA, sig}) -------->
//!   <-------------- Phase4 (enc{sig})
//! ```
//!
//! Phase1 is cleartext. The DH agreement over X and Y keys both CBC
//! contexts; Phase2 onward is encrypted with them, and the chaining
//! state continues into the post-handshake frames with no re-keying.
//! Each side signs the 552-byte transcript (X, Y, peer ident, tsA,
//! tsB) with its DSA identity key.

pub mod handshake;
pub mod wire;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::crypto::CryptoError;

pub use handshake::{Handshake, Progress};

/// Size of the Phase1 record: `pubKey[256] || HXxorHI[32]`.
pub const PHASE1_SIZE: usize = 288;

/// Size of the Phase2 record: `pubKey[256] || encrypted[48]`.
pub const PHASE2_SIZE: usize = 304;

/// Size of Phase2's encrypted segment: `hxy[32] || tsB[4] || filler[12]`.
pub const PHASE2_ENCRYPTED_SIZE: usize = 48;

/// Size of the Phase3 record: `size[2] || ident[387] || tsA[4] ||
/// signature[40]` padded to an AES block multiple.
pub const PHASE3_SIZE: usize = 448;

/// Size of the Phase4 record: `signature[40]` padded to an AES block.
pub const PHASE4_SIZE: usize = 48;

/// Size of the signed transcript: `x[256] || y[256] || ident[32] ||
/// tsA[4] || tsB[4]`.
pub const SIGNED_DATA_SIZE: usize = 552;

/// Errors raised by protocol validation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("wrong handshake state: expected {expected}, got {got}")]
    WrongState {
        expected: &'static str,
        got: &'static str,
    },

    #[error("ident mismatch: connection is not addressed to this router")]
    IdentMismatch,

    #[error("key exchange hash mismatch")]
    HashMismatch,

    #[error("remote router identity required")]
    IdentityRequired,

    #[error("remote ntcp2 parameters unknown")]
    Ntcp2ParamsMissing,

    #[error("malformed record: {0}")]
    Malformed(&'static str),

    #[error("malformed frame: declared size {size} exceeds maximum")]
    FrameTooLarge { size: usize },

    #[error("frame checksum mismatch")]
    ChecksumMismatch,

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Handshake failures: protocol violations or crypto rejections. Both
/// are fatal to the session.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Role in the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// We dialed the connection.
    Initiator,
    /// They dialed the connection.
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// Current Unix time in whole seconds, as carried in handshake records
/// and time-sync frames.
pub(crate) fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as u32
}
