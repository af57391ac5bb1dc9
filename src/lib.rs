//! NTCP: TCP transport sessions for an anonymizing overlay network.
//!
//! Routers establish authenticated, encrypted, stream-oriented sessions
//! with each other and exchange variable-length network messages over
//! them. Two establishment protocols are supported: the legacy NTCP
//! handshake (2048-bit MODP Diffie-Hellman, AES-256-CBC, DSA-SHA1) and
//! its Noise-XK successor NTCP2 (X25519, ChaCha20-Poly1305, SHA-256).
//! After the handshake, both directions carry AES-CBC encrypted frames
//! of the form `size || payload || padding || adler32`, decrypted in
//! 16-byte strides and reassembled into inner network messages.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod message;
pub mod ntcp;
pub mod ntcp2;
pub mod session;
pub mod transport;

// Re-export config types
pub use config::{Config, ConfigError, TransportConfig};

// Re-export identity types
pub use identity::{
    IdentHash, IdentityError, Ntcp2Params, RouterContext, RouterIdentity, RouterInfo,
};

// Re-export message types
pub use message::{MessageDispatcher, NetworkMessage, MAX_MESSAGE_SIZE};

// Re-export protocol types
pub use ntcp::{HandshakeError, Progress, ProtocolError, Role};

// Re-export crypto error type
pub use crypto::CryptoError;

// Re-export session types
pub use session::{Session, SessionError, SessionId, SessionRegistry};

// Re-export transport types
pub use transport::{Acceptor, TransportError};
