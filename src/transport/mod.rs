//! Socket plumbing.
//!
//! Dialing out to known routers and accepting inbound connections.
//! Each socket is handed to a session task immediately; everything
//! after the TCP layer is the session's business.

pub mod tcp;

use thiserror::Error;

pub use tcp::{connect, Acceptor};

/// Errors from transport setup.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid bind address: {0}")]
    InvalidBindAddr(std::net::AddrParseError),

    #[error("bind failed: {0}")]
    Bind(std::io::Error),

    #[error("connect failed: {0}")]
    Connect(std::io::Error),
}
