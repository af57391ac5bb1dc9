//! TCP connector and acceptor.

use super::TransportError;
use crate::config::TransportConfig;
use crate::identity::{RouterContext, RouterInfo};
use crate::message::MessageDispatcher;
use crate::ntcp::Role;
use crate::session::{Session, SessionRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Dial a known router and start an initiator session.
///
/// Returns the session handle as soon as the socket is connected; the
/// handshake runs in the session's own task. Messages submitted before
/// establishment wait in the deferred slot.
pub async fn connect(
    addr: SocketAddr,
    ctx: Arc<RouterContext>,
    remote: RouterInfo,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<dyn MessageDispatcher>,
    config: &TransportConfig,
) -> Result<Arc<Session>, TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(TransportError::Connect)?;
    debug!(%addr, "connected, starting session");

    let session = Session::new(
        Role::Initiator,
        ctx,
        remote,
        registry,
        dispatcher,
        config.handshake_timeout(),
    );
    tokio::spawn(session.clone().run(stream));
    Ok(session)
}

/// Accept loop for inbound sessions.
pub struct Acceptor {
    listener: TcpListener,
    ctx: Arc<RouterContext>,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<dyn MessageDispatcher>,
    handshake_timeout: Duration,
}

impl Acceptor {
    /// Bind the configured address.
    pub async fn bind(
        ctx: Arc<RouterContext>,
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<dyn MessageDispatcher>,
        config: &TransportConfig,
    ) -> Result<Self, TransportError> {
        let addr: SocketAddr = config
            .bind_addr()
            .parse()
            .map_err(TransportError::InvalidBindAddr)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::Bind)?;
        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, "listening for inbound sessions");
        }
        Ok(Self {
            listener,
            ctx,
            registry,
            dispatcher,
            handshake_timeout: config.handshake_timeout(),
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Accept connections forever, spawning a responder session per
    /// socket. Transient accept errors are logged and the loop keeps
    /// going.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "inbound connection");
                    let session = Session::new(
                        Role::Responder,
                        self.ctx.clone(),
                        RouterInfo::unknown(),
                        self.registry.clone(),
                        self.dispatcher.clone(),
                        self.handshake_timeout,
                    );
                    tokio::spawn(session.run(stream));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
