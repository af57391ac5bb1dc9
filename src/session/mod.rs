//! Transport sessions.
//!
//! One `Session` per TCP connection. A session task runs the handshake
//! under a watchdog, then splits the socket: the task itself becomes
//! the single reader draining ciphertext through the record layer,
//! and a spawned writer task drains the outbound channel to the
//! socket. Encryption and channel submission happen under one lock so
//! frames reach the wire in submission order.
//!
//! Messages submitted before establishment park in a one-deep deferred
//! slot and follow the identity announcement out once the session is
//! up. Termination is idempotent: it flips the established flag,
//! cancels the reader, closes the writer channel, frees the deferred
//! message, and removes the session from the registry; the tasks
//! unwind and drop the last references.

mod recv;
pub mod registry;

use crate::crypto::aes::AES_BLOCK_SIZE;
use crate::crypto::{CbcDecryptor, CbcEncryptor, CryptoError};
use crate::identity::{IdentHash, RouterContext, RouterInfo};
use crate::message::{MessageDispatcher, NetworkMessage, MAX_MESSAGE_SIZE};
use crate::ntcp::{
    unix_timestamp, wire, Handshake, HandshakeError, ProtocolError, Role, PHASE1_SIZE,
    PHASE2_SIZE, PHASE3_SIZE, PHASE4_SIZE,
};
use recv::RecordReader;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use registry::SessionRegistry;

/// Session identifier, unique per registry.
pub type SessionId = u64;

/// Receive buffer: room for two maximum-size inner messages.
const RECEIVE_BUFFER_SIZE: usize = 2 * MAX_MESSAGE_SIZE;

/// Errors fatal to a session, plus the internal kind that only drops
/// the offending outbound message.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("malformed outbound message: {0}")]
    Internal(&'static str),
}

impl From<HandshakeError> for SessionError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Crypto(e) => SessionError::Crypto(e),
            HandshakeError::Protocol(e) => SessionError::Protocol(e),
        }
    }
}

/// Outbound half: the CBC context and the channel to the writer task.
/// Held behind one mutex so encrypt-and-submit is a single critical
/// section.
struct Outbound {
    encryptor: CbcEncryptor,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// One transport connection to a remote router.
pub struct Session {
    id: SessionId,
    role: Role,
    ctx: Arc<RouterContext>,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<dyn MessageDispatcher>,
    remote: Mutex<RouterInfo>,
    established: AtomicBool,
    terminated: AtomicBool,
    outbound: Mutex<Option<Outbound>>,
    deferred: Mutex<Option<NetworkMessage>>,
    cancel: CancellationToken,
    handshake_timeout: Duration,
}

impl Session {
    pub(crate) fn new(
        role: Role,
        ctx: Arc<RouterContext>,
        remote: RouterInfo,
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<dyn MessageDispatcher>,
        handshake_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: registry.allocate_id(),
            role,
            ctx,
            registry,
            dispatcher,
            remote: Mutex::new(remote),
            established: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            outbound: Mutex::new(None),
            deferred: Mutex::new(None),
            cancel: CancellationToken::new(),
            handshake_timeout,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::SeqCst)
    }

    /// The remote router's ident hash, once known.
    pub fn remote_ident(&self) -> Option<IdentHash> {
        self.remote
            .lock()
            .expect("remote lock poisoned")
            .ident_hash()
            .copied()
    }

    /// Drive the session to completion: handshake, then the reader
    /// loop. Returns when the session is terminated.
    pub(crate) async fn run(self: Arc<Self>, mut stream: TcpStream) {
        let handshake =
            tokio::time::timeout(self.handshake_timeout, self.drive_handshake(&mut stream))
                .await;
        let (encryptor, decryptor, remote) = match handshake {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => {
                warn!(session_id = self.id, role = %self.role, error = %e, "handshake failed");
                self.terminate();
                return;
            }
            Err(_) => {
                warn!(session_id = self.id, role = %self.role, "handshake timed out");
                self.terminate();
                return;
            }
        };

        // Terminated mid-handshake: don't bring the session up.
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().expect("outbound lock poisoned") =
            Some(Outbound { encryptor, tx });
        *self.remote.lock().expect("remote lock poisoned") = remote;

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(Self::write_loop(self.clone(), write_half, rx));

        self.connected();
        self.receive_loop(read_half, decryptor).await;
        self.terminate();
    }

    /// Exchange handshake records according to our role.
    async fn drive_handshake(
        &self,
        stream: &mut TcpStream,
    ) -> Result<(CbcEncryptor, CbcDecryptor, RouterInfo), SessionError> {
        match self.role {
            Role::Initiator => {
                let remote = self.remote.lock().expect("remote lock poisoned").clone();
                let mut hs = Handshake::initiator(self.ctx.clone(), remote)?;

                stream.write_all(&hs.write_phase1()?).await?;
                debug!(session_id = self.id, "phase1 sent");

                let mut phase2 = [0u8; PHASE2_SIZE];
                stream.read_exact(&mut phase2).await?;
                hs.read_phase2(&phase2)?;
                debug!(session_id = self.id, "phase2 verified");

                stream.write_all(&hs.write_phase3()?).await?;
                debug!(session_id = self.id, "phase3 sent");

                let mut phase4 = [0u8; PHASE4_SIZE];
                stream.read_exact(&mut phase4).await?;
                hs.read_phase4(&phase4)?;
                debug!(session_id = self.id, "phase4 verified");

                Ok(hs.into_transport()?)
            }
            Role::Responder => {
                let mut hs = Handshake::responder(self.ctx.clone());

                let mut phase1 = [0u8; PHASE1_SIZE];
                stream.read_exact(&mut phase1).await?;
                hs.read_phase1(&phase1)?;
                debug!(session_id = self.id, "phase1 verified");

                stream.write_all(&hs.write_phase2()?).await?;
                debug!(session_id = self.id, "phase2 sent");

                let mut phase3 = [0u8; PHASE3_SIZE];
                stream.read_exact(&mut phase3).await?;
                hs.read_phase3(&phase3)?;
                debug!(session_id = self.id, "phase3 verified");

                stream.write_all(&hs.write_phase4()?).await?;
                debug!(session_id = self.id, "phase4 sent");

                Ok(hs.into_transport()?)
            }
        }
    }

    /// Establishment: register, announce ourselves, flush the deferred
    /// message, in that order.
    fn connected(self: &Arc<Self>) {
        self.established.store(true, Ordering::SeqCst);
        self.registry.add(self.clone());
        info!(
            session_id = self.id,
            role = %self.role,
            remote = ?self.remote_ident(),
            "session established"
        );

        self.send_time_sync();

        let announce = self.dispatcher.create_database_store(&self.ctx);
        if let Err(e) = self.send_frame(Some(announce)) {
            debug!(session_id = self.id, error = %e, "announcement dropped");
        }

        let deferred = self
            .deferred
            .lock()
            .expect("deferred lock poisoned")
            .take();
        if let Some(msg) = deferred {
            if let Err(e) = self.send_frame(Some(msg)) {
                debug!(session_id = self.id, error = %e, "deferred message dropped");
            }
        }
    }

    /// Submit an inner message. Before establishment it parks in the
    /// deferred slot; the slot holds one message, later submissions
    /// are dropped.
    pub fn send_message(&self, msg: NetworkMessage) {
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }
        if !self.is_established() {
            let mut slot = self.deferred.lock().expect("deferred lock poisoned");
            if slot.is_some() {
                warn!(session_id = self.id, "deferred slot occupied, dropping message");
            } else {
                *slot = Some(msg);
            }
            return;
        }
        if let Err(e) = self.send_frame(Some(msg)) {
            debug!(session_id = self.id, error = %e, "outbound message dropped");
        }
    }

    /// Send a time-sync keep-alive frame.
    pub fn send_time_sync(&self) {
        if let Err(e) = self.send_frame(None) {
            debug!(session_id = self.id, error = %e, "time sync dropped");
        }
    }

    /// Seal, encrypt, and submit one frame. `None` sends a time-sync
    /// keep-alive. A malformed message is dropped without terminating
    /// the session.
    fn send_frame(&self, msg: Option<NetworkMessage>) -> Result<(), SessionError> {
        let mut frame = match msg {
            Some(m) => {
                if m.offset() < 2 {
                    return Err(SessionError::Internal(
                        "message offset leaves no room for size prefix",
                    ));
                }
                let len = m.len();
                if wire::frame_len(len) > MAX_MESSAGE_SIZE {
                    return Err(SessionError::Internal("message exceeds frame limit"));
                }
                let mut frame = vec![0u8; wire::frame_len(len)];
                frame[2..2 + len].copy_from_slice(m.payload());
                wire::seal_frame(&mut frame, len);
                frame
            }
            None => wire::seal_keepalive(unix_timestamp()).to_vec(),
        };

        // Encrypt and submit under one lock: the CBC chain and the
        // writer queue must see frames in the same order.
        let mut guard = self.outbound.lock().expect("outbound lock poisoned");
        let Some(outbound) = guard.as_mut() else {
            // Terminating; the frame goes nowhere.
            return Ok(());
        };
        outbound.encryptor.process(&mut frame);
        let _ = outbound.tx.send(frame);
        Ok(())
    }

    /// Single reader: drain the socket through the record layer and
    /// hand completed messages to the dispatcher.
    async fn receive_loop(&self, mut read_half: OwnedReadHalf, decryptor: CbcDecryptor) {
        let mut reader = RecordReader::new(decryptor);
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        let mut offset = 0usize;

        loop {
            let n = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = read_half.read(&mut buf[offset..]) => match result {
                    Ok(0) => {
                        debug!(session_id = self.id, "connection closed by peer");
                        return;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        if !self.terminated.load(Ordering::SeqCst) {
                            warn!(session_id = self.id, error = %e, "read failed");
                        }
                        return;
                    }
                },
            };
            offset += n;

            let mut pos = 0;
            while offset - pos >= AES_BLOCK_SIZE {
                match reader.push(&buf[pos..pos + AES_BLOCK_SIZE]) {
                    Ok(Some(msg)) => self.dispatcher.handle_message(msg),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(session_id = self.id, error = %e, "record layer failure");
                        return;
                    }
                }
                pos += AES_BLOCK_SIZE;
            }
            // Keep the partial block tail for the next read.
            buf.copy_within(pos..offset, 0);
            offset -= pos;
        }
    }

    /// Writer task: frames leave the channel in submission order.
    async fn write_loop(
        session: Arc<Session>,
        mut write_half: OwnedWriteHalf,
        mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = write_half.write_all(&frame).await {
                if !session.terminated.load(Ordering::SeqCst) {
                    warn!(session_id = session.id, error = %e, "write failed");
                }
                break;
            }
        }
        session.terminate();
    }

    /// Tear the session down. Idempotent; any error path funnels here.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.established.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        // Dropping the outbound half closes the writer channel and
        // with it the write side of the socket.
        *self.outbound.lock().expect("outbound lock poisoned") = None;
        *self.deferred.lock().expect("deferred lock poisoned") = None;
        self.registry.remove(self.id);
        debug!(session_id = self.id, role = %self.role, "session terminated");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("established", &self.is_established())
            .field("remote", &self.remote_ident())
            .finish()
    }
}

#[cfg(test)]
mod tests;
