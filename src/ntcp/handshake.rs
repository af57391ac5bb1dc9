//! Handshake state machine.
//!
//! Pure state: the machine consumes and produces fixed-size records
//! and never touches a socket, so both roles can be driven directly in
//! tests. The session layer reads exact record lengths off the stream
//! and feeds them through. Every method checks the expected progress
//! first; any validation failure leaves the machine unusable and the
//! caller terminates the connection.

use super::wire;
use super::{
    HandshakeError, ProtocolError, Role, PHASE1_SIZE, PHASE2_ENCRYPTED_SIZE, PHASE2_SIZE,
    PHASE3_SIZE, PHASE4_SIZE,
};
use crate::crypto::{dh, dsa, sha256_pair, CbcDecryptor, CbcEncryptor};
use crate::identity::{
    RouterContext, RouterIdentity, RouterInfo, IDENTITY_PUBLIC_SIZE, ROUTER_IDENTITY_SIZE,
};
use rand::RngCore;
use std::fmt;
use std::sync::Arc;

/// Handshake progress, shared by both roles.
///
/// Initiator: Initial -(write1)-> Phase1Done -(read2)-> Phase2Done
/// -(write3)-> Phase3Done -(read4)-> Complete.
/// Responder: Initial -(read1)-> Phase1Done -(write2)-> Phase2Done
/// -(read3)-> Phase3Done -(write4)-> Complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    Initial,
    Phase1Done,
    Phase2Done,
    Phase3Done,
    Complete,
}

impl Progress {
    fn name(self) -> &'static str {
        match self {
            Progress::Initial => "initial",
            Progress::Phase1Done => "phase1_done",
            Progress::Phase2Done => "phase2_done",
            Progress::Phase3Done => "phase3_done",
            Progress::Complete => "complete",
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The four-phase handshake, either role.
pub struct Handshake {
    role: Role,
    progress: Progress,
    ctx: Arc<RouterContext>,
    remote: RouterInfo,
    /// Phase1 record: X followed by the obfuscated ident hash. Kept
    /// whole because the key schedule and the signed transcript both
    /// reference its pieces.
    phase1: [u8; PHASE1_SIZE],
    /// Responder's DH public value Y.
    y: [u8; IDENTITY_PUBLIC_SIZE],
    ts_a: u32,
    ts_b: u32,
    encryptor: Option<CbcEncryptor>,
    decryptor: Option<CbcDecryptor>,
}

impl Handshake {
    /// Start as initiator. The remote router's identity must already
    /// be known from the network database.
    pub fn initiator(
        ctx: Arc<RouterContext>,
        remote: RouterInfo,
    ) -> Result<Self, ProtocolError> {
        if remote.ident_hash().is_none() {
            return Err(ProtocolError::IdentityRequired);
        }
        Ok(Self::new(Role::Initiator, ctx, remote))
    }

    /// Start as responder. The remote identity is learned in Phase3.
    pub fn responder(ctx: Arc<RouterContext>) -> Self {
        Self::new(Role::Responder, ctx, RouterInfo::unknown())
    }

    fn new(role: Role, ctx: Arc<RouterContext>, remote: RouterInfo) -> Self {
        Self {
            role,
            progress: Progress::Initial,
            ctx,
            remote,
            phase1: [0u8; PHASE1_SIZE],
            y: [0u8; IDENTITY_PUBLIC_SIZE],
            ts_a: 0,
            ts_b: 0,
            encryptor: None,
            decryptor: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn is_complete(&self) -> bool {
        self.progress == Progress::Complete
    }

    /// The remote router as currently known.
    pub fn remote(&self) -> &RouterInfo {
        &self.remote
    }

    fn expect(&self, role: Role, progress: Progress) -> Result<(), ProtocolError> {
        if self.role != role {
            return Err(ProtocolError::WrongState {
                expected: if role == Role::Initiator {
                    "initiator"
                } else {
                    "responder"
                },
                got: if self.role == Role::Initiator {
                    "initiator"
                } else {
                    "responder"
                },
            });
        }
        if self.progress != progress {
            return Err(ProtocolError::WrongState {
                expected: progress.name(),
                got: self.progress.name(),
            });
        }
        Ok(())
    }

    fn x(&self) -> &[u8; IDENTITY_PUBLIC_SIZE] {
        self.phase1[..IDENTITY_PUBLIC_SIZE]
            .try_into()
            .expect("phase1 prefix is the public value")
    }

    fn hx_xor_hi_iv(&self) -> [u8; 16] {
        self.phase1[PHASE1_SIZE - 16..]
            .try_into()
            .expect("last 16 bytes of phase1")
    }

    /// Derive both CBC contexts from the agreed key. The tail of Y is
    /// the IV for the responder-to-initiator direction; the tail of
    /// the obfuscated ident hash keys the other direction.
    fn install_ciphers(&mut self, key: [u8; 32]) {
        let y_iv: [u8; 16] = self.y[IDENTITY_PUBLIC_SIZE - 16..]
            .try_into()
            .expect("last 16 bytes of y");
        let h_iv = self.hx_xor_hi_iv();
        match self.role {
            Role::Initiator => {
                self.decryptor = Some(CbcDecryptor::new(&key, &y_iv));
                self.encryptor = Some(CbcEncryptor::new(&key, &h_iv));
            }
            Role::Responder => {
                self.encryptor = Some(CbcEncryptor::new(&key, &y_iv));
                self.decryptor = Some(CbcDecryptor::new(&key, &h_iv));
            }
        }
    }

    // === Initiator ===

    /// Build Phase1: our public value and the obfuscated target ident.
    pub fn write_phase1(&mut self) -> Result<[u8; PHASE1_SIZE], HandshakeError> {
        self.expect(Role::Initiator, Progress::Initial)?;

        let remote_ident = *self
            .remote
            .ident_hash()
            .ok_or(ProtocolError::IdentityRequired)?;
        self.phase1 = wire::build_phase1(&self.ctx.identity().public_key, &remote_ident);
        self.progress = Progress::Phase1Done;
        Ok(self.phase1)
    }

    /// Process Phase2: run the key agreement, decrypt, and check the
    /// exchange hash.
    pub fn read_phase2(&mut self, record: &[u8]) -> Result<(), HandshakeError> {
        self.expect(Role::Initiator, Progress::Phase1Done)?;
        if record.len() != PHASE2_SIZE {
            return Err(ProtocolError::Malformed("phase2 record length").into());
        }

        self.y.copy_from_slice(&record[..IDENTITY_PUBLIC_SIZE]);
        let key = dh::session_key(&self.y, self.ctx.dh_private())?;
        self.install_ciphers(key);

        let mut encrypted = [0u8; PHASE2_ENCRYPTED_SIZE];
        encrypted.copy_from_slice(&record[IDENTITY_PUBLIC_SIZE..]);
        self.decryptor
            .as_mut()
            .expect("decryptor installed above")
            .process(&mut encrypted);

        let hxy = sha256_pair(self.x(), &self.y);
        if hxy[..] != encrypted[..32] {
            return Err(ProtocolError::HashMismatch.into());
        }
        self.ts_b = u32::from_be_bytes(encrypted[32..36].try_into().expect("four bytes"));

        self.progress = Progress::Phase2Done;
        Ok(())
    }

    /// Build Phase3: our identity, tsA, and the signed transcript,
    /// encrypted.
    pub fn write_phase3(&mut self) -> Result<[u8; PHASE3_SIZE], HandshakeError> {
        self.expect(Role::Initiator, Progress::Phase2Done)?;

        let ts_a = super::unix_timestamp();
        let remote_ident = *self
            .remote
            .ident_hash()
            .ok_or(ProtocolError::IdentityRequired)?;
        let transcript = wire::signed_data(self.x(), &self.y, &remote_ident, ts_a, self.ts_b);
        let signature = self.ctx.sign(&transcript)?;

        let mut record = [0u8; PHASE3_SIZE];
        record[..2].copy_from_slice(&(ROUTER_IDENTITY_SIZE as u16).to_be_bytes());
        record[2..2 + ROUTER_IDENTITY_SIZE].copy_from_slice(&self.ctx.identity().to_bytes());
        record[389..393].copy_from_slice(&ts_a.to_be_bytes());
        record[393..433].copy_from_slice(&signature);
        rand::rng().fill_bytes(&mut record[433..]);

        self.encryptor
            .as_mut()
            .expect("encryptor installed by phase2")
            .process(&mut record);

        self.ts_a = ts_a;
        self.progress = Progress::Phase3Done;
        Ok(record)
    }

    /// Process Phase4: decrypt and verify the responder's signature
    /// over the transcript.
    pub fn read_phase4(&mut self, record: &[u8]) -> Result<(), HandshakeError> {
        self.expect(Role::Initiator, Progress::Phase3Done)?;
        if record.len() != PHASE4_SIZE {
            return Err(ProtocolError::Malformed("phase4 record length").into());
        }

        let mut plain = [0u8; PHASE4_SIZE];
        plain.copy_from_slice(record);
        self.decryptor
            .as_mut()
            .expect("decryptor installed by phase2")
            .process(&mut plain);

        let signature: [u8; dsa::DSA_SIGNATURE_SIZE] =
            plain[..40].try_into().expect("forty signature bytes");
        let transcript =
            wire::signed_data(self.x(), &self.y, self.ctx.ident_hash(), self.ts_a, self.ts_b);
        self.remote.verify(&transcript, &signature)?;

        self.progress = Progress::Complete;
        Ok(())
    }

    // === Responder ===

    /// Process Phase1: check the connection is addressed to us.
    pub fn read_phase1(&mut self, record: &[u8]) -> Result<(), HandshakeError> {
        self.expect(Role::Responder, Progress::Initial)?;
        if record.len() != PHASE1_SIZE {
            return Err(ProtocolError::Malformed("phase1 record length").into());
        }
        self.phase1.copy_from_slice(record);

        let expected = wire::hx_xor_hi(self.x(), self.ctx.ident_hash());
        if expected[..] != self.phase1[IDENTITY_PUBLIC_SIZE..] {
            return Err(ProtocolError::IdentMismatch.into());
        }

        self.progress = Progress::Phase1Done;
        Ok(())
    }

    /// Build Phase2: our public value and the encrypted exchange hash,
    /// timestamp, and random filler.
    pub fn write_phase2(&mut self) -> Result<[u8; PHASE2_SIZE], HandshakeError> {
        self.expect(Role::Responder, Progress::Phase1Done)?;

        self.y = self.ctx.identity().public_key;
        let key = dh::session_key(self.x(), self.ctx.dh_private())?;
        self.install_ciphers(key);

        let ts_b = super::unix_timestamp();
        let mut encrypted = [0u8; PHASE2_ENCRYPTED_SIZE];
        encrypted[..32].copy_from_slice(&sha256_pair(self.x(), &self.y));
        encrypted[32..36].copy_from_slice(&ts_b.to_be_bytes());
        rand::rng().fill_bytes(&mut encrypted[36..]);
        self.encryptor
            .as_mut()
            .expect("encryptor installed above")
            .process(&mut encrypted);

        let mut record = [0u8; PHASE2_SIZE];
        record[..IDENTITY_PUBLIC_SIZE].copy_from_slice(&self.y);
        record[IDENTITY_PUBLIC_SIZE..].copy_from_slice(&encrypted);

        self.ts_b = ts_b;
        self.progress = Progress::Phase2Done;
        Ok(record)
    }

    /// Process Phase3: adopt the initiator's identity and verify its
    /// signature over the transcript.
    pub fn read_phase3(&mut self, record: &[u8]) -> Result<(), HandshakeError> {
        self.expect(Role::Responder, Progress::Phase2Done)?;
        if record.len() != PHASE3_SIZE {
            return Err(ProtocolError::Malformed("phase3 record length").into());
        }

        let mut plain = [0u8; PHASE3_SIZE];
        plain.copy_from_slice(record);
        self.decryptor
            .as_mut()
            .expect("decryptor installed by phase2")
            .process(&mut plain);

        let size = u16::from_be_bytes(plain[..2].try_into().expect("two bytes")) as usize;
        if size != ROUTER_IDENTITY_SIZE {
            return Err(ProtocolError::Malformed("phase3 identity size").into());
        }
        let identity = RouterIdentity::from_bytes(&plain[2..2 + ROUTER_IDENTITY_SIZE])
            .map_err(|_| ProtocolError::Malformed("phase3 identity"))?;
        self.remote.set_identity(identity);

        let ts_a = u32::from_be_bytes(plain[389..393].try_into().expect("four bytes"));
        let signature: [u8; dsa::DSA_SIGNATURE_SIZE] =
            plain[393..433].try_into().expect("forty signature bytes");

        let transcript =
            wire::signed_data(self.x(), &self.y, self.ctx.ident_hash(), ts_a, self.ts_b);
        self.remote.verify(&transcript, &signature)?;

        self.ts_a = ts_a;
        self.progress = Progress::Phase3Done;
        Ok(())
    }

    /// Build Phase4: our signature over the transcript, encrypted.
    pub fn write_phase4(&mut self) -> Result<[u8; PHASE4_SIZE], HandshakeError> {
        self.expect(Role::Responder, Progress::Phase3Done)?;

        let remote_ident = *self
            .remote
            .ident_hash()
            .expect("identity adopted in phase3");
        let transcript =
            wire::signed_data(self.x(), &self.y, &remote_ident, self.ts_a, self.ts_b);
        let signature = self.ctx.sign(&transcript)?;

        let mut record = [0u8; PHASE4_SIZE];
        record[..40].copy_from_slice(&signature);
        rand::rng().fill_bytes(&mut record[40..]);
        self.encryptor
            .as_mut()
            .expect("encryptor installed by phase2")
            .process(&mut record);

        self.progress = Progress::Complete;
        Ok(record)
    }

    /// Consume the completed handshake, yielding the session's CBC
    /// contexts (chaining state intact) and the remote descriptor.
    pub fn into_transport(
        self,
    ) -> Result<(CbcEncryptor, CbcDecryptor, RouterInfo), HandshakeError> {
        if self.progress != Progress::Complete {
            return Err(ProtocolError::WrongState {
                expected: "complete",
                got: self.progress.name(),
            }
            .into());
        }
        let encryptor = self.encryptor.expect("ciphers installed by phase2");
        let decryptor = self.decryptor.expect("ciphers installed by phase2");
        Ok((encryptor, decryptor, self.remote))
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("role", &self.role)
            .field("progress", &self.progress)
            .field("remote", &self.remote.ident_hash())
            .finish()
    }
}
