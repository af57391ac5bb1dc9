//! Streaming AES-256-CBC contexts.
//!
//! A session keeps one encryptor and one decryptor alive for its whole
//! lifetime: the handshake's last ciphertext block becomes the IV for
//! the first post-handshake frame, and every frame continues the chain.
//! The wrappers below preserve that chaining state across calls, which
//! is why they hold `cbc` mode objects instead of doing one-shot
//! encrypts.

use aes::Aes256;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::fmt;

/// AES block size in bytes. All wire records and frames are sized to a
/// multiple of this.
pub const AES_BLOCK_SIZE: usize = 16;

/// Chained AES-256-CBC encryption context.
pub struct CbcEncryptor {
    inner: cbc::Encryptor<Aes256>,
}

impl CbcEncryptor {
    /// Create a context with the given key and starting IV.
    pub fn new(key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Self {
            inner: cbc::Encryptor::<Aes256>::new(key.into(), iv.into()),
        }
    }

    /// Encrypt `data` in place. Length must be a multiple of 16.
    ///
    /// The chaining state carries over to the next call.
    pub fn process(&mut self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % AES_BLOCK_SIZE, 0);
        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            self.inner
                .encrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
    }
}

impl fmt::Debug for CbcEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CbcEncryptor")
            .field("key", &"[redacted]")
            .finish()
    }
}

/// Chained AES-256-CBC decryption context.
pub struct CbcDecryptor {
    inner: cbc::Decryptor<Aes256>,
}

impl CbcDecryptor {
    /// Create a context with the given key and starting IV.
    pub fn new(key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Self {
            inner: cbc::Decryptor::<Aes256>::new(key.into(), iv.into()),
        }
    }

    /// Decrypt `data` in place. Length must be a multiple of 16.
    pub fn process(&mut self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % AES_BLOCK_SIZE, 0);
        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            self.inner
                .decrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
    }

    /// Decrypt a single 16-byte block from `src` into `dst`.
    ///
    /// Used by the record layer, which drains its receive buffer in
    /// 16-byte strides directly into the message under reassembly.
    pub fn process_block(&mut self, src: &[u8], dst: &mut [u8]) {
        debug_assert_eq!(src.len(), AES_BLOCK_SIZE);
        debug_assert_eq!(dst.len(), AES_BLOCK_SIZE);
        self.inner.decrypt_block_b2b_mut(
            GenericArray::from_slice(src),
            GenericArray::from_mut_slice(dst),
        );
    }
}

impl fmt::Debug for CbcDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CbcDecryptor")
            .field("key", &"[redacted]")
            .finish()
    }
}
