//! Frame reassembly.
//!
//! Inbound ciphertext drains through the session's CBC context in
//! 16-byte strides. The first block of a frame reveals the big-endian
//! size prefix: zero means a time-sync keep-alive (one block, nothing
//! delivered), anything else starts a message that accumulates block
//! by block until the payload, padding, and checksum are in. CBC
//! chaining means a single skipped or reordered block desynchronizes
//! the stream permanently, so every failure here is fatal to the
//! session.

use crate::crypto::aes::AES_BLOCK_SIZE;
use crate::crypto::CbcDecryptor;
use crate::message::{NetworkMessage, MAX_MESSAGE_SIZE};
use crate::ntcp::wire::{self, FRAME_OVERHEAD};
use crate::ntcp::ProtocolError;

/// A message mid-reassembly.
struct Pending {
    msg: NetworkMessage,
    /// Payload size from the frame's size prefix.
    size: usize,
    /// Plaintext bytes accumulated so far, always a block multiple.
    received: usize,
}

/// Block-granular frame decoder.
pub(crate) struct RecordReader {
    decryptor: CbcDecryptor,
    pending: Option<Pending>,
}

impl RecordReader {
    pub(crate) fn new(decryptor: CbcDecryptor) -> Self {
        Self {
            decryptor,
            pending: None,
        }
    }

    /// Feed one 16-byte ciphertext block. Returns a message when the
    /// block completes one.
    pub(crate) fn push(
        &mut self,
        block: &[u8],
    ) -> Result<Option<NetworkMessage>, ProtocolError> {
        debug_assert_eq!(block.len(), AES_BLOCK_SIZE);

        match self.pending.as_mut() {
            None => {
                let mut msg = NetworkMessage::new();
                self.decryptor
                    .process_block(block, &mut msg.buf_mut()[..AES_BLOCK_SIZE]);

                let size = u16::from_be_bytes(
                    msg.buf()[..2].try_into().expect("two size bytes"),
                ) as usize;
                if size == 0 {
                    // Time-sync frame: the whole block (timestamp,
                    // padding, checksum) is consumed here.
                    return Ok(None);
                }
                if wire::frame_len(size) > MAX_MESSAGE_SIZE {
                    return Err(ProtocolError::FrameTooLarge { size });
                }
                self.pending = Some(Pending {
                    msg,
                    size,
                    received: AES_BLOCK_SIZE,
                });
            }
            Some(pending) => {
                let offset = pending.received;
                self.decryptor.process_block(
                    block,
                    &mut pending.msg.buf_mut()[offset..offset + AES_BLOCK_SIZE],
                );
                pending.received += AES_BLOCK_SIZE;
            }
        }

        // Payload, padding, and checksum all in?
        let complete = self
            .pending
            .as_ref()
            .is_some_and(|p| p.received >= p.size + FRAME_OVERHEAD);
        if !complete {
            return Ok(None);
        }

        let Pending {
            mut msg,
            size,
            received,
        } = self.pending.take().expect("completion checked above");

        if !wire::verify_frame_checksum(&msg.buf()[..received]) {
            return Err(ProtocolError::ChecksumMismatch);
        }
        msg.set_extent(2, size);
        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CbcEncryptor;

    const KEY: [u8; 32] = [0x11; 32];
    const IV: [u8; 16] = [0x99; 16];

    fn encrypt_frame(enc: &mut CbcEncryptor, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; wire::frame_len(payload.len())];
        frame[2..2 + payload.len()].copy_from_slice(payload);
        let total = wire::seal_frame(&mut frame, payload.len());
        enc.process(&mut frame[..total]);
        frame
    }

    fn push_all(
        reader: &mut RecordReader,
        frame: &[u8],
    ) -> Result<Vec<NetworkMessage>, ProtocolError> {
        let mut out = Vec::new();
        for block in frame.chunks(AES_BLOCK_SIZE) {
            if let Some(msg) = reader.push(block)? {
                out.push(msg);
            }
        }
        Ok(out)
    }

    #[test]
    fn test_single_frame_reassembly() {
        let mut enc = CbcEncryptor::new(&KEY, &IV);
        let mut reader = RecordReader::new(CbcDecryptor::new(&KEY, &IV));

        let payload: Vec<u8> = (0..100u8).collect();
        let frame = encrypt_frame(&mut enc, &payload);
        let messages = push_all(&mut reader, &frame).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload(), &payload[..]);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut enc = CbcEncryptor::new(&KEY, &IV);
        let mut reader = RecordReader::new(CbcDecryptor::new(&KEY, &IV));

        let mut stream = Vec::new();
        stream.extend(encrypt_frame(&mut enc, b"first"));
        stream.extend(encrypt_frame(&mut enc, b"second message, longer than a block"));
        stream.extend(encrypt_frame(&mut enc, b"third"));

        let messages = push_all(&mut reader, &stream).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].payload(), b"first");
        assert_eq!(
            messages[1].payload(),
            b"second message, longer than a block"
        );
        assert_eq!(messages[2].payload(), b"third");
    }

    #[test]
    fn test_keepalive_emits_no_message() {
        let mut enc = CbcEncryptor::new(&KEY, &IV);
        let mut reader = RecordReader::new(CbcDecryptor::new(&KEY, &IV));

        let mut frame = wire::seal_keepalive(1_700_000_000).to_vec();
        enc.process(&mut frame);
        assert_eq!(frame.len(), 16);
        let messages = push_all(&mut reader, &frame).unwrap();
        assert!(messages.is_empty());

        // The stream stays in sync: a real message right after decodes.
        let frame = encrypt_frame(&mut enc, b"after keepalive");
        let messages = push_all(&mut reader, &frame).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload(), b"after keepalive");
    }

    #[test]
    fn test_corrupted_frame_fails_checksum() {
        let mut enc = CbcEncryptor::new(&KEY, &IV);
        let mut reader = RecordReader::new(CbcDecryptor::new(&KEY, &IV));

        let mut frame = encrypt_frame(&mut enc, b"some payload bytes here");
        let last = frame.len() - 1;
        frame[last] ^= 1;

        let err = push_all(&mut reader, &frame).unwrap_err();
        assert!(matches!(err, ProtocolError::ChecksumMismatch));
    }

    #[test]
    fn test_oversized_frame_read_as_desync() {
        // A size prefix past the frame limit cannot be a real frame;
        // it means the CBC stream lost sync.
        let mut block = [0u8; 16];
        block[..2].copy_from_slice(&0xFFFFu16.to_be_bytes());
        CbcEncryptor::new(&KEY, &IV).process(&mut block);

        let mut reader = RecordReader::new(CbcDecryptor::new(&KEY, &IV));
        assert!(matches!(
            reader.push(&block),
            Err(ProtocolError::FrameTooLarge { size: 0xFFFF })
        ));
    }
}
