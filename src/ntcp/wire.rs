//! Wire layouts for handshake records and post-handshake frames.
//!
//! All multi-byte fields are big-endian. Handshake records are fixed
//! size and built into caller-owned buffers; frames are variable and
//! sealed in place around a payload already positioned at offset 2.
//!
//! ## Frame layout
//!
//! ```text
//! [size:2 BE][payload:size][padding:p][adler32:4 BE]
//! ```
//!
//! where `p` makes the whole frame a multiple of 16. A frame with
//! `size == 0` is a time-sync keep-alive whose payload is a 4-byte
//! big-endian Unix timestamp occupying the padding region.

use super::{PHASE1_SIZE, SIGNED_DATA_SIZE};
use crate::crypto::adler32;
use crate::identity::{IdentHash, IDENTITY_PUBLIC_SIZE};
use rand::RngCore;

/// Frame overhead outside the payload: size prefix plus checksum.
pub const FRAME_OVERHEAD: usize = 6;

/// Padding needed for a payload of `len` bytes.
pub fn frame_padding(len: usize) -> usize {
    (16 - (len + FRAME_OVERHEAD) % 16) % 16
}

/// Total frame length for a payload of `len` bytes. Always a multiple
/// of 16.
pub fn frame_len(len: usize) -> usize {
    len + frame_padding(len) + FRAME_OVERHEAD
}

/// The Phase1 obfuscated hash: `SHA-256(pubKey) XOR H(ident)`.
pub fn hx_xor_hi(public_key: &[u8; IDENTITY_PUBLIC_SIZE], ident: &IdentHash) -> [u8; 32] {
    let mut out = crate::crypto::sha256(public_key);
    for (byte, ident_byte) in out.iter_mut().zip(ident.as_bytes()) {
        *byte ^= ident_byte;
    }
    out
}

/// Build the cleartext Phase1 record.
pub fn build_phase1(
    public_key: &[u8; IDENTITY_PUBLIC_SIZE],
    remote_ident: &IdentHash,
) -> [u8; PHASE1_SIZE] {
    let mut record = [0u8; PHASE1_SIZE];
    record[..IDENTITY_PUBLIC_SIZE].copy_from_slice(public_key);
    record[IDENTITY_PUBLIC_SIZE..].copy_from_slice(&hx_xor_hi(public_key, remote_ident));
    record
}

/// Build the 552-byte signed transcript for Phase3/Phase4.
pub fn signed_data(
    x: &[u8; IDENTITY_PUBLIC_SIZE],
    y: &[u8; IDENTITY_PUBLIC_SIZE],
    ident: &IdentHash,
    ts_a: u32,
    ts_b: u32,
) -> [u8; SIGNED_DATA_SIZE] {
    let mut out = [0u8; SIGNED_DATA_SIZE];
    out[..256].copy_from_slice(x);
    out[256..512].copy_from_slice(y);
    out[512..544].copy_from_slice(ident.as_bytes());
    out[544..548].copy_from_slice(&ts_a.to_be_bytes());
    out[548..552].copy_from_slice(&ts_b.to_be_bytes());
    out
}

/// Seal a frame in place around the payload at `buf[2..2 + len]`.
///
/// Writes the size prefix, fills the padding with random bytes, and
/// appends the Adler-32 over everything before the checksum. Returns
/// the total frame length; the caller encrypts `buf[..total]`.
pub fn seal_frame(buf: &mut [u8], len: usize) -> usize {
    debug_assert!(len <= u16::MAX as usize);
    buf[..2].copy_from_slice(&(len as u16).to_be_bytes());
    seal_frame_raw(buf, len)
}

/// Seal a time-sync keep-alive frame: `size == 0` with the timestamp
/// where the payload would start. Always exactly one AES block.
pub fn seal_keepalive(timestamp: u32) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[2..6].copy_from_slice(&timestamp.to_be_bytes());
    let total = seal_frame_raw(&mut buf, 4);
    debug_assert_eq!(total, 16);
    buf
}

// Padding and checksum only; the size prefix is the caller's. The
// keep-alive leaves it zero while its timestamp occupies the payload
// region.
fn seal_frame_raw(buf: &mut [u8], len: usize) -> usize {
    let padding = frame_padding(len);
    let total = len + padding + FRAME_OVERHEAD;
    debug_assert!(buf.len() >= total);
    rand::rng().fill_bytes(&mut buf[2 + len..2 + len + padding]);
    let checksum = adler32(&buf[..2 + len + padding]);
    buf[2 + len + padding..total].copy_from_slice(&checksum.to_be_bytes());
    total
}

/// Verify the Adler-32 trailer of a complete plaintext frame.
pub fn verify_frame_checksum(frame: &[u8]) -> bool {
    if frame.len() < FRAME_OVERHEAD {
        return false;
    }
    let body = &frame[..frame.len() - 4];
    let expected = u32::from_be_bytes(
        frame[frame.len() - 4..]
            .try_into()
            .expect("four checksum bytes"),
    );
    adler32(body) == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RouterContext;

    #[test]
    fn test_frame_sizes() {
        // 14-byte payload: 14 + 2 + 12 + 4 = 32.
        assert_eq!(frame_len(14), 32);
        assert_eq!(frame_padding(14), 12);
        // 10-byte payload fits a single block: 10 + 2 + 0 + 4 = 16.
        assert_eq!(frame_len(10), 16);
        assert_eq!(frame_padding(10), 0);
        // Keep-alive: 4-byte timestamp payload, one block.
        assert_eq!(frame_len(4), 16);
    }

    #[test]
    fn test_frame_len_always_block_multiple() {
        for len in 0..2048 {
            let total = frame_len(len);
            assert_eq!(total % 16, 0, "len {len}");
            assert_eq!(total, len + 2 + frame_padding(len) + 4, "len {len}");
        }
    }

    #[test]
    fn test_seal_frame_checksum_round_trip() {
        for len in [0usize, 1, 10, 14, 100, 1000] {
            let mut buf = vec![0u8; frame_len(len)];
            for (i, b) in buf[2..2 + len].iter_mut().enumerate() {
                *b = i as u8;
            }
            let total = seal_frame(&mut buf, len);
            assert_eq!(total, frame_len(len));
            assert!(verify_frame_checksum(&buf[..total]));

            // Any single corrupted byte breaks the checksum.
            buf[total / 2] ^= 1;
            assert!(!verify_frame_checksum(&buf[..total]));
        }
    }

    #[test]
    fn test_keepalive_layout() {
        let frame = seal_keepalive(0x1122_3344);
        assert_eq!(&frame[..2], &[0, 0]);
        assert_eq!(&frame[2..6], &[0x11, 0x22, 0x33, 0x44]);
        assert!(verify_frame_checksum(&frame));
    }

    #[test]
    fn test_hx_xor_hi_recovers_ident() {
        let ctx = RouterContext::generate();
        let remote = RouterContext::generate();
        let record = build_phase1(&ctx.identity().public_key, remote.ident_hash());

        // XORing the obfuscated hash with SHA-256(X) yields the ident.
        let digest = crate::crypto::sha256(&record[..256]);
        let mut recovered = [0u8; 32];
        for i in 0..32 {
            recovered[i] = record[256 + i] ^ digest[i];
        }
        assert_eq!(&recovered, remote.ident_hash().as_bytes());
    }

    #[test]
    fn test_signed_data_layout() {
        let x = [0xAA; 256];
        let y = [0xBB; 256];
        let ident = IdentHash::from_bytes([0xCC; 32]);
        let data = signed_data(&x, &y, &ident, 0x01020304, 0x0A0B0C0D);

        assert_eq!(&data[..256], &x[..]);
        assert_eq!(&data[256..512], &y[..]);
        assert_eq!(&data[512..544], ident.as_bytes());
        assert_eq!(&data[544..548], &[1, 2, 3, 4]);
        assert_eq!(&data[548..552], &[0x0A, 0x0B, 0x0C, 0x0D]);
    }
}
