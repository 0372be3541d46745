//! Wire frame codec.
//!
//! Layout of one frame:
//!
//! ```text
//!   offset  size  field
//!     0       4   length (u32 big-endian, bytes that follow)
//!     4      24   nonce
//!    28      16   Poly1305 tag
//!    44       n   XSalsa20 ciphertext
//! ```
//!
//! `nonce || tag || ciphertext` is exactly a NaCl box after precomputation,
//! so `length = 24 + 16 + n`. Frames are written back to back.

use std::io::{self, Read};
use std::ops::Range;

use seclink_crypto::{NONCE_SIZE, SharedKey, TAG_SIZE, random_nonce};

use crate::error::{FrameError, Result};

pub use seclink_crypto::KEY_SIZE;

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest frame on the wire, prefix included.
pub const MAX_FRAME_SIZE: usize = 32 * 1024;

/// Bytes added to every plaintext.
pub const FRAME_OVERHEAD: usize = LENGTH_PREFIX_SIZE + NONCE_SIZE + TAG_SIZE;

/// Largest plaintext carried by one frame (32 724 bytes).
pub const MAX_PLAINTEXT_SIZE: usize = MAX_FRAME_SIZE - FRAME_OVERHEAD;

/// Smallest legal value of the length field (empty plaintext).
pub const MIN_BODY_LENGTH: usize = NONCE_SIZE + TAG_SIZE;

/// Largest legal value of the length field.
pub const MAX_BODY_LENGTH: usize = MAX_FRAME_SIZE - LENGTH_PREFIX_SIZE;

const NONCE_OFFSET: usize = LENGTH_PREFIX_SIZE;
const TAG_OFFSET: usize = NONCE_OFFSET + NONCE_SIZE;
const CIPHERTEXT_OFFSET: usize = TAG_OFFSET + TAG_SIZE;

/// Total encoded size of a frame carrying `plaintext_len` bytes.
pub const fn frame_len(plaintext_len: usize) -> usize {
    plaintext_len + FRAME_OVERHEAD
}

const fn check_plaintext(len: usize) -> std::result::Result<(), FrameError> {
    if len > MAX_PLAINTEXT_SIZE {
        return Err(FrameError::TooLarge {
            size: len,
            max: MAX_PLAINTEXT_SIZE,
        });
    }
    Ok(())
}

/// Encode one frame into the front of `out`, returning the frame length.
///
/// `out` must hold at least [`frame_len`] bytes.
pub fn encode_into(plaintext: &[u8], key: &SharedKey, out: &mut [u8]) -> Result<usize> {
    check_plaintext(plaintext.len())?;
    let total = frame_len(plaintext.len());
    if out.len() < total {
        return Err(FrameError::TooLarge {
            size: total,
            max: out.len(),
        }
        .into());
    }

    let nonce = random_nonce()?;
    let body_len = u32::try_from(total - LENGTH_PREFIX_SIZE).map_err(|_| FrameError::TooLarge {
        size: plaintext.len(),
        max: MAX_PLAINTEXT_SIZE,
    })?;

    out[..NONCE_OFFSET].copy_from_slice(&body_len.to_be_bytes());
    out[NONCE_OFFSET..TAG_OFFSET].copy_from_slice(&nonce);
    out[CIPHERTEXT_OFFSET..total].copy_from_slice(plaintext);
    let tag = key.seal_in_place(&nonce, &mut out[CIPHERTEXT_OFFSET..total])?;
    out[TAG_OFFSET..CIPHERTEXT_OFFSET].copy_from_slice(&tag);
    Ok(total)
}

/// Encode one frame and append it to `out`.
pub fn encode(plaintext: &[u8], key: &SharedKey, out: &mut Vec<u8>) -> Result<()> {
    check_plaintext(plaintext.len())?;
    let start = out.len();
    out.resize(start + frame_len(plaintext.len()), 0);
    if let Err(e) = encode_into(plaintext, key, &mut out[start..]) {
        out.truncate(start);
        return Err(e);
    }
    Ok(())
}

/// Validate an announced length prefix.
pub fn parse_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> std::result::Result<usize, FrameError> {
    let length = u32::from_be_bytes(prefix) as usize;
    if length < MIN_BODY_LENGTH {
        return Err(FrameError::InvalidLength { length });
    }
    if length > MAX_BODY_LENGTH {
        return Err(FrameError::TooLarge {
            size: length,
            max: MAX_BODY_LENGTH,
        });
    }
    Ok(length)
}

/// Read and verify one frame from `reader`.
///
/// Returns `Ok(None)` on a clean EOF before the first byte of a frame, or
/// the range of the decrypted plaintext inside `buf`.
pub fn decode<R: Read + ?Sized>(
    reader: &mut R,
    key: &SharedKey,
    buf: &mut Vec<u8>,
) -> Result<Option<Range<usize>>> {
    let mut started = false;
    decode_tracked(reader, key, buf, &mut started)
}

/// [`decode`], recording in `started` whether any byte of a frame was consumed.
pub(crate) fn decode_tracked<R: Read + ?Sized>(
    reader: &mut R,
    key: &SharedKey,
    buf: &mut Vec<u8>,
    started: &mut bool,
) -> Result<Option<Range<usize>>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match read_full(reader, &mut prefix, started)? {
        0 => return Ok(None),
        LENGTH_PREFIX_SIZE => {}
        _ => return Err(FrameError::TruncatedFrame.into()),
    }
    let length = parse_length(prefix)?;

    buf.clear();
    buf.resize(length, 0);
    if read_full(reader, buf, started)? < length {
        return Err(FrameError::TruncatedFrame.into());
    }

    let (head, ciphertext) = buf.split_at_mut(MIN_BODY_LENGTH);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&head[..NONCE_SIZE]);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&head[NONCE_SIZE..]);
    if key.open_in_place(&nonce, ciphertext, &tag).is_err() {
        buf.clear();
        return Err(FrameError::VerificationFailed.into());
    }

    tracing::trace!(length, "decoded frame");
    Ok(Some(MIN_BODY_LENGTH..length))
}

/// Fill `buf` unless EOF comes first; returns the number of bytes read.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8], started: &mut bool) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                *started = true;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
