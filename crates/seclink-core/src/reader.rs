//! Decrypting reader.
//!
//! [`SecureReader`] pulls frames from a transport on demand and exposes the
//! plaintext through [`Read`] and [`BufRead`]. A frame whose plaintext does
//! not fit the caller's buffer is kept and handed out over later reads.
//!
//! Any framing or authentication failure, and any transport failure after a
//! frame has started, leaves the stream position unknown. The reader then
//! latches that error and returns it on every later call without touching
//! the transport again.

use std::io::{self, BufRead, Read};
use std::ops::Range;

use seclink_crypto::{PublicKey, SharedKey, StaticSecret};

use crate::error::{Error, FrameError, Result};
use crate::frame::{self, MAX_BODY_LENGTH};

#[derive(Debug, Clone)]
enum Latched {
    Frame(FrameError),
    Transport(io::ErrorKind),
}

#[derive(Debug, Clone)]
enum ReadState {
    Open,
    Poisoned(Latched),
}

/// Reads framed ciphertext from `R` and yields plaintext.
#[derive(Debug)]
pub struct SecureReader<R> {
    inner: R,
    key: SharedKey,
    /// Body of the most recent frame, decrypted in place.
    frame: Vec<u8>,
    /// Unread plaintext inside `frame`.
    residue: Range<usize>,
    state: ReadState,
}

impl<R: Read> SecureReader<R> {
    /// Wrap `inner`, deriving the shared key from our secret and the peer's
    /// public key.
    pub fn new(inner: R, our_secret: &StaticSecret, peer_public: &PublicKey) -> Self {
        Self::from_shared(inner, SharedKey::precompute(peer_public, our_secret))
    }

    /// Wrap `inner` with an already derived shared key.
    pub fn from_shared(inner: R, key: SharedKey) -> Self {
        Self {
            inner,
            key,
            frame: Vec::with_capacity(MAX_BODY_LENGTH),
            residue: 0..0,
            state: ReadState::Open,
        }
    }

    /// Number of decrypted bytes waiting to be read.
    pub const fn buffered(&self) -> usize {
        self.residue.end - self.residue.start
    }

    /// Whether an earlier failure has disabled this reader.
    pub const fn is_poisoned(&self) -> bool {
        matches!(self.state, ReadState::Poisoned(_))
    }

    pub const fn get_ref(&self) -> &R {
        &self.inner
    }

    pub const fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap the transport, discarding any buffered plaintext.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Copy plaintext into `dst`, decoding a new frame only when nothing is
    /// buffered. Returns `Ok(0)` on a clean end of stream.
    pub fn read_plaintext(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        if dst.is_empty() {
            return Ok(0);
        }
        if self.buffered() == 0 && !self.next_frame()? {
            return Ok(0);
        }
        let n = dst.len().min(self.buffered());
        let start = self.residue.start;
        dst[..n].copy_from_slice(&self.frame[start..start + n]);
        self.residue.start += n;
        Ok(n)
    }

    fn check_open(&self) -> Result<()> {
        match &self.state {
            ReadState::Open => Ok(()),
            ReadState::Poisoned(Latched::Frame(e)) => Err(e.clone().into()),
            ReadState::Poisoned(Latched::Transport(kind)) => Err(Error::Transport(io::Error::new(
                *kind,
                "reader disabled by an earlier transport failure",
            ))),
        }
    }

    /// Decode frames until one carries plaintext. Returns `false` on EOF.
    fn next_frame(&mut self) -> Result<bool> {
        loop {
            let mut started = false;
            match frame::decode_tracked(&mut self.inner, &self.key, &mut self.frame, &mut started) {
                Ok(Some(range)) if range.is_empty() => {}
                Ok(Some(range)) => {
                    self.residue = range;
                    return Ok(true);
                }
                Ok(None) => return Ok(false),
                Err(err) => {
                    self.latch(&err, started);
                    return Err(err);
                }
            }
        }
    }

    fn latch(&mut self, err: &Error, started: bool) {
        let latched = match err {
            Error::Frame(e) => Latched::Frame(e.clone()),
            Error::Transport(e) if started => Latched::Transport(e.kind()),
            _ => return,
        };
        tracing::warn!(error = %err, "secure reader poisoned");
        self.frame.clear();
        self.residue = 0..0;
        self.state = ReadState::Poisoned(latched);
    }
}

impl<R: Read> Read for SecureReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_plaintext(buf)?)
    }
}

impl<R: Read> BufRead for SecureReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.check_open()?;
        if self.buffered() == 0 && !self.next_frame()? {
            return Ok(&[]);
        }
        Ok(&self.frame[self.residue.clone()])
    }

    fn consume(&mut self, amt: usize) {
        self.residue.start = (self.residue.start + amt).min(self.residue.end);
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use seclink_crypto::test_shared_pair;

    use super::*;
    use crate::error::frame_error;
    use crate::frame::{LENGTH_PREFIX_SIZE, MAX_PLAINTEXT_SIZE, encode};

    fn stream_of(messages: &[&[u8]], key: &SharedKey) -> Vec<u8> {
        let mut out = Vec::new();
        for msg in messages {
            encode(msg, key, &mut out).unwrap();
        }
        out
    }

    /// Counts calls so tests can prove the transport is left alone.
    struct CountingReader<R> {
        inner: R,
        calls: usize,
    }

    impl<R: Read> Read for CountingReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            self.inner.read(buf)
        }
    }

    #[test]
    fn reads_small_message_into_large_buffer() {
        let (a, b) = test_shared_pair().unwrap();
        let mut reader = SecureReader::from_shared(Cursor::new(stream_of(&[b"hello world\n"], &a)), b);
        let mut buf = [0u8; 1024];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world\n");
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn short_reads_keep_the_remainder_buffered() {
        let (a, b) = test_shared_pair().unwrap();
        let plaintext: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut reader = SecureReader::from_shared(Cursor::new(stream_of(&[&plaintext], &a)), b);

        let mut collected = Vec::new();
        for _ in 0..5 {
            let mut buf = [0u8; 100];
            assert_eq!(reader.read(&mut buf).unwrap(), 100);
            collected.extend_from_slice(&buf);
        }
        assert_eq!(collected, plaintext[..500]);
        assert_eq!(reader.buffered(), 500);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, plaintext[500..]);
    }

    #[test]
    fn read_never_spans_two_frames() {
        let (a, b) = test_shared_pair().unwrap();
        let mut reader = SecureReader::from_shared(Cursor::new(stream_of(&[b"abc", b"defg"], &a)), b);
        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"defg");
    }

    #[test]
    fn arbitrary_read_sizes_reassemble_the_stream() {
        let (a, b) = test_shared_pair().unwrap();
        let messages: Vec<Vec<u8>> = (0..20usize)
            .map(|i| (0..i * 97).map(|j| (i + j) as u8).collect())
            .collect();
        let refs: Vec<&[u8]> = messages.iter().map(Vec::as_slice).collect();
        let mut reader = SecureReader::from_shared(Cursor::new(stream_of(&refs, &a)), b);

        let mut out = Vec::new();
        let sizes = [1usize, 7, 64, 3, 500, 13];
        let mut i = 0;
        loop {
            let mut buf = vec![0u8; sizes[i % sizes.len()]];
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
            i += 1;
        }
        assert_eq!(out, messages.concat());
    }

    #[test]
    fn empty_frames_are_skipped_not_eof() {
        let (a, b) = test_shared_pair().unwrap();
        let mut reader =
            SecureReader::from_shared(Cursor::new(stream_of(&[b"", b"", b"data", b""], &a)), b);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "data");
    }

    #[test]
    fn buf_read_lines() {
        let (a, b) = test_shared_pair().unwrap();
        let mut reader =
            SecureReader::from_shared(Cursor::new(stream_of(&[b"one\ntw", b"o\nthree"], &a)), b);
        let lines: Vec<String> = (&mut reader).lines().map(io::Result::unwrap).collect();
        assert_eq!(lines, ["one", "two", "three"]);
    }

    #[test]
    fn verification_failure_poisons_reader() {
        let (a, b) = test_shared_pair().unwrap();
        let mut bytes = stream_of(&[b"tampered", b"never seen"], &a);
        bytes[LENGTH_PREFIX_SIZE + 30] ^= 0x01;

        let mut reader = SecureReader::from_shared(
            CountingReader {
                inner: Cursor::new(bytes),
                calls: 0,
            },
            b,
        );
        let mut buf = [0u8; 64];
        for _ in 0..3 {
            let err = reader.read(&mut buf).unwrap_err();
            assert_eq!(frame_error(&err), Some(&FrameError::VerificationFailed));
        }
        assert!(reader.is_poisoned());
        assert_eq!(reader.buffered(), 0);
        assert_eq!(reader.get_ref().calls, 2);
    }

    #[test]
    fn truncation_poisons_reader() {
        let (a, b) = test_shared_pair().unwrap();
        let bytes = stream_of(&[b"cut"], &a);
        let mut reader = SecureReader::from_shared(Cursor::new(bytes[..bytes.len() - 1].to_vec()), b);
        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(frame_error(&err), Some(&FrameError::TruncatedFrame));
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(frame_error(&err), Some(&FrameError::TruncatedFrame));
    }

    #[test]
    fn attacker_length_is_rejected_as_too_large() {
        let (_, b) = test_shared_pair().unwrap();
        let announced = u32::try_from(MAX_PLAINTEXT_SIZE + 24 + 16 + 1).unwrap();
        let mut bytes = announced.to_be_bytes().to_vec();
        bytes.resize(LENGTH_PREFIX_SIZE + 128, 0xAA);

        let mut reader = SecureReader::from_shared(Cursor::new(bytes), b);
        let mut buf = [0u8; 64];
        let err = reader.read(&mut buf).unwrap_err();
        assert!(matches!(frame_error(&err), Some(FrameError::TooLarge { .. })));
        assert_eq!(reader.get_ref().position(), LENGTH_PREFIX_SIZE as u64);
    }

    #[test]
    fn transport_error_between_frames_does_not_poison() {
        struct Flaky {
            failed: bool,
            inner: Cursor<Vec<u8>>,
        }
        impl Read for Flaky {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if !self.failed {
                    self.failed = true;
                    return Err(io::ErrorKind::TimedOut.into());
                }
                self.inner.read(buf)
            }
        }

        let (a, b) = test_shared_pair().unwrap();
        let mut reader = SecureReader::from_shared(
            Flaky {
                failed: false,
                inner: Cursor::new(stream_of(&[b"after timeout"], &a)),
            },
            b,
        );
        let mut buf = [0u8; 32];
        assert_eq!(
            reader.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::TimedOut
        );
        assert!(!reader.is_poisoned());
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"after timeout");
    }

    #[test]
    fn key_from_raw_halves_matches_peer() {
        let alice = seclink_crypto::KeyPair::generate().unwrap();
        let bob = seclink_crypto::KeyPair::generate().unwrap();
        let sender = SharedKey::precompute(bob.public_key(), alice.secret());
        let mut reader = SecureReader::new(
            Cursor::new(stream_of(&[b"for bob"], &sender)),
            bob.secret(),
            alice.public_key(),
        );
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"for bob");
    }
}
