//! Encrypting writer.
//!
//! Every successful [`Write::write`] call emits exactly one frame holding the
//! whole buffer. Buffers above [`MAX_PLAINTEXT_SIZE`] are rejected with
//! [`FrameError::TooLarge`] before anything reaches the transport; use
//! [`SecureWriter::write_chunks`] to spread a large buffer over several
//! frames.
//!
//! Dropping a writer whose read half is still alive sends nothing to the
//! peer; call [`SecureWriter::close`] to signal end of stream.

use std::io::{self, Write};

use seclink_crypto::{PublicKey, SharedKey, StaticSecret};

use crate::error::{Error, Result};
use crate::frame::{self, MAX_FRAME_SIZE, MAX_PLAINTEXT_SIZE};
use crate::transport::Close;

#[derive(Debug, Clone, Copy)]
enum WriteState {
    Open,
    /// A transport write failed part way; the peer's view of the stream is
    /// unknown.
    Poisoned(io::ErrorKind),
    Closed,
}

/// Encrypts plaintext into frames written to `W`.
#[derive(Debug)]
pub struct SecureWriter<W> {
    inner: W,
    key: SharedKey,
    scratch: Box<[u8]>,
    state: WriteState,
}

impl<W: Write> SecureWriter<W> {
    /// Wrap `inner`, deriving the shared key from our secret and the peer's
    /// public key.
    pub fn new(inner: W, our_secret: &StaticSecret, peer_public: &PublicKey) -> Self {
        Self::from_shared(inner, SharedKey::precompute(peer_public, our_secret))
    }

    /// Wrap `inner` with an already derived shared key.
    pub fn from_shared(inner: W, key: SharedKey) -> Self {
        Self {
            inner,
            key,
            scratch: vec![0u8; MAX_FRAME_SIZE].into_boxed_slice(),
            state: WriteState::Open,
        }
    }

    /// Whether an earlier transport failure has disabled this writer.
    pub const fn is_poisoned(&self) -> bool {
        matches!(self.state, WriteState::Poisoned(_))
    }

    pub const fn get_ref(&self) -> &W {
        &self.inner
    }

    pub const fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Seal `plaintext` into one frame and write it out.
    pub fn write_frame(&mut self, plaintext: &[u8]) -> Result<usize> {
        self.check_open()?;
        let len = frame::encode_into(plaintext, &self.key, &mut self.scratch)?;
        if let Err(e) = self.inner.write_all(&self.scratch[..len]) {
            tracing::warn!(error = %e, "secure writer poisoned");
            self.state = WriteState::Poisoned(e.kind());
            return Err(Error::Transport(e));
        }
        tracing::trace!(plaintext = plaintext.len(), "wrote frame");
        Ok(plaintext.len())
    }

    /// Write all of `src` as consecutive frames of at most `chunk_size`
    /// bytes. An empty `src` still produces one empty frame.
    ///
    /// If the transport fails part way, the frames already sent stay sent
    /// and the error is returned without a byte count; the writer is
    /// poisoned, so nothing more goes out on a stream of unknown state.
    pub fn write_chunks(&mut self, src: &[u8], chunk_size: usize) -> Result<usize> {
        if chunk_size == 0 || chunk_size > MAX_PLAINTEXT_SIZE {
            return Err(Error::Config(format!(
                "chunk size must be between 1 and {MAX_PLAINTEXT_SIZE}, got {chunk_size}"
            )));
        }
        if src.is_empty() {
            return self.write_frame(src);
        }
        for chunk in src.chunks(chunk_size) {
            self.write_frame(chunk)?;
        }
        Ok(src.len())
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            WriteState::Open => Ok(()),
            WriteState::Poisoned(kind) => Err(Error::Transport(io::Error::new(
                kind,
                "writer disabled by an earlier transport failure",
            ))),
            WriteState::Closed => Err(Error::Closed),
        }
    }
}

impl<W: Write + Close> SecureWriter<W> {
    /// Flush and half-close the transport so the peer reads EOF. The read
    /// half stays usable. Later writes fail with [`Error::Closed`]; closing
    /// again does nothing.
    pub fn close(&mut self) -> Result<()> {
        if matches!(self.state, WriteState::Closed) {
            return Ok(());
        }
        let flushed = self.inner.flush();
        self.state = WriteState::Closed;
        flushed?;
        self.inner.close_write()?;
        tracing::debug!("secure writer closed");
        Ok(())
    }
}

impl<W: Write> Write for SecureWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_frame(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.inner.flush()
    }
}
