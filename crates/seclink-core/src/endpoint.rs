//! Secure endpoint: handshake, then an encrypted duplex stream.

use std::io::{self, Read, Write};

use seclink_crypto::{KeyPair, PublicKey, fingerprint_of};

use crate::config::ChannelConfig;
use crate::error::{Error, HandshakeError, Result};
use crate::frame::MAX_PLAINTEXT_SIZE;
use crate::handshake::{Session, handshake_with};
use crate::reader::SecureReader;
use crate::transport::{Close, Transport};
use crate::writer::SecureWriter;

/// An encrypted, authenticated byte stream over transport `T`.
///
/// Reads and writes go through independent halves; use [`Endpoint::split`]
/// to drive them from different threads.
pub struct Endpoint<T: Transport> {
    reader: SecureReader<T::ReadHalf>,
    writer: SecureWriter<T::WriteHalf>,
    local_public: PublicKey,
    peer_public: PublicKey,
    chunk_size: Option<usize>,
    closed: bool,
}

impl<T: Transport> std::fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("peer", &self.peer_fingerprint())
            .field("chunk_size", &self.chunk_size)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Endpoint<T> {
    /// Handshake over `transport` with default settings.
    pub fn new(transport: T) -> Result<Self> {
        Self::with_config(transport, &ChannelConfig::default())
    }

    /// Handshake over `transport` with a fresh ephemeral keypair.
    pub fn with_config(transport: T, config: &ChannelConfig) -> Result<Self> {
        let local = KeyPair::generate().map_err(HandshakeError::from)?;
        Self::with_keypair(transport, local, config)
    }

    /// Handshake over `transport` using `local` as our keypair.
    ///
    /// On failure the transport is dropped, which closes it.
    pub fn with_keypair(mut transport: T, local: KeyPair, config: &ChannelConfig) -> Result<Self> {
        config.validate()?;
        let session = match handshake_with(&mut transport, local) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "handshake failed");
                return Err(e.into());
            }
        };
        let (read_half, write_half) = transport.into_split()?;
        Ok(Self::from_session(session, read_half, write_half, config.chunk_size))
    }

    fn from_session(
        session: Session,
        read_half: T::ReadHalf,
        write_half: T::WriteHalf,
        chunk_size: Option<usize>,
    ) -> Self {
        let Session {
            shared_key,
            local,
            peer_public,
        } = session;
        Self {
            reader: SecureReader::from_shared(read_half, shared_key.clone()),
            writer: SecureWriter::from_shared(write_half, shared_key),
            local_public: *local.public_key(),
            peer_public,
            chunk_size,
            closed: false,
        }
    }

    pub const fn peer_public_key(&self) -> &PublicKey {
        &self.peer_public
    }

    /// Fingerprint of the peer's public key, for pinning by upper layers.
    pub fn peer_fingerprint(&self) -> String {
        fingerprint_of(self.peer_public.as_bytes())
    }

    pub const fn local_public_key(&self) -> &PublicKey {
        &self.local_public
    }

    /// The write half of the transport. Socket options set here also apply
    /// to the read half.
    pub const fn transport(&self) -> &T::WriteHalf {
        self.writer.get_ref()
    }

    pub const fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    /// Split writes larger than `chunk_size` into several frames. `None`
    /// makes oversize writes fail instead.
    pub fn set_chunk_size(&mut self, chunk_size: Option<usize>) -> Result<()> {
        if let Some(size) = chunk_size {
            if size == 0 || size > MAX_PLAINTEXT_SIZE {
                return Err(Error::Config(format!(
                    "chunk size must be between 1 and {MAX_PLAINTEXT_SIZE}, got {size}"
                )));
            }
        }
        self.chunk_size = chunk_size;
        Ok(())
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shut the transport down. Later reads and writes fail with
    /// [`Error::Closed`]; closing again does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        Close::close(self.writer.get_mut())?;
        tracing::debug!(peer = %self.peer_fingerprint(), "endpoint closed");
        Ok(())
    }

    /// Separate the two directions for concurrent use.
    ///
    /// The writer owns the connection teardown: call [`SecureWriter::close`]
    /// when done sending so the peer sees EOF.
    pub fn split(self) -> (SecureReader<T::ReadHalf>, SecureWriter<T::WriteHalf>) {
        (self.reader, self.writer)
    }

    /// Read decrypted bytes into `dst`.
    pub fn read_plaintext(&mut self, dst: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.reader.read_plaintext(dst)
    }

    /// Encrypt and send `src`, as one frame or as chunks when a chunk size
    /// is set.
    pub fn write_plaintext(&mut self, src: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::Closed);
        }
        match self.chunk_size {
            Some(size) => self.writer.write_chunks(src, size),
            None => self.writer.write_frame(src),
        }
    }
}

impl<T: Transport> Read for Endpoint<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_plaintext(buf)?)
    }
}

impl<T: Transport> Write for Endpoint<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_plaintext(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(Error::Closed.into());
        }
        self.writer.flush()
    }
}
