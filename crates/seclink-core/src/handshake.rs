//! Unauthenticated public key exchange.
//!
//! Each side writes its raw 32-byte public key, then reads the peer's 32
//! bytes, then derives the shared key. There is no framing, magic number, or
//! version. Both sides perform the same steps, so write-then-read cannot
//! deadlock on any transport that buffers 32 bytes.
//!
//! Nothing here authenticates the peer: an active attacker can sit in the
//! middle. Callers that need identity must compare
//! [`Session::peer_fingerprint`] against a pinned value or run over an
//! authenticated transport.

use std::io::{self, Read, Write};

use seclink_crypto::{KEY_SIZE, KeyPair, PublicKey, SharedKey, fingerprint_of};

use crate::error::HandshakeError;

/// Outcome of a successful key exchange.
#[derive(Debug)]
pub struct Session {
    pub shared_key: SharedKey,
    pub local: KeyPair,
    pub peer_public: PublicKey,
}

impl Session {
    /// Fingerprint of the peer's public key.
    pub fn peer_fingerprint(&self) -> String {
        fingerprint_of(self.peer_public.as_bytes())
    }
}

/// Run the handshake with a freshly generated ephemeral keypair.
pub fn handshake<T: Read + Write + ?Sized>(transport: &mut T) -> Result<Session, HandshakeError> {
    let local = KeyPair::generate()?;
    handshake_with(transport, local)
}

/// Run the handshake with a caller-supplied keypair.
pub fn handshake_with<T: Read + Write + ?Sized>(
    transport: &mut T,
    local: KeyPair,
) -> Result<Session, HandshakeError> {
    transport.write_all(&local.public_bytes())?;
    transport.flush()?;

    let mut peer = [0u8; KEY_SIZE];
    let received = read_key(transport, &mut peer)?;
    if received < KEY_SIZE {
        return Err(HandshakeError::Truncated { received });
    }

    let peer_public = PublicKey::from(peer);
    let shared_key = SharedKey::precompute(&peer_public, local.secret());
    let session = Session {
        shared_key,
        local,
        peer_public,
    };
    tracing::debug!(peer = %session.peer_fingerprint(), "handshake complete");
    Ok(session)
}

fn read_key<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8; KEY_SIZE]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < KEY_SIZE {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
