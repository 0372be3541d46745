//! TCP dialer and acceptor.

use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::ChannelConfig;
use crate::endpoint::Endpoint;
use crate::error::Result;

/// Connect to `addr` and run the handshake as the dialing side.
pub fn dial<A: ToSocketAddrs>(addr: A, config: &ChannelConfig) -> Result<Endpoint<TcpStream>> {
    config.validate()?;
    let stream = TcpStream::connect(addr)?;
    let peer = stream.peer_addr()?;
    let endpoint = secure(stream, config)?;
    tracing::info!(%peer, fingerprint = %endpoint.peer_fingerprint(), "secure connection established");
    Ok(endpoint)
}

/// Prepare a connected socket and run the handshake over it.
fn secure(stream: TcpStream, config: &ChannelConfig) -> Result<Endpoint<TcpStream>> {
    stream.set_nodelay(config.nodelay)?;
    set_timeouts(&stream, config.handshake_timeout())?;
    let endpoint = Endpoint::with_config(stream, config)?;
    set_timeouts(endpoint.transport(), config.io_timeout())?;
    Ok(endpoint)
}

fn set_timeouts(stream: &TcpStream, timeout: Option<Duration>) -> std::io::Result<()> {
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)
}

/// Listens for TCP connections and hands out secure endpoints.
#[derive(Debug)]
pub struct SecureListener {
    listener: TcpListener,
    config: ChannelConfig,
}

impl SecureListener {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(addr)?;
        tracing::info!(addr = %listener.local_addr()?, "secure listener bound");
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Wait for the next connection without running the handshake.
    ///
    /// Hand the result to a worker thread and call
    /// [`PendingConnection::handshake`] there, so a silent client cannot
    /// hold up the accept loop.
    pub fn accept_pending(&self) -> Result<PendingConnection> {
        let (stream, peer) = self.listener.accept()?;
        tracing::debug!(%peer, "accepted connection");
        Ok(PendingConnection {
            stream,
            peer,
            config: self.config.clone(),
        })
    }

    /// Wait for the next connection and run the handshake on this thread.
    ///
    /// Blocks until the handshake finishes or times out. A failed handshake
    /// is returned as an error; the listener stays usable.
    pub fn accept(&self) -> Result<(Endpoint<TcpStream>, SocketAddr)> {
        let pending = self.accept_pending()?;
        let peer = pending.peer_addr();
        Ok((pending.handshake()?, peer))
    }

    /// Endless iterator over accepted, not yet secured connections.
    pub const fn incoming(&self) -> Incoming<'_> {
        Incoming { listener: self }
    }
}

/// An accepted TCP connection whose handshake has not run yet.
#[derive(Debug)]
pub struct PendingConnection {
    stream: TcpStream,
    peer: SocketAddr,
    config: ChannelConfig,
}

impl PendingConnection {
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Run the handshake on the calling thread.
    pub fn handshake(self) -> Result<Endpoint<TcpStream>> {
        let endpoint = secure(self.stream, &self.config)?;
        tracing::info!(peer = %self.peer, fingerprint = %endpoint.peer_fingerprint(), "accepted secure connection");
        Ok(endpoint)
    }
}

/// Iterator returned by [`SecureListener::incoming`].
#[derive(Debug)]
pub struct Incoming<'a> {
    listener: &'a SecureListener,
}

impl Iterator for Incoming<'_> {
    type Item = Result<PendingConnection>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.listener.accept_pending())
    }
}
