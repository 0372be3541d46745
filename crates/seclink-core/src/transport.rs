//! Byte transports the secure channel can run over.
//!
//! A transport is a reliable, ordered, full-duplex byte stream that can be
//! split into an owned read half and an owned write half, so each direction
//! of an endpoint can be driven from its own thread.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

/// A reliable, ordered, bidirectional byte stream.
pub trait Transport: Read + Write + Sized {
    type ReadHalf: Read + Send + 'static;
    type WriteHalf: Write + Close + Send + 'static;

    /// Split into independently owned halves.
    fn into_split(self) -> io::Result<(Self::ReadHalf, Self::WriteHalf)>;
}

/// Connection teardown, reachable from the write half alone.
///
/// Socket halves produced by `try_clone` share one connection, so dropping
/// one of them sends nothing to the peer.
pub trait Close {
    /// Stop sending. The peer reads EOF once queued data drains; our read
    /// side stays usable.
    fn close_write(&mut self) -> io::Result<()>;

    /// Tear the connection down in both directions.
    fn close(&mut self) -> io::Result<()>;
}

fn ignore_not_connected(result: io::Result<()>) -> io::Result<()> {
    match result {
        // The peer may already have torn the connection down.
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

impl Transport for TcpStream {
    type ReadHalf = Self;
    type WriteHalf = Self;

    fn into_split(self) -> io::Result<(Self, Self)> {
        let reader = self.try_clone()?;
        Ok((reader, self))
    }
}

impl Close for TcpStream {
    fn close_write(&mut self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Write))
    }

    fn close(&mut self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Both))
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    type ReadHalf = Self;
    type WriteHalf = Self;

    fn into_split(self) -> io::Result<(Self, Self)> {
        let reader = self.try_clone()?;
        Ok((reader, self))
    }
}

#[cfg(unix)]
impl Close for std::os::unix::net::UnixStream {
    fn close_write(&mut self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Write))
    }

    fn close(&mut self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Both))
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    //! In-memory duplex pipe for tests.
    //!
    //! Writes never block; reads block until data arrives or the peer's
    //! write half is dropped or shut down, which reads as EOF.

    use std::io::{self, Read, Write};
    use std::sync::mpsc::{Receiver, Sender, channel};

    use super::{Close, Transport};

    /// Receiving half of a memory pipe.
    #[derive(Debug)]
    pub struct MemoryReader {
        rx: Receiver<Vec<u8>>,
        pending: Vec<u8>,
        pos: usize,
    }

    /// Sending half of a memory pipe. `None` once shut down.
    #[derive(Debug)]
    pub struct MemoryWriter {
        tx: Option<Sender<Vec<u8>>>,
    }

    /// One end of a connected in-memory duplex pair.
    #[derive(Debug)]
    pub struct MemoryStream {
        reader: MemoryReader,
        writer: MemoryWriter,
    }

    /// Create two connected in-memory streams.
    pub fn duplex() -> (MemoryStream, MemoryStream) {
        let (a_tx, b_rx) = channel();
        let (b_tx, a_rx) = channel();
        (MemoryStream::new(a_rx, a_tx), MemoryStream::new(b_rx, b_tx))
    }

    impl MemoryStream {
        fn new(rx: Receiver<Vec<u8>>, tx: Sender<Vec<u8>>) -> Self {
            Self {
                reader: MemoryReader {
                    rx,
                    pending: Vec::new(),
                    pos: 0,
                },
                writer: MemoryWriter { tx: Some(tx) },
            }
        }
    }

    impl Read for MemoryReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            while self.pos == self.pending.len() {
                match self.rx.recv() {
                    Ok(chunk) => {
                        self.pending = chunk;
                        self.pos = 0;
                    }
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.pending.len() - self.pos);
            buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for MemoryWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
            if buf.is_empty() {
                return Ok(0);
            }
            tx.send(buf.to_vec())
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Read for MemoryStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reader.read(buf)
        }
    }

    impl Write for MemoryStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writer.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.writer.flush()
        }
    }

    impl Transport for MemoryStream {
        type ReadHalf = MemoryReader;
        type WriteHalf = MemoryWriter;

        fn into_split(self) -> io::Result<(MemoryReader, MemoryWriter)> {
            Ok((self.reader, self.writer))
        }
    }

    impl Close for MemoryWriter {
        fn close_write(&mut self) -> io::Result<()> {
            self.tx = None;
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.close_write()
        }
    }
}
