//! In-memory transport for tests and simulations.
//!
//! [`MemoryTransport`] stands in for the serial port; the paired
//! [`MemoryPeer`] plays the microcontroller and can inject faults.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::debug;

use super::Transport;
use crate::error::TransportError;
use crate::protocol::{FrameAssembler, Message, decode, encode};

/// Read timeout used by [`MemoryTransport::pair`].
pub const DEFAULT_MEMORY_READ_TIMEOUT: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct LinkState {
    open: bool,
    opens: usize,
    closes: usize,
    failing_opens: usize,
    fail_next_read: bool,
    fail_next_write: bool,
}

/// Host side of an in-memory link.
pub struct MemoryTransport {
    state: Arc<Mutex<LinkState>>,
    from_peer: flume::Receiver<Bytes>,
    to_peer: flume::Sender<Bytes>,
    leftover: Mutex<BytesMut>,
    read_timeout: Duration,
}

/// Device side of an in-memory link.
#[derive(Clone)]
pub struct MemoryPeer {
    state: Arc<Mutex<LinkState>>,
    to_host: flume::Sender<Bytes>,
    from_host: flume::Receiver<Bytes>,
    assembler: Arc<Mutex<FrameAssembler>>,
}

impl MemoryTransport {
    /// Create a closed transport and its peer.
    #[must_use]
    pub fn pair() -> (Self, MemoryPeer) {
        Self::with_read_timeout(DEFAULT_MEMORY_READ_TIMEOUT)
    }

    /// Create a closed transport whose reads give up after `read_timeout`.
    #[must_use]
    pub fn with_read_timeout(read_timeout: Duration) -> (Self, MemoryPeer) {
        let state = Arc::new(Mutex::new(LinkState::default()));
        let (to_host, from_peer) = flume::unbounded();
        let (to_peer, from_host) = flume::unbounded();

        let transport = Self {
            state: Arc::clone(&state),
            from_peer,
            to_peer,
            leftover: Mutex::new(BytesMut::new()),
            read_timeout,
        };
        let peer = MemoryPeer {
            state,
            to_host,
            from_host,
            assembler: Arc::new(Mutex::new(FrameAssembler::new())),
        };

        (transport, peer)
    }

    fn take_leftover(&self, buf: &mut [u8]) -> usize {
        let mut leftover = self.leftover.lock();
        let n = leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&leftover[..n]);
        leftover.advance(n);
        n
    }
}

fn injected(operation: &'static str) -> TransportError {
    TransportError::Io(
        operation,
        io::Error::new(io::ErrorKind::BrokenPipe, "injected fault"),
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.opens += 1;
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(injected("open"));
        }
        state.open = true;
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        state.closes += 1;
        state.open = false;
    }

    fn is_valid(&self) -> bool {
        self.state.lock().open
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        {
            let mut state = self.state.lock();
            if !state.open {
                return Err(TransportError::Closed);
            }
            if state.fail_next_read {
                state.fail_next_read = false;
                return Err(injected("read"));
            }
        }

        let n = self.take_leftover(buf);
        if n > 0 {
            return Ok(n);
        }

        match tokio::time::timeout(self.read_timeout, self.from_peer.recv_async()).await {
            Ok(Ok(bytes)) => {
                self.leftover.lock().extend_from_slice(&bytes);
                Ok(self.take_leftover(buf))
            }
            Ok(Err(_)) => {
                // Peer gone: behave like a quiet line.
                tokio::time::sleep(self.read_timeout).await;
                Ok(0)
            }
            Err(_) => Ok(0),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock();
            if !state.open {
                return Err(TransportError::Closed);
            }
            if state.fail_next_write {
                state.fail_next_write = false;
                return Err(injected("write"));
            }
        }

        self.to_peer
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| TransportError::Closed)
    }
}

impl MemoryPeer {
    /// Send raw bytes to the host.
    pub fn send_bytes(&self, bytes: impl Into<Bytes>) {
        if self.to_host.send(bytes.into()).is_err() {
            debug!("memory transport dropped, discarding bytes");
        }
    }

    /// Encode and send a message to the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded.
    pub fn send(&self, message: &Message) -> crate::Result<()> {
        self.send_bytes(encode(message)?);
        Ok(())
    }

    /// Wait up to `timeout` for the next decodable frame written by the host.
    pub async fn recv(&self, timeout: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let bytes = tokio::time::timeout_at(deadline, self.from_host.recv_async())
                .await
                .ok()?
                .ok()?;

            let frames: Vec<String> = {
                let mut assembler = self.assembler.lock();
                bytes.iter().filter_map(|b| assembler.push(*b)).collect()
            };
            // A single write carries a single frame.
            if let Some(message) = frames.iter().find_map(|frame| decode(frame).ok()) {
                return Some(message);
            }
        }
    }

    /// Make the next host read fail.
    pub fn fail_next_read(&self) {
        self.state.lock().fail_next_read = true;
    }

    /// Make the next host write fail.
    pub fn fail_next_write(&self) {
        self.state.lock().fail_next_write = true;
    }

    /// Make the next `count` open attempts fail.
    pub fn fail_opens(&self, count: usize) {
        self.state.lock().failing_opens = count;
    }

    /// Whether the host side is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Number of open attempts so far, failed ones included.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    /// Number of closes so far.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, MessageType};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_closed_until_opened() {
        let (transport, peer) = MemoryTransport::pair();
        let mut buf = [0u8; 4];

        assert!(!transport.is_valid());
        assert_matches!(transport.read(&mut buf).await, Err(TransportError::Closed));

        transport.open().await.unwrap();
        assert!(transport.is_valid());
        assert!(peer.is_open());
    }

    #[tokio::test]
    async fn test_short_reads_keep_leftover() {
        let (transport, peer) = MemoryTransport::pair();
        transport.open().await.unwrap();
        peer.send_bytes(&b"abcdef"[..]);

        let mut buf = [0u8; 4];
        assert_eq!(transport.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(transport.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        // Nothing left: the read times out.
        assert_eq!(transport.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_peer_receives_host_frames() {
        let (transport, peer) = MemoryTransport::pair();
        transport.open().await.unwrap();

        let message = Message::new(7, MessageType::Get, Command::HAS_BMS, "");
        transport
            .write(encode(&message).unwrap().as_bytes())
            .await
            .unwrap();

        assert_eq!(peer.recv(Duration::from_secs(1)).await, Some(message));
        assert_eq!(peer.recv(Duration::from_millis(20)).await, None);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let (transport, peer) = MemoryTransport::pair();
        peer.fail_opens(1);

        assert!(transport.open().await.is_err());
        transport.open().await.unwrap();
        assert_eq!(peer.open_count(), 2);

        peer.fail_next_read();
        let mut buf = [0u8; 4];
        assert_matches!(transport.read(&mut buf).await, Err(TransportError::Io("read", _)));
        assert_eq!(transport.read(&mut buf).await.unwrap(), 0);

        peer.fail_next_write();
        assert_matches!(transport.write(b"[x]").await, Err(TransportError::Io("write", _)));
        transport.write(b"[x]").await.unwrap();

        transport.close().await;
        assert_eq!(peer.close_count(), 1);
        assert!(!peer.is_open());
    }
}
