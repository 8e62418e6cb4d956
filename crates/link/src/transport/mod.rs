//! Transport layer for the serial link.
//!
//! A transport moves raw bytes. Framing, correlation and reconnect policy
//! live in the engine; a transport only reports whether it is usable.

pub mod memory;
pub mod serial;

pub use memory::{MemoryPeer, MemoryTransport};
pub use serial::{SerialConfig, SerialTransport};

use async_trait::async_trait;

use crate::error::TransportError;

/// Byte-level link to the microcontroller.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the underlying device. Opening an open transport reopens it.
    async fn open(&self) -> Result<(), TransportError>;

    /// Flush and release the device. Never fails; problems are logged.
    async fn close(&self);

    /// Whether the transport is open and usable.
    fn is_valid(&self) -> bool;

    /// Read up to `buf.len()` bytes.
    ///
    /// Returns `Ok(0)` when the read timeout elapsed or the stream ended.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write all of `bytes`.
    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError>;
}
