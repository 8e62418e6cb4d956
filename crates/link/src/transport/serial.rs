//! Serial port transport.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, warn};

use super::Transport;
use crate::error::TransportError;

type Port = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// Serial port settings.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path.
    pub path: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Per-read timeout.
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyS1".to_string(),
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(500),
        }
    }
}

/// Transport over a local serial device, 8N1 without flow control.
///
/// Port I/O is blocking and runs on the blocking thread pool.
pub struct SerialTransport {
    config: SerialConfig,
    port: Port,
    valid: Arc<AtomicBool>,
}

impl SerialTransport {
    /// Create a closed transport for the given device.
    #[must_use]
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            port: Arc::new(Mutex::new(None)),
            valid: Arc::new(AtomicBool::new(false)),
        }
    }
}

async fn blocking<T, F>(operation: &'static str, f: F) -> Result<T, TransportError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TransportError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransportError::Io(operation, io::Error::other(e)))?
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&self) -> Result<(), TransportError> {
        let config = self.config.clone();
        let port = Arc::clone(&self.port);
        let valid = Arc::clone(&self.valid);

        blocking("open", move || {
            let opened = serialport::new(&config.path, config.baud_rate)
                .timeout(config.read_timeout)
                .data_bits(DataBits::Eight)
                .stop_bits(StopBits::One)
                .parity(Parity::None)
                .flow_control(FlowControl::None)
                .open()?;

            *port.lock() = Some(opened);
            valid.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await?;

        info!(
            "Opened serial port {} at {} baud",
            self.config.path, self.config.baud_rate
        );
        Ok(())
    }

    async fn close(&self) {
        self.valid.store(false, Ordering::SeqCst);
        let port = Arc::clone(&self.port);

        let result = blocking("close", move || {
            if let Some(mut port) = port.lock().take() {
                port.flush().map_err(|e| TransportError::Io("flush", e))?;
            }
            Ok(())
        })
        .await;

        match result {
            Ok(()) => debug!("Closed serial port {}", self.config.path),
            Err(e) => warn!("Error while closing serial port {}: {}", self.config.path, e),
        }
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let port = Arc::clone(&self.port);
        let mut chunk = vec![0u8; buf.len()];

        let (chunk, n) = blocking("read", move || {
            let mut guard = port.lock();
            let port = guard.as_mut().ok_or(TransportError::Closed)?;
            match port.read(&mut chunk) {
                Ok(n) => Ok((chunk, n)),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok((chunk, 0)),
                Err(e) => Err(TransportError::Io("read", e)),
            }
        })
        .await?;

        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = Arc::clone(&self.port);
        let bytes = bytes.to_vec();

        blocking("write", move || {
            let mut guard = port.lock();
            let port = guard.as_mut().ok_or(TransportError::Closed)?;
            port.write_all(&bytes)
                .and_then(|()| port.flush())
                .map_err(|e| TransportError::Io("write", e))
        })
        .await
    }
}
