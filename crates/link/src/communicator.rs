//! Caller-facing handle to the link.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument};

use crate::config::CommunicatorConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::handler::InboundHandler;
use crate::protocol::{Command, Message, MessageType, Reply, encode};
use crate::store::{Continuation, MessageStore, Outbound};
use crate::transport::Transport;

struct Shared {
    config: CommunicatorConfig,
    store: Mutex<MessageStore>,
    transport: Arc<dyn Transport>,
    suspended: AtomicBool,
}

/// Cheaply cloneable handle used to send messages, register handlers and
/// control the transport.
///
/// All clones share one message store with the [`Engine`] returned by
/// [`Communicator::new`]; nothing happens on the wire until the engine runs.
#[derive(Clone)]
pub struct Communicator {
    shared: Arc<Shared>,
}

impl Communicator {
    /// Create a communicator over `transport` and the engine that drives it.
    pub fn new(transport: impl Transport, config: CommunicatorConfig) -> (Self, Engine) {
        let communicator = Self {
            shared: Arc::new(Shared {
                config,
                store: Mutex::new(MessageStore::new()),
                transport: Arc::new(transport),
                suspended: AtomicBool::new(false),
            }),
        };
        let engine = Engine::new(communicator.clone());

        (communicator, engine)
    }

    /// Configuration this communicator was built with.
    #[must_use]
    pub fn config(&self) -> &CommunicatorConfig {
        &self.shared.config
    }

    pub(crate) fn store(&self) -> MutexGuard<'_, MessageStore> {
        self.shared.store.lock()
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.shared.transport.as_ref()
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.shared.suspended.load(Ordering::SeqCst)
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.shared.config.enabled {
            Ok(())
        } else {
            Err(Error::Disabled)
        }
    }

    /// Register a handler for inbound messages of `message_type` and
    /// `command`. The first registration for a key wins.
    pub fn register_handler(
        &self,
        message_type: MessageType,
        command: Command,
        handler: impl InboundHandler,
    ) {
        self.store().register(message_type, command, Arc::new(handler));
    }

    /// Queue a GET. `continuation` runs exactly once with the outcome, unless
    /// the message is dropped before it is written.
    ///
    /// # Errors
    ///
    /// Returns an error if no id is available, the message does not fit in a
    /// frame or the communicator is disabled. Nothing is queued on error.
    pub fn send_get(
        &self,
        command: Command,
        payload: impl Into<String>,
        timeout: Duration,
        continuation: impl FnOnce(Reply) + Send + 'static,
    ) -> Result<u16> {
        self.send_request(
            MessageType::Get,
            command,
            payload.into(),
            timeout,
            Box::new(continuation),
        )
    }

    /// Queue a SET. See [`Communicator::send_get`].
    ///
    /// # Errors
    ///
    /// Returns an error if no id is available, the message does not fit in a
    /// frame or the communicator is disabled. Nothing is queued on error.
    pub fn send_set(
        &self,
        command: Command,
        payload: impl Into<String>,
        timeout: Duration,
        continuation: impl FnOnce(Reply) + Send + 'static,
    ) -> Result<u16> {
        self.send_request(
            MessageType::Set,
            command,
            payload.into(),
            timeout,
            Box::new(continuation),
        )
    }

    #[instrument(level = "debug", skip(self, payload, continuation))]
    fn send_request(
        &self,
        message_type: MessageType,
        command: Command,
        payload: String,
        timeout: Duration,
        continuation: Continuation,
    ) -> Result<u16> {
        self.ensure_enabled()?;
        if !message_type.is_request() {
            return Err(Error::UnsupportedType);
        }

        let mut store = self.store();
        let id = store.allocate_id()?;
        let message = Message::new(id, message_type, command, payload);
        encode(&message)?;
        store.enqueue(Outbound {
            message,
            timeout,
            created_at: Instant::now(),
            continuation: Some(continuation),
        });

        Ok(id)
    }

    /// Queue a RESP answering `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message does not fit in a frame or the
    /// communicator is disabled.
    pub fn send_reply(&self, request: &Message, payload: impl Into<String>) -> Result<()> {
        self.send_answer(request.reply(MessageType::Resp, payload))
    }

    /// Queue an ERROR answering `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message does not fit in a frame or the
    /// communicator is disabled.
    pub fn send_error(&self, request: &Message, payload: impl Into<String>) -> Result<()> {
        self.send_answer(request.reply(MessageType::Error, payload))
    }

    fn send_answer(&self, message: Message) -> Result<()> {
        self.ensure_enabled()?;
        encode(&message)?;
        self.store().enqueue(Outbound {
            message,
            timeout: Duration::ZERO,
            created_at: Instant::now(),
            continuation: None,
        });
        Ok(())
    }

    fn start_request(
        &self,
        message_type: MessageType,
        command: Command,
        payload: String,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Reply>> {
        let (tx, rx) = oneshot::channel();
        let id = self.send_request(
            message_type,
            command,
            payload,
            timeout,
            Box::new(move |reply| {
                let _ = tx.send(reply);
            }),
        )?;
        debug!(id, %command, "request queued");

        Ok(rx)
    }

    /// Send a GET or SET and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] at once when the request cannot be framed,
    /// [`Error::Remote`] when the peer answers with ERROR,
    /// [`Error::Timeout`] when no answer arrives in time and
    /// [`Error::Abandoned`] when the request could not be written.
    pub async fn request(
        &self,
        message_type: MessageType,
        command: Command,
        payload: impl Into<String>,
        timeout: Duration,
    ) -> Result<String> {
        let rx = self.start_request(message_type, command, payload.into(), timeout)?;
        into_result(rx.await.ok())
    }

    /// Blocking variant of [`Communicator::request`] for plain threads.
    ///
    /// Must not be called from an async context.
    ///
    /// # Errors
    ///
    /// See [`Communicator::request`].
    pub fn request_blocking(
        &self,
        message_type: MessageType,
        command: Command,
        payload: impl Into<String>,
        timeout: Duration,
    ) -> Result<String> {
        let rx = self.start_request(message_type, command, payload.into(), timeout)?;
        into_result(rx.blocking_recv().ok())
    }

    /// Reopen the transport and let the engine manage it again.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be opened; it stays
    /// suspended in that case.
    pub async fn open_transport(&self) -> Result<()> {
        self.shared.transport.open().await?;
        self.shared.suspended.store(false, Ordering::SeqCst);
        info!("transport resumed");
        Ok(())
    }

    /// Close the transport and keep the engine from reopening it until
    /// [`Communicator::open_transport`] is called.
    pub async fn close_transport(&self) {
        self.shared.suspended.store(true, Ordering::SeqCst);
        self.shared.transport.close().await;
        info!("transport suspended");
    }

    /// Whether the transport is currently usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.transport.is_valid()
    }

    /// Number of messages waiting to be written.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.store().outbound_len()
    }

    /// Number of written requests waiting for an answer.
    #[must_use]
    pub fn awaiting(&self) -> usize {
        self.store().awaiting_len()
    }
}

fn into_result(reply: Option<Reply>) -> Result<String> {
    match reply {
        Some(Reply::Response(payload)) => Ok(payload),
        Some(Reply::Error(payload)) => Err(Error::Remote(payload)),
        Some(Reply::TimedOut) => Err(Error::Timeout),
        None => Err(Error::Abandoned),
    }
}
