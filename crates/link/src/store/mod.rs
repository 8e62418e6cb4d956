//! Shared message state: outbound queue, awaiting-response set and inbound
//! handler registry.
//!
//! The store is always accessed through the communicator's mutex. Nothing in
//! here runs user code.

mod allocator;

pub use allocator::IdAllocator;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::DrainOrder;
use crate::error::Result;
use crate::handler::InboundHandler;
use crate::protocol::{Command, Message, MessageType, Reply};

/// Continuation invoked once with the outcome of an outbound GET or SET.
pub type Continuation = Box<dyn FnOnce(Reply) + Send + 'static>;

/// A message waiting to be written to the transport.
pub struct Outbound {
    /// The message to write.
    pub message: Message,
    /// How long to wait for an answer once written.
    pub timeout: Duration,
    /// Enqueue time, refreshed when the message is actually sent.
    pub created_at: Instant,
    /// Present on GET and SET only.
    pub continuation: Option<Continuation>,
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound")
            .field("message", &self.message)
            .field("timeout", &self.timeout)
            .field("created_at", &self.created_at)
            .field("continuation", &self.continuation.is_some())
            .finish()
    }
}

/// A written GET or SET whose outcome is not known yet.
pub struct Pending {
    /// Command of the original request.
    pub command: Command,
    /// Declared response timeout.
    pub timeout: Duration,
    /// Time the request was written.
    pub sent_at: Instant,
    /// Continuation to invoke with the outcome.
    pub continuation: Option<Continuation>,
}

impl Pending {
    /// Invoke the continuation, if any.
    pub fn complete(self, reply: Reply) {
        if let Some(continuation) = self.continuation {
            continuation(reply);
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.sent_at) > self.timeout
    }
}

struct Registration {
    message_type: MessageType,
    command: Command,
    handler: Arc<dyn InboundHandler>,
}

/// All mutable protocol state shared between the engine and its callers.
#[derive(Default)]
pub struct MessageStore {
    allocator: IdAllocator,
    outbound: VecDeque<Outbound>,
    awaiting: HashMap<u16, Pending>,
    handlers: Vec<Registration>,
}

impl MessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id unused by both the outbound queue and the
    /// awaiting-response set.
    ///
    /// # Errors
    ///
    /// Returns an error if no id is available.
    pub fn allocate_id(&mut self) -> Result<u16> {
        let in_flight: HashSet<u16> = self
            .outbound
            .iter()
            .map(|outbound| outbound.message.id)
            .chain(self.awaiting.keys().copied())
            .collect();

        self.allocator.allocate(|id| in_flight.contains(&id))
    }

    /// Queue a message for the send pump.
    pub fn enqueue(&mut self, outbound: Outbound) {
        self.outbound.push_back(outbound);
    }

    /// Take the next message to send.
    pub fn next_outbound(&mut self, order: DrainOrder) -> Option<Outbound> {
        match order {
            DrainOrder::Fifo => self.outbound.pop_front(),
            DrainOrder::Lifo => self.outbound.pop_back(),
        }
    }

    /// Record a written request.
    pub fn await_response(&mut self, id: u16, pending: Pending) {
        self.awaiting.insert(id, pending);
    }

    /// Remove the request waiting on `id`.
    pub fn take_pending(&mut self, id: u16) -> Option<Pending> {
        self.awaiting.remove(&id)
    }

    /// Remove every request whose timeout elapsed.
    pub fn take_expired(&mut self, now: Instant) -> Vec<(u16, Pending)> {
        let expired: Vec<u16> = self
            .awaiting
            .iter()
            .filter(|(_, pending)| pending.expired(now))
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.awaiting.remove(&id).map(|pending| (id, pending)))
            .collect()
    }

    /// Register a handler for inbound messages of the given type and command.
    pub fn register(
        &mut self,
        message_type: MessageType,
        command: Command,
        handler: Arc<dyn InboundHandler>,
    ) {
        self.handlers.push(Registration {
            message_type,
            command,
            handler,
        });
    }

    /// First handler registered for the given type and command.
    #[must_use]
    pub fn handler_for(
        &self,
        message_type: MessageType,
        command: Command,
    ) -> Option<Arc<dyn InboundHandler>> {
        self.handlers
            .iter()
            .find(|r| r.message_type == message_type && r.command == command)
            .map(|r| Arc::clone(&r.handler))
    }

    /// Number of messages not yet written.
    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Number of requests awaiting an answer.
    #[must_use]
    pub fn awaiting_len(&self) -> usize {
        self.awaiting.len()
    }
}
