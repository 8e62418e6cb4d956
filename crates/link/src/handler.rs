//! Inbound request handlers.

use crate::communicator::Communicator;
use crate::protocol::Message;

/// Handles an inbound GET or SET.
///
/// Handlers run synchronously on the engine task and answer through
/// [`Communicator::send_reply`] or [`Communicator::send_error`], passing the
/// request back as the reply token. Slow work should be spawned.
pub trait InboundHandler: Send + Sync + 'static {
    /// Handle one inbound request.
    fn handle(&self, link: &Communicator, request: &Message);
}

impl<F> InboundHandler for F
where
    F: Fn(&Communicator, &Message) + Send + Sync + 'static,
{
    fn handle(&self, link: &Communicator, request: &Message) {
        self(link, request);
    }
}
