//! The protocol engine: one control loop that reads, frames, dispatches,
//! sweeps timeouts and drains the outbound queue.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::communicator::Communicator;
use crate::protocol::{FrameAssembler, Message, MessageType, Reply, decode, encode};
use crate::store::Pending;

/// Payload of the ERROR sent for an inbound request nobody handles.
pub const UNSUPPORTED_COMMAND: &str = "unsupported command";

const READ_CHUNK: usize = 64;

/// Drives a [`Communicator`]. Created by [`Communicator::new`].
pub struct Engine {
    link: Communicator,
    assembler: FrameAssembler,
}

impl Engine {
    pub(crate) fn new(link: Communicator) -> Self {
        Self {
            link,
            assembler: FrameAssembler::new(),
        }
    }

    /// Run until `cancel` fires. Returns at once if the communicator is
    /// disabled. No transport or protocol failure stops the loop.
    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.link.config().enabled {
            info!("supervisor link disabled, engine not started");
            return;
        }

        let transport = self.link.transport();
        if !transport.is_valid() && !self.link.is_suspended() {
            match transport.open().await {
                Ok(()) => self.close_if_suspended().await,
                Err(e) => warn!("Failed to open transport: {}", e),
            }
        }

        info!("engine started");
        let mut buf = [0u8; READ_CHUNK];

        while !cancel.is_cancelled() {
            if !transport.is_valid() {
                if self.link.is_suspended() {
                    pause(&cancel, self.link.config().poll_interval).await;
                } else {
                    self.reconnect(&cancel).await;
                }
                continue;
            }

            let read = tokio::select! {
                () = cancel.cancelled() => break,
                read = transport.read(&mut buf) => read,
            };

            match read {
                Ok(0) => self.idle_tick(&cancel).await,
                Ok(n) => {
                    for &byte in &buf[..n] {
                        if let Some(frame) = self.assembler.push(byte) {
                            self.dispatch(&frame);
                        }
                    }
                }
                Err(e) => {
                    error!("Transport read failed: {}", e);
                    self.reconnect(&cancel).await;
                }
            }
        }

        transport.close().await;
        info!("engine stopped");
    }

    /// Close, cool down, reopen. Skips the reopen while suspended.
    async fn reconnect(&self, cancel: &CancellationToken) {
        let transport = self.link.transport();
        transport.close().await;
        pause(cancel, self.link.config().reconnect_delay).await;

        if cancel.is_cancelled() || self.link.is_suspended() {
            return;
        }

        match transport.open().await {
            Ok(()) => {
                info!("transport reopened");
                self.close_if_suspended().await;
            }
            Err(e) => warn!("Failed to reopen transport: {}", e),
        }
    }

    /// A suspension that lands while the port is opening wins.
    async fn close_if_suspended(&self) {
        if self.link.is_suspended() {
            info!("transport suspended while opening, closing it again");
            self.link.transport().close().await;
        }
    }

    async fn idle_tick(&self, cancel: &CancellationToken) {
        self.sweep_timeouts();
        self.pump(cancel).await;
    }

    fn dispatch(&self, frame: &str) {
        let message = match decode(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping undecodable frame {:?}: {}", frame, e);
                return;
            }
        };

        match message.message_type {
            MessageType::Get | MessageType::Set => self.dispatch_request(&message),
            MessageType::Resp => self.complete(&message, Reply::Response(message.payload.clone())),
            MessageType::Error => self.complete(&message, Reply::Error(message.payload.clone())),
            MessageType::Timeout => debug!("Dropping inbound TIMEOUT frame"),
        }
    }

    fn dispatch_request(&self, request: &Message) {
        let handler = self
            .link
            .store()
            .handler_for(request.message_type, request.command);

        match handler {
            Some(handler) => handler.handle(&self.link, request),
            None => {
                debug!(
                    id = request.id,
                    "No handler for {} {}", request.message_type, request.command
                );
                if let Err(e) = self.link.send_error(request, UNSUPPORTED_COMMAND) {
                    warn!("Failed to queue unsupported command reply: {}", e);
                }
            }
        }
    }

    fn complete(&self, reply: &Message, outcome: Reply) {
        let pending = self.link.store().take_pending(reply.id);

        match pending {
            Some(pending) => {
                if pending.command != reply.command {
                    debug!(
                        id = reply.id,
                        "Reply command {} differs from request command {}",
                        reply.command,
                        pending.command
                    );
                }
                pending.complete(outcome);
            }
            None => debug!(
                id = reply.id,
                "No request awaiting {} {}", reply.message_type, reply.command
            ),
        }
    }

    fn sweep_timeouts(&self) {
        let expired = self.link.store().take_expired(Instant::now());

        for (id, pending) in expired {
            debug!(id, "Request {} timed out after {:?}", pending.command, pending.timeout);
            pending.complete(Reply::TimedOut);
        }
    }

    /// Write at most one queued message.
    async fn pump(&self, cancel: &CancellationToken) {
        let transport = self.link.transport();
        if !transport.is_valid() {
            return;
        }

        let order = self.link.config().drain_order;
        let Some(mut outbound) = self.link.store().next_outbound(order) else {
            return;
        };
        outbound.created_at = Instant::now();

        let id = outbound.message.id;
        let frame = match encode(&outbound.message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    id,
                    "Dropping unencodable {} {}: {}",
                    outbound.message.message_type,
                    outbound.message.command,
                    e
                );
                return;
            }
        };

        let is_request = outbound.message.message_type.is_request();
        if is_request {
            // Recorded before the write so the id stays in flight throughout.
            self.link.store().await_response(
                id,
                Pending {
                    command: outbound.message.command,
                    timeout: outbound.timeout,
                    sent_at: outbound.created_at,
                    continuation: outbound.continuation.take(),
                },
            );
        }

        if let Err(e) = transport.write(frame.as_bytes()).await {
            error!(id, "Transport write failed: {}", e);
            if is_request {
                let abandoned = self.link.store().take_pending(id);
                drop(abandoned);
            }
            self.reconnect(cancel).await;
        }
    }
}

async fn pause(cancel: &CancellationToken, duration: Duration) {
    tokio::select! {
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(duration) => {}
    }
}
