//! Default handlers for requests initiated by the microcontroller.

use supervisor_link::{Command, Communicator, Message, MessageType};
use tracing::{debug, warn};

use crate::device::Peripherals;
use crate::events::{Event, EventKind, WeakEventBus};

/// Acknowledgement payload for handled requests.
pub const ACK: &str = "OK";

/// Requests answered by default and the event each one publishes.
pub const DEFAULT_HANDLERS: [(MessageType, Command, EventKind); 4] = [
    (MessageType::Get, Command::WATCHDOG, EventKind::Watchdog),
    (MessageType::Set, Command::TAMPER_EVENT, EventKind::Tamper),
    (MessageType::Set, Command::BUZZER_DISABLE, EventKind::Buzzer),
    (MessageType::Set, Command::POWER_SOURCE, EventKind::PowerSource),
];

impl Peripherals {
    /// Register the default handlers and buzzer control.
    pub fn setup(&self) {
        for (message_type, command, kind) in DEFAULT_HANDLERS {
            let events = self.events().downgrade();
            self.link().register_handler(
                message_type,
                command,
                move |link: &Communicator, request: &Message| {
                    acknowledge(link, request, &events, kind);
                },
            );
        }

        self.setup_buzzer_control();
    }
}

fn acknowledge(link: &Communicator, request: &Message, events: &WeakEventBus, kind: EventKind) {
    debug!(
        "{} {} received: {:?}",
        request.message_type, request.command, request.payload
    );

    if let Err(e) = link.send_reply(request, ACK) {
        warn!("Failed to acknowledge {}: {}", request.command, e);
    }
    if let Some(events) = events.upgrade() {
        events.publish(Event::from_message(kind, request));
    }
}
