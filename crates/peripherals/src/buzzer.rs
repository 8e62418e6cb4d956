//! Sounds the buzzer while the enclosure is open.

use std::time::Duration;

use supervisor_link::{Command, Communicator, MessageType};
use tracing::{debug, error};

use crate::device::Peripherals;
use crate::events::{Event, EventKind, WeakEventBus};

/// Tamper payload reported when the enclosure opens.
pub const TAMPER_OPEN: &str = "Open";

/// Tamper payload reported when the enclosure closes.
pub const TAMPER_CLOSE: &str = "Close";

/// Seconds the buzzer sounds once enabled.
pub const BUZZER_ALARM_SECONDS: &str = "10";

/// Response window for disabling the buzzer.
pub const BUZZER_DISABLE_TIMEOUT: Duration = Duration::from_millis(3000);

impl Peripherals {
    pub(crate) fn setup_buzzer_control(&self) {
        let link = self.link().clone();
        let events = self.events().downgrade();

        self.events()
            .subscribe(EventKind::Tamper, move |event: Event| {
                let link = link.clone();
                let events = events.clone();
                async move { on_tamper(&link, &events, &event).await }
            });
    }
}

async fn on_tamper(link: &Communicator, events: &WeakEventBus, event: &Event) {
    let (command, payload, timeout) = match event.payload.as_str() {
        TAMPER_OPEN => (
            Command::BUZZER_ENABLE,
            BUZZER_ALARM_SECONDS,
            link.config().default_timeout,
        ),
        TAMPER_CLOSE => (Command::BUZZER_DISABLE, "", BUZZER_DISABLE_TIMEOUT),
        other => {
            debug!("Ignoring tamper state {:?}", other);
            return;
        }
    };

    let outcome = link
        .request(MessageType::Set, command, payload, timeout)
        .await;

    let (message_type, payload) = match outcome {
        Ok(response) => (MessageType::Resp, response),
        Err(e) => {
            error!("Cannot send {} to the buzzer: {}", command, e);
            (MessageType::Error, e.to_string())
        }
    };

    if let Some(events) = events.upgrade() {
        events.publish(Event {
            kind: EventKind::Buzzer,
            message_type,
            command,
            payload,
        });
    }
}
