//! Peripherals against a simulated microcontroller.

use std::collections::HashMap;
use std::time::Duration;

use assert_matches::assert_matches;
use supervisor_link::{
    Command, Communicator, CommunicatorConfig, MemoryPeer, MemoryTransport, Message, MessageType,
};
use supervisor_peripherals::{Error, Event, EventKind, Peripherals};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(2);

/// Answers requests from the host with canned replies and records them.
struct Device {
    peer: MemoryPeer,
    received: flume::Receiver<Message>,
    cancel: CancellationToken,
}

impl Device {
    fn spawn(peer: MemoryPeer, answers: HashMap<Command, (MessageType, &'static str)>) -> Self {
        let (tx, received) = flume::unbounded();
        let cancel = CancellationToken::new();

        let device = peer.clone();
        let stop = cancel.clone();
        tokio::spawn(async move {
            while !stop.is_cancelled() {
                let Some(message) = device.recv(Duration::from_millis(50)).await else {
                    continue;
                };
                if message.message_type.is_request() {
                    if let Some((message_type, payload)) = answers.get(&message.command) {
                        device.send(&message.reply(*message_type, *payload)).unwrap();
                    }
                }
                let _ = tx.send(message);
            }
        });

        Self {
            peer,
            received,
            cancel,
        }
    }

    async fn next(&self) -> Message {
        tokio::time::timeout(WAIT, self.received.recv_async())
            .await
            .unwrap()
            .unwrap()
    }

    fn commands(&self) -> Vec<Command> {
        self.received.drain().map(|message| message.command).collect()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Setup {
    peripherals: Peripherals,
    device: Device,
    cancel: CancellationToken,
}

impl Drop for Setup {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn setup(answers: &[(Command, MessageType, &'static str)]) -> Setup {
    let _ = tracing_subscriber::fmt::try_init();
    let (transport, peer) = MemoryTransport::pair();
    let (link, engine) = Communicator::new(
        transport,
        CommunicatorConfig {
            reconnect_delay: Duration::from_millis(50),
            poll_interval: Duration::from_millis(20),
            default_timeout: Duration::from_millis(500),
            ..CommunicatorConfig::default()
        },
    );
    let cancel = CancellationToken::new();
    tokio::spawn(engine.run(cancel.clone()));

    let answers = answers
        .iter()
        .map(|(command, message_type, payload)| (*command, (*message_type, *payload)))
        .collect();

    Setup {
        peripherals: Peripherals::new(link, supervisor_peripherals::EventBus::new()),
        device: Device::spawn(peer, answers),
        cancel,
    }
}

fn record(peripherals: &Peripherals, kind: EventKind) -> flume::Receiver<Event> {
    let (tx, rx) = flume::unbounded();
    peripherals.events().subscribe(kind, move |event: Event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(event);
        }
    });
    rx
}

async fn next_event(events: &flume::Receiver<Event>) -> Event {
    tokio::time::timeout(WAIT, events.recv_async())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_queries_use_their_opcodes() {
    let setup = setup(&[
        (Command::MODEM_SIGNAL, MessageType::Resp, "-71"),
        (Command::SIM_ICCID, MessageType::Resp, "8955000000000000001"),
        (Command::BATTERY_LEVEL, MessageType::Resp, "87"),
        (Command::FIRMWARE_VERSION, MessageType::Resp, "2.4.1"),
        (Command::BATCH_NUMBER, MessageType::Resp, "B17"),
        (Command::STM32_TEMPERATURE, MessageType::Resp, "41"),
    ]);
    let peripherals = &setup.peripherals;

    assert_eq!(peripherals.modem_signal_strength().await.unwrap(), "-71");
    assert_eq!(
        peripherals.sim_card_iccid().await.unwrap(),
        "8955000000000000001"
    );
    assert_eq!(peripherals.battery_level().await.unwrap(), "87");
    assert_eq!(peripherals.firmware_version().await.unwrap(), "2.4.1");
    assert_eq!(peripherals.pcb_batch().await.unwrap(), "B17");
    assert_eq!(peripherals.stm32_temperature().await.unwrap(), "41");
}

#[tokio::test]
async fn test_query_error_and_timeout() {
    let setup = setup(&[(Command::HAS_BMS, MessageType::Error, "no bms")]);

    assert_matches!(
        setup.peripherals.has_bms().await,
        Err(Error::Link(supervisor_link::Error::Remote(payload))) if payload == "no bms"
    );
    // Nothing answers POWER_SOURCE.
    assert_matches!(
        setup.peripherals.power_source().await,
        Err(Error::Link(supervisor_link::Error::Timeout))
    );
}

#[tokio::test]
async fn test_set_os_version() {
    let setup = setup(&[(Command::OS_VERSION, MessageType::Resp, "OK")]);

    assert_eq!(setup.peripherals.set_os_version("1.8.0").await.unwrap(), "OK");
    let sent = setup.device.next().await;
    assert_eq!(sent.message_type, MessageType::Set);
    assert_eq!(sent.command, Command::OS_VERSION);
    assert_eq!(sent.payload, "1.8.0");
}

#[tokio::test]
async fn test_serial_number_is_bracketed_by_write_protection() {
    let setup = setup(&[
        (Command::EEPROM_DISABLE_WRITE_PROTECTION, MessageType::Resp, "OK"),
        (Command::SERIAL_NUMBER, MessageType::Resp, "OK"),
        (Command::EEPROM_ENABLE_WRITE_PROTECTION, MessageType::Resp, "OK"),
    ]);

    assert_eq!(
        setup.peripherals.set_serial_number("SN123").await.unwrap(),
        "OK"
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        setup.device.commands(),
        [
            Command::EEPROM_DISABLE_WRITE_PROTECTION,
            Command::SERIAL_NUMBER,
            Command::EEPROM_ENABLE_WRITE_PROTECTION,
        ]
    );
}

#[tokio::test]
async fn test_serial_number_not_written_when_protection_stays_on() {
    let setup = setup(&[
        (Command::EEPROM_DISABLE_WRITE_PROTECTION, MessageType::Error, "locked"),
        (Command::SERIAL_NUMBER, MessageType::Resp, "OK"),
    ]);

    let err = setup.peripherals.set_serial_number("SN123").await.unwrap_err();
    assert_matches!(err, Error::WriteProtection("disable"));
    assert_eq!(err.to_string(), "unable to disable write protection");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        setup.device.commands(),
        [Command::EEPROM_DISABLE_WRITE_PROTECTION]
    );
}

#[tokio::test]
async fn test_serial_number_fails_when_protection_not_restored() {
    let setup = setup(&[
        (Command::EEPROM_DISABLE_WRITE_PROTECTION, MessageType::Resp, "OK"),
        (Command::SERIAL_NUMBER, MessageType::Resp, "OK"),
        (Command::EEPROM_ENABLE_WRITE_PROTECTION, MessageType::Error, "fault"),
    ]);

    assert_matches!(
        setup.peripherals.set_serial_number("SN123").await,
        Err(Error::WriteProtection("enable"))
    );
}

#[tokio::test]
async fn test_default_handlers_acknowledge_and_publish() {
    let setup = setup(&[]);
    setup.peripherals.setup();
    let watchdog = record(&setup.peripherals, EventKind::Watchdog);
    let power = record(&setup.peripherals, EventKind::PowerSource);

    setup
        .device
        .peer
        .send(&Message::new(5, MessageType::Get, Command::WATCHDOG, ""))
        .unwrap();
    let ack = setup.device.next().await;
    assert_eq!(ack.message_type, MessageType::Resp);
    assert_eq!(ack.id, 5);
    assert_eq!(ack.payload, "OK");
    assert_eq!(next_event(&watchdog).await.command, Command::WATCHDOG);

    setup
        .device
        .peer
        .send(&Message::new(7, MessageType::Set, Command::POWER_SOURCE, "BATTERY"))
        .unwrap();
    let ack = setup.device.next().await;
    assert_eq!((ack.id, ack.payload.as_str()), (7, "OK"));
    let event = next_event(&power).await;
    assert_eq!(event.kind, EventKind::PowerSource);
    assert_eq!(event.payload, "BATTERY");
}

#[tokio::test]
async fn test_tamper_open_enables_buzzer() {
    let setup = setup(&[(Command::BUZZER_ENABLE, MessageType::Resp, "OK")]);
    setup.peripherals.setup();
    let tamper = record(&setup.peripherals, EventKind::Tamper);
    let buzzer = record(&setup.peripherals, EventKind::Buzzer);

    setup
        .device
        .peer
        .send(&Message::new(9, MessageType::Set, Command::TAMPER_EVENT, "Open"))
        .unwrap();

    assert_eq!(next_event(&tamper).await.payload, "Open");
    let event = next_event(&buzzer).await;
    assert_eq!(event.message_type, MessageType::Resp);
    assert_eq!(event.command, Command::BUZZER_ENABLE);
    assert_eq!(event.payload, "OK");

    let ack = setup.device.next().await;
    assert_eq!((ack.id, ack.message_type), (9, MessageType::Resp));
    let enable = setup.device.next().await;
    assert_eq!(enable.command, Command::BUZZER_ENABLE);
    assert_eq!(enable.payload, "10");
}

#[tokio::test]
async fn test_tamper_close_failure_is_published() {
    let setup = setup(&[(Command::BUZZER_DISABLE, MessageType::Error, "stuck")]);
    setup.peripherals.setup();
    let buzzer = record(&setup.peripherals, EventKind::Buzzer);

    setup
        .device
        .peer
        .send(&Message::new(11, MessageType::Set, Command::TAMPER_EVENT, "Close"))
        .unwrap();

    let event = next_event(&buzzer).await;
    assert_eq!(event.message_type, MessageType::Error);
    assert_eq!(event.command, Command::BUZZER_DISABLE);
    assert_eq!(event.payload, "stuck");
}

#[tokio::test]
async fn test_unknown_tamper_state_is_ignored() {
    let setup = setup(&[]);
    setup.peripherals.setup();
    let buzzer = record(&setup.peripherals, EventKind::Buzzer);

    setup
        .device
        .peer
        .send(&Message::new(13, MessageType::Set, Command::TAMPER_EVENT, "Ajar"))
        .unwrap();

    // Only the acknowledgement goes out.
    let ack = setup.device.next().await;
    assert_eq!(ack.id, 13);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(setup.device.commands().is_empty());
    assert!(buzzer.is_empty());
}
