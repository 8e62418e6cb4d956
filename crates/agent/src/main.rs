//! Supervisor agent: runs the STM32 link and its default peripherals.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::io;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use supervisor_link::{Communicator, CommunicatorConfig, DrainOrder, SerialConfig, SerialTransport};
use supervisor_peripherals::{Event, EventBus, EventKind, Peripherals};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Agent error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error with context
    #[error("{0}: {1}")]
    Io(&'static str, #[source] io::Error),

    /// Engine task failed
    #[error("engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QueueOrder {
    Fifo,
    Lifo,
}

impl From<QueueOrder> for DrainOrder {
    fn from(order: QueueOrder) -> Self {
        match order {
            QueueOrder::Fifo => Self::Fifo,
            QueueOrder::Lifo => Self::Lifo,
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Serial device connected to the microcontroller
    #[arg(long, default_value = "/dev/ttyS1", env = "SUPERVISOR_SERIAL_PORT")]
    serial_port: String,

    /// Serial baud rate
    #[arg(long, default_value_t = 115_200, env = "SUPERVISOR_BAUD_RATE")]
    baud_rate: u32,

    /// Per-read timeout in milliseconds
    #[arg(long, default_value_t = 500, env = "SUPERVISOR_READ_TIMEOUT_MS")]
    read_timeout_ms: u64,

    /// Default response timeout in milliseconds
    #[arg(long, default_value_t = 10_000, env = "SUPERVISOR_RESPONSE_TIMEOUT_MS")]
    response_timeout_ms: u64,

    /// Pause before reopening a failed serial port, in milliseconds
    #[arg(long, default_value_t = 2_000, env = "SUPERVISOR_RECONNECT_DELAY_MS")]
    reconnect_delay_ms: u64,

    /// Order in which queued messages are sent
    #[arg(long, value_enum, default_value_t = QueueOrder::Fifo, env = "SUPERVISOR_DRAIN_ORDER")]
    drain_order: QueueOrder,

    /// Do not talk to the microcontroller at all
    #[arg(long, env = "SUPERVISOR_DISABLED")]
    disabled: bool,

    /// OS version to announce at startup
    #[arg(long, env = "SUPERVISOR_OS_VERSION")]
    os_version: Option<String>,

    /// Serial number to store at startup
    #[arg(long, env = "SUPERVISOR_SERIAL_NUMBER")]
    serial_number: Option<String>,
}

impl Args {
    fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            path: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    fn communicator_config(&self) -> CommunicatorConfig {
        CommunicatorConfig {
            enabled: !self.disabled,
            drain_order: self.drain_order.into(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            default_timeout: Duration::from_millis(self.response_timeout_ms),
            ..CommunicatorConfig::default()
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<(), Error> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| Error::Io("SIGTERM handler failed", e))?;
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|e| Error::Io("SIGINT handler failed", e))?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<(), Error> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::Io("ctrl-c handler failed", e))?;
    info!("Received interrupt signal");
    Ok(())
}

fn log_events(events: &EventBus) {
    for kind in [
        EventKind::Watchdog,
        EventKind::Tamper,
        EventKind::Buzzer,
        EventKind::PowerSource,
        EventKind::FirmwareUpdate,
    ] {
        events.subscribe(kind, |event: Event| async move {
            info!(
                "{:?} event: {} {} {:?}",
                event.kind, event.message_type, event.command, event.payload
            );
        });
    }
}

async fn announce(
    peripherals: Peripherals,
    os_version: Option<String>,
    serial_number: Option<String>,
) {
    if let Some(version) = os_version {
        match peripherals.set_os_version(&version).await {
            Ok(_) => info!("Announced OS version {}", version),
            Err(e) => warn!("Failed to announce OS version: {}", e),
        }
    }

    if let Some(serial_number) = serial_number {
        match peripherals.set_serial_number(&serial_number).await {
            Ok(_) => info!("Stored serial number {}", serial_number),
            Err(e) => warn!("Failed to store serial number: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for better logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    // Create shared shutdown token
    let shutdown_token = CancellationToken::new();

    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            warn!("{}", e);
            return;
        }
        info!("Shutting down");
        signal_shutdown_token.cancel();
    });

    let transport = SerialTransport::new(args.serial_config());
    let (link, engine) = Communicator::new(transport, args.communicator_config());
    let engine_task = tokio::spawn(engine.run(shutdown_token.clone()));

    let peripherals = Peripherals::new(link, EventBus::new());
    peripherals.setup();
    log_events(peripherals.events());

    if args.disabled {
        info!("Supervisor link disabled");
    } else {
        tokio::spawn(announce(
            peripherals.clone(),
            args.os_version,
            args.serial_number,
        ));
    }

    engine_task.await?;
    shutdown_token.cancelled().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_link_defaults() {
        let args = Args::try_parse_from(["supervisor-agent"]).unwrap();
        let serial = args.serial_config();
        let config = args.communicator_config();

        assert_eq!(serial.path, SerialConfig::default().path);
        assert_eq!(serial.baud_rate, SerialConfig::default().baud_rate);
        assert_eq!(serial.read_timeout, SerialConfig::default().read_timeout);
        assert!(config.enabled);
        assert_eq!(config.drain_order, DrainOrder::Fifo);
        assert_eq!(config.default_timeout, CommunicatorConfig::default().default_timeout);
        assert_eq!(config.reconnect_delay, CommunicatorConfig::default().reconnect_delay);
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "supervisor-agent",
            "--serial-port",
            "/dev/ttyUSB0",
            "--drain-order",
            "lifo",
            "--disabled",
            "--os-version",
            "1.8.0",
        ])
        .unwrap();

        assert_eq!(args.serial_config().path, "/dev/ttyUSB0");
        assert_eq!(args.communicator_config().drain_order, DrainOrder::Lifo);
        assert!(!args.communicator_config().enabled);
        assert_eq!(args.os_version.as_deref(), Some("1.8.0"));
        assert_eq!(args.serial_number, None);
    }
}
