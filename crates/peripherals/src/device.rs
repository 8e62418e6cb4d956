//! Typed queries against the microcontroller.

use std::time::Duration;

use supervisor_link::{Command, Communicator, MessageType};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::events::EventBus;

/// Typed access to the peripherals behind the microcontroller.
///
/// Every query is a single GET or SET answered with a text payload.
#[derive(Clone)]
pub struct Peripherals {
    link: Communicator,
    events: EventBus,
    timeout: Duration,
}

impl Peripherals {
    /// Create peripherals over `link`, publishing on `events`.
    #[must_use]
    pub fn new(link: Communicator, events: EventBus) -> Self {
        let timeout = link.config().default_timeout;
        Self {
            link,
            events,
            timeout,
        }
    }

    /// The underlying link.
    #[must_use]
    pub const fn link(&self) -> &Communicator {
        &self.link
    }

    /// The bus peripheral events are published on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    async fn get(&self, command: Command) -> Result<String> {
        debug!("GET {}", command);
        Ok(self
            .link
            .request(MessageType::Get, command, "", self.timeout)
            .await?)
    }

    async fn set(&self, command: Command, payload: &str) -> Result<String> {
        debug!("SET {} {:?}", command, payload);
        Ok(self
            .link
            .request(MessageType::Set, command, payload, self.timeout)
            .await?)
    }

    /// Modem signal strength.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn modem_signal_strength(&self) -> Result<String> {
        self.get(Command::MODEM_SIGNAL).await
    }

    /// Modem connection type.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn modem_connection_type(&self) -> Result<String> {
        self.get(Command::MODEM_CONNECTION_TYPE).await
    }

    /// Modem connection band.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn modem_connection_band(&self) -> Result<String> {
        self.get(Command::MODEM_CONNECTION_BAND).await
    }

    /// SIM card type.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn sim_card_type(&self) -> Result<String> {
        self.get(Command::SIM_TYPE).await
    }

    /// SIM card ICCID.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn sim_card_iccid(&self) -> Result<String> {
        self.get(Command::SIM_ICCID).await
    }

    /// SIM card carrier.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn sim_card_carrier(&self) -> Result<String> {
        self.get(Command::SIM_CARRIER).await
    }

    /// Current power source.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn power_source(&self) -> Result<String> {
        self.get(Command::POWER_SOURCE).await
    }

    /// Whether a battery management system is fitted.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn has_bms(&self) -> Result<String> {
        self.get(Command::HAS_BMS).await
    }

    /// Battery level.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn battery_level(&self) -> Result<String> {
        self.get(Command::BATTERY_LEVEL).await
    }

    /// Microcontroller temperature.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn stm32_temperature(&self) -> Result<String> {
        self.get(Command::STM32_TEMPERATURE).await
    }

    /// Microcontroller firmware version.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn firmware_version(&self) -> Result<String> {
        self.get(Command::FIRMWARE_VERSION).await
    }

    /// PCB revision.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn pcb_revision(&self) -> Result<String> {
        self.get(Command::PCB_REVISION).await
    }

    /// PCB batch number.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn pcb_batch(&self) -> Result<String> {
        self.get(Command::BATCH_NUMBER).await
    }

    /// Announce the host OS version.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn set_os_version(&self, version: &str) -> Result<String> {
        self.set(Command::OS_VERSION, version).await
    }

    /// Store the device serial number in EEPROM.
    ///
    /// Write protection is lifted for the write and restored afterwards.
    /// Failing to restore it is an error even if the write succeeded.
    ///
    /// # Errors
    /// Returns [`Error::WriteProtection`] if protection cannot be toggled,
    /// otherwise the error of the write itself.
    #[instrument(skip(self))]
    pub async fn set_serial_number(&self, serial_number: &str) -> Result<String> {
        if let Err(e) = self.set(Command::EEPROM_DISABLE_WRITE_PROTECTION, "").await {
            warn!("Failed to disable EEPROM write protection: {}", e);
            return Err(Error::WriteProtection("disable"));
        }

        let written = self.set(Command::SERIAL_NUMBER, serial_number).await;

        if let Err(e) = self.set(Command::EEPROM_ENABLE_WRITE_PROTECTION, "").await {
            warn!("Failed to enable EEPROM write protection: {}", e);
            return Err(Error::WriteProtection("enable"));
        }

        written
    }
}
