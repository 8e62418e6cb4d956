//! Message types exchanged with the microcontroller.

use std::fmt;

use crate::error::CodecError;

/// Protocol version written into every outbound frame.
pub const PROTOCOL_VERSION: u8 = 0;

/// Type of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Read a value from the peer.
    Get = 0,
    /// Write a value to the peer.
    Set = 1,
    /// Successful answer to a GET or SET.
    Resp = 2,
    /// Failed answer to a GET or SET.
    Error = 3,
    /// Local-only marker for an expired request. Never sent on the wire.
    Timeout = 4,
}

impl MessageType {
    /// Whether the message expects an answer from the other side.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(self, Self::Get | Self::Set)
    }

    /// Human readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Resp => "RESPONSE",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Self::Get),
            1 => Ok(Self::Set),
            2 => Ok(Self::Resp),
            3 => Ok(Self::Error),
            _ => Err(CodecError::Malformed(format!(
                "unknown message type: {value}"
            ))),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command opcode.
///
/// Both ends must agree on the table. Opcodes outside the table are still
/// representable so an unknown inbound command can be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Command(pub u8);

macro_rules! commands {
    ($($(#[$doc:meta])* $name:ident = $value:literal,)*) => {
        impl Command {
            $(
                $(#[$doc])*
                pub const $name: Self = Self($value);
            )*

            /// Name of the opcode, if it is part of the table.
            #[must_use]
            pub const fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

commands! {
    /// Watchdog heartbeat from the microcontroller.
    WATCHDOG = 0,
    /// Power-over-ethernet reset.
    POE_RESET = 1,
    /// SIM card type.
    SIM_TYPE = 2,
    /// SIM card ICCID.
    SIM_ICCID = 3,
    /// SIM card carrier.
    SIM_CARRIER = 4,
    /// Modem signal strength.
    MODEM_SIGNAL = 5,
    /// Modem reset.
    MODEM_RESET = 6,
    /// Device serial number.
    SERIAL_NUMBER = 7,
    /// PCB batch number.
    BATCH_NUMBER = 8,
    /// ANATEL certification number.
    ANATEL_NUMBER = 9,
    /// Host operating system version.
    OS_VERSION = 10,
    /// Microcontroller firmware version.
    FIRMWARE_VERSION = 11,
    /// Enable the buzzer.
    BUZZER_ENABLE = 12,
    /// Disable the buzzer.
    BUZZER_DISABLE = 13,
    /// Firmware upgrade in progress flag.
    IS_UPGRADING = 14,
    /// PCB revision.
    PCB_REVISION = 15,
    /// Start production test.
    TEST_START = 16,
    /// Production test: modem result.
    TEST_MODEM_RESULT = 17,
    /// Production test: switch result.
    TEST_SWITCH_RESULT = 18,
    /// Production test: ethernet result.
    TEST_ETHERNET_RESULT = 19,
    /// Battery management system presence.
    HAS_BMS = 20,
    /// Current power source.
    POWER_SOURCE = 21,
    /// Remote tunnel status.
    TUNNEL_STATUS = 22,
    /// Enclosure tamper event.
    TAMPER_EVENT = 23,
    /// Production test: EEPROM result.
    TEST_EEPROM_RESULT = 24,
    /// Production test: display result.
    TEST_DISPLAY_RESULT = 25,
    /// Disable EEPROM write protection.
    EEPROM_DISABLE_WRITE_PROTECTION = 26,
    /// Enable EEPROM write protection.
    EEPROM_ENABLE_WRITE_PROTECTION = 27,
    /// Microcontroller temperature.
    STM32_TEMPERATURE = 28,
    /// Battery level.
    BATTERY_LEVEL = 29,
    /// Modem connection type.
    MODEM_CONNECTION_TYPE = 30,
    /// Modem connection band.
    MODEM_CONNECTION_BAND = 31,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "undefined({})", self.0),
        }
    }
}

/// A single protocol message as carried by one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Protocol version.
    pub version: u8,
    /// Identifier correlating a request with its reply.
    pub id: u16,
    /// Message type.
    pub message_type: MessageType,
    /// Command opcode.
    pub command: Command,
    /// Text payload.
    pub payload: String,
}

impl Message {
    /// Creates a message with the current protocol version.
    #[must_use]
    pub fn new(
        id: u16,
        message_type: MessageType,
        command: Command,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id,
            message_type,
            command,
            payload: payload.into(),
        }
    }

    /// Builds the reply to this message, echoing its version, id and command.
    #[must_use]
    pub fn reply(&self, message_type: MessageType, payload: impl Into<String>) -> Self {
        Self {
            version: self.version,
            id: self.id,
            message_type,
            command: self.command,
            payload: payload.into(),
        }
    }
}

/// Outcome delivered to the continuation of an outbound GET or SET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The peer answered with RESP.
    Response(String),
    /// The peer answered with ERROR.
    Error(String),
    /// No answer arrived in time.
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(Command::POWER_SOURCE, Command(21));
        assert_eq!(Command::POWER_SOURCE.to_string(), "POWER_SOURCE");
        assert_eq!(Command(200).name(), None);
        assert_eq!(Command(200).to_string(), "undefined(200)");
    }

    #[test]
    fn test_timeout_is_not_a_wire_type() {
        assert!(MessageType::try_from(4).is_err());
        assert_eq!(MessageType::try_from(3).unwrap(), MessageType::Error);
    }

    #[test]
    fn test_reply_echoes_request() {
        let request = Message::new(9, MessageType::Get, Command::WATCHDOG, "");
        let reply = request.reply(MessageType::Resp, "OK");

        assert_eq!(reply.id, 9);
        assert_eq!(reply.command, Command::WATCHDOG);
        assert_eq!(reply.message_type, MessageType::Resp);
        assert_eq!(reply.payload, "OK");
    }
}
