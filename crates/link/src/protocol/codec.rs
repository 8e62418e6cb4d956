//! Text codec for the bracketed `key:value` wire format.
//!
//! A frame looks like
//! `[version:0;type:1;command:21;message_id:3;data_len:3;data:AC]`.
//! There is no escaping: payloads must not contain `;`, `[` or `]`.

use crate::error::{CodecError, Result};
use crate::protocol::message::{Command, Message, MessageType, PROTOCOL_VERSION};

/// Maximum encoded frame size, brackets included.
pub const FRAME_CAPACITY: usize = 100;

/// Characters the wire format cannot carry inside a payload.
pub const RESERVED_CHARS: [char; 3] = [';', '[', ']'];

/// Encode a message into its wire text.
///
/// # Errors
///
/// Returns an error if the payload contains a reserved character or the
/// encoded frame plus a one-byte margin exceeds [`FRAME_CAPACITY`].
pub fn encode(message: &Message) -> Result<String> {
    if let Some(c) = message.payload.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(CodecError::InvalidPayload(c).into());
    }

    let encoded = format!(
        "[version:{};type:{};command:{};message_id:{};data_len:{};data:{}]",
        message.version,
        message.message_type as u8,
        message.command.0,
        message.id,
        message.payload.len() + 1,
        message.payload,
    );

    if encoded.len() + 1 > FRAME_CAPACITY {
        return Err(CodecError::FrameTooLarge {
            size: encoded.len() + 1,
            max: FRAME_CAPACITY,
        }
        .into());
    }

    Ok(encoded)
}

/// Decode wire text into a message.
///
/// Accepts either a full bracketed frame or the text between the brackets.
///
/// # Errors
///
/// Returns an error if a part has no `:`, a key is unknown, a numeric field
/// does not parse, the type is not a wire type, or a required field is
/// missing.
pub fn decode(text: &str) -> Result<Message> {
    let inner = match text.strip_prefix('[') {
        Some(rest) => rest
            .strip_suffix(']')
            .ok_or_else(|| malformed("missing closing bracket"))?,
        None => text,
    };

    let mut version = PROTOCOL_VERSION;
    let mut message_type = None;
    let mut command = None;
    let mut id = None;
    let mut payload = String::new();

    for part in inner.split(';') {
        let (key, value) = part
            .split_once(':')
            .ok_or_else(|| malformed(format!("field without value: {part:?}")))?;

        match key {
            "version" => version = parse_number(key, value)?,
            "type" => message_type = Some(MessageType::try_from(parse_number::<u8>(key, value)?)?),
            "command" => command = Some(Command(parse_number(key, value)?)),
            "message_id" => id = Some(parse_number(key, value)?),
            "data_len" => {
                parse_number::<u8>(key, value)?;
            }
            "data" => value.clone_into(&mut payload),
            _ => return Err(malformed(format!("unknown field: {key:?}")).into()),
        }
    }

    Ok(Message {
        version,
        id: id.ok_or_else(|| malformed("missing message_id"))?,
        message_type: message_type.ok_or_else(|| malformed("missing type"))?,
        command: command.ok_or_else(|| malformed("missing command"))?,
        payload,
    })
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| malformed(format!("non-numeric {key}: {value:?}")).into())
}

fn malformed(reason: impl Into<String>) -> CodecError {
    CodecError::Malformed(reason.into())
}
