//! Error types for the serial link.

use std::io;

use thiserror::Error;

/// Result type alias for link operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for link operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Codec errors while encoding or decoding a frame.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport-level errors.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Every odd identifier is currently in flight.
    #[error("no message id available")]
    NoIdAvailable,

    /// Only GET and SET can be sent as requests.
    #[error("message type not available")]
    UnsupportedType,

    /// The peer answered with an ERROR frame.
    #[error("{0}")]
    Remote(String),

    /// No response arrived within the declared window.
    #[error("timeout")]
    Timeout,

    /// The request was dropped before an outcome was known.
    #[error("request abandoned before a reply was received")]
    Abandoned,

    /// The communicator was configured disabled.
    #[error("supervisor is disabled")]
    Disabled,
}

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encoded frame does not fit the frame capacity.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the frame, including the trailing margin byte.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Payload contains a character the wire format cannot carry.
    #[error("payload contains reserved character {0:?}")]
    InvalidPayload(char),

    /// Inbound frame could not be parsed.
    #[error("Malformed frame: {0}")]
    Malformed(String),
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] io::Error),

    /// Serial port could not be opened or configured.
    #[error(transparent)]
    Serial(#[from] serialport::Error),

    /// Transport is closed.
    #[error("transport is closed")]
    Closed,
}
