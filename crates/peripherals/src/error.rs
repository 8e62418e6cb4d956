//! Error types for peripheral operations.

use thiserror::Error;

/// Result type alias for peripheral operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for peripheral operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The request failed on the link or was answered with ERROR.
    #[error(transparent)]
    Link(#[from] supervisor_link::Error),

    /// EEPROM write protection could not be toggled.
    #[error("unable to {0} write protection")]
    WriteProtection(&'static str),
}
