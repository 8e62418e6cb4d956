//! Protocol layer for the serial link.
//!
//! This module contains the core protocol definitions including:
//! - Message, type and command definitions
//! - The text codec
//! - The byte-level framing state machine

pub mod codec;
pub mod framing;
pub mod message;

pub use codec::{FRAME_CAPACITY, decode, encode};
pub use framing::{FrameAssembler, FrameState};
pub use message::{Command, Message, MessageType, PROTOCOL_VERSION, Reply};
