//! Byte-level framing for the bracket-delimited wire protocol.

use bytes::{BufMut, BytesMut};
use tracing::debug;

use super::codec::FRAME_CAPACITY;

/// Start of frame marker.
pub const FRAME_START: u8 = b'[';

/// End of frame marker.
pub const FRAME_END: u8 = b']';

/// Maximum number of bytes collected between the brackets.
pub const MAX_FRAME_CONTENT: usize = FRAME_CAPACITY - 1;

/// State of the framing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Outside of a frame; bytes other than `[` are ignored.
    WaitingForMessage,
    /// Between `[` and `]`; bytes are collected.
    ReceivingData,
}

/// Assembles frames out of a byte stream, one byte at a time.
///
/// A `[` always restarts framing. Frames that outgrow the buffer are
/// abandoned without being delivered.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
    state: FrameState,
}

impl FrameAssembler {
    /// Create an assembler waiting for the first frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_FRAME_CONTENT),
            state: FrameState::WaitingForMessage,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Feed one byte. Returns the frame content (without brackets) when the
    /// byte completed a frame.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match (byte, self.state) {
            (FRAME_START, _) => {
                self.buffer.clear();
                self.state = FrameState::ReceivingData;
                None
            }
            (FRAME_END, FrameState::ReceivingData) => {
                self.state = FrameState::WaitingForMessage;
                let content = self.buffer.split();
                Some(String::from_utf8_lossy(&content).into_owned())
            }
            (_, FrameState::ReceivingData) => {
                if self.buffer.len() >= MAX_FRAME_CONTENT {
                    debug!("frame exceeded {} bytes, discarding", MAX_FRAME_CONTENT);
                    self.buffer.clear();
                    self.state = FrameState::WaitingForMessage;
                } else {
                    self.buffer.put_u8(byte);
                }
                None
            }
            (_, FrameState::WaitingForMessage) => None,
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
