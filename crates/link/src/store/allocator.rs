//! Message identity allocation.

use crate::error::{Error, Result};

/// Number of distinct odd 16-bit identifiers.
const ODD_ID_COUNT: u32 = 1 << 15;

/// Issues odd message identifiers that are not currently in flight.
///
/// Even values are left to the peer's namespace.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counter: u16,
}

impl IdAllocator {
    /// Create an allocator starting at id 1.
    #[must_use]
    pub const fn new() -> Self {
        Self { counter: 0 }
    }

    /// Allocate the next free id.
    ///
    /// `in_flight` reports whether a candidate is still in use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoIdAvailable`] after a full cycle of the odd id space
    /// without a free candidate.
    pub fn allocate(&mut self, in_flight: impl Fn(u16) -> bool) -> Result<u16> {
        for _ in 0..ODD_ID_COUNT {
            let candidate = self.counter.wrapping_mul(2).wrapping_add(1);
            self.counter = self.counter.wrapping_add(1);

            if !in_flight(candidate) {
                return Ok(candidate);
            }
        }

        Err(Error::NoIdAvailable)
    }
}
