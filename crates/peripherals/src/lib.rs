//! Peripherals reachable through the STM32 supervisor link.
//!
//! This crate wraps the request/response link in typed queries, answers the
//! requests the microcontroller initiates and publishes what they report as
//! events. Buzzer control listens for tamper events and drives the buzzer.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod buzzer;
pub mod device;
pub mod error;
pub mod events;
pub mod handlers;

pub use device::Peripherals;
pub use error::{Error, Result};
pub use events::{Event, EventBus, EventKind, EventListener, WeakEventBus};
