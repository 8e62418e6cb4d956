//! Request/response link between the host and its STM32 supervisor.
//!
//! This crate frames an unreliable serial byte stream into text messages,
//! correlates outbound GET/SET requests with their RESP/ERROR replies,
//! enforces per-request timeouts, recovers from transport failures and
//! dispatches inbound requests to registered handlers.
//!
//! # Features
//!
//! - **Single control loop**: one [`Engine`] task owns the wire
//! - **Typed replies**: continuations receive a [`Reply`]
//! - **Pluggable transports**: serial port or in-memory for tests
//! - **Automatic reconnect**: with suspension for exclusive port access
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use supervisor_link::{
//!     Command, Communicator, CommunicatorConfig, MessageType, SerialConfig, SerialTransport,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() -> supervisor_link::Result<()> {
//!     let transport = SerialTransport::new(SerialConfig::default());
//!     let (link, engine) = Communicator::new(transport, CommunicatorConfig::default());
//!     tokio::spawn(engine.run(CancellationToken::new()));
//!
//!     let level = link
//!         .request(
//!             MessageType::Get,
//!             Command::BATTERY_LEVEL,
//!             "",
//!             Duration::from_secs(10),
//!         )
//!         .await?;
//!     println!("battery: {level}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod communicator;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use communicator::Communicator;
pub use config::{CommunicatorConfig, DEFAULT_RESPONSE_TIMEOUT, DrainOrder};
pub use engine::{Engine, UNSUPPORTED_COMMAND};
pub use error::{CodecError, Error, Result, TransportError};
pub use handler::InboundHandler;
pub use protocol::{Command, Message, MessageType, Reply};
pub use transport::{
    MemoryPeer, MemoryTransport, SerialConfig, SerialTransport, Transport,
};
