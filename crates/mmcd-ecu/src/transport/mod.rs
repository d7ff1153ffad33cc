//! Transport layer for the MMCD serial bus
//!
//! This module provides byte-level access to the ECU line:
//! - Serial adapter for a real port (8N1, no flow control)
//! - Mock adapter that scripts ECU replies for tests
//!
//! The transport has no protocol knowledge. Request/reply framing, echo
//! checks and bus exclusivity live in [`crate::protocol`].
//!
//! # Example
//!
//! ```ignore
//! use mmcd_ecu::transport::{SerialTransport, Transport};
//! use mmcd_ecu::config::ConnectionConfig;
//!
//! let mut transport = SerialTransport::open(&ConnectionConfig::new("/dev/ttyUSB0"))?;
//! transport.send(&[0x21]).await?;
//! let mut buf = [0u8; 2];
//! let n = transport.receive(&mut buf).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;
pub mod serial;

pub use adapter::Transport;
pub use error::TransportError;
pub use mock::{MockHandle, MockReply, MockTransport};
pub use serial::{available_ports, SerialTransport};
