//! Transport layer for the LoRaWAN AT driver
//!
//! The protocol engine consumes a byte-at-a-time, timeout-bounded transport.
//! This crate defines that contract and implements it over any tokio stream
//! and over a serial port.

pub mod error;
pub mod serial;
pub mod stream;
pub mod transport;

pub use error::{LoraError, LoraResult};
pub use serial::{SerialSettings, SerialTransport};
pub use stream::StreamTransport;
pub use transport::{ByteTransport, TransportLayer};
