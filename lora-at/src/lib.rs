//! lora-at - Rust driver for LoRaWAN AT-command modems
//!
//! This library drives a LoRaWAN radio module over its serial AT-command
//! interface and exposes a send/receive byte-stream API to the application.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `lora-at-core`: Error type, hex helpers, channel mask codec, epoch converter
//! - `lora-at-transport`: Byte transports (serial, any tokio stream)
//! - `lora-at-session`: Response matcher, URC dispatch, downlink ring buffer, command channel
//! - `lora-at-client`: Command vocabularies and the modem engine
//!
//! # Implementation Status
//!
//! ## Done
//! - Response matcher with up to seven terminal patterns
//! - Unsolicited notifications (wake, not joined, downlink, signal, link check)
//! - Chunked uplinks with per-chunk retries
//! - OTAA / ABP join with capped exponential backoff
//! - Channel mask, duty cycle, data rate, network time, sleep modes
//! - Port, class, network type, retries, identity queries, restart and factory reset
//! - Seeed LoRa-E5 and MultiTech mDOT vocabularies
//!
//! # Usage
//!
//! ```no_run
//! use lora_at::client::{LoraE5, ModemBuilder};
//! ```

// Re-export core types
pub use lora_at_core::{ChannelMask, EpochKind, EpochValue, LoraError, LoraResult};

// Re-export the driver API
pub mod client {
    pub use lora_at_client::*;
}

// Re-export the session layer for custom vocabularies
pub mod session {
    pub use lora_at_session::*;
}

// Re-export transports
pub mod transport {
    pub use lora_at_transport::*;
}
