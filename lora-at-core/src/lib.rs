//! Core types and codecs for the LoRaWAN AT-command driver
//!
//! This crate provides the error type and the pure transforms used by the
//! protocol engine: hex helpers, the channel mask codec and the
//! leap-second aware epoch converter.

pub mod channel_mask;
pub mod epoch;
pub mod error;
pub mod hex;

pub use channel_mask::ChannelMask;
pub use epoch::{EpochKind, EpochValue};
pub use error::{LoraError, LoraResult};
