//! Error types re-exported from the core crate

pub use lora_at_core::error::{LoraError, LoraResult};
