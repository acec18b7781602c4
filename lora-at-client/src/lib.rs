//! LoRaWAN modem driver
//!
//! This crate provides the application-facing side of the driver: the
//! per-model command vocabularies and the [`LoraModem`] engine that runs
//! joins, chunked uplinks and downlink polling over an [`AtPort`].
//!
//! # Components
//!
//! ## Engine
//! - [x] Modem bring-up (probe, low-power wake, init sequence)
//! - [x] Chunked uplink with per-chunk retries and MAC flushes
//! - [x] Join state machine with capped exponential backoff
//! - [x] OTAA / ABP provisioning with credential validation
//! - [x] Link check, signal quality, downlink polling
//! - [x] Builder over serial ports or any byte transport
//!
//! ## Capabilities
//! - [x] Device control (port, class, network type, retries, identity, reset)
//! - [x] Channel plan (mask get/set, per-channel enable)
//! - [x] Frequency sub-band (mDOT)
//! - [x] Radio tuning (duty cycle, data rate, ADR)
//! - [x] Network clock (UNIX / Y2K / GPS epochs)
//! - [x] Automatic, timed and serial-wake sleep
//!
//! ## Vocabularies
//! - [x] Seeed LoRa-E5
//! - [x] MultiTech mDOT
//!
//! [`AtPort`]: lora_at_session::AtPort

pub mod backoff;
pub mod modem;
pub mod vocabulary;

pub use backoff::BackoffPolicy;
pub use modem::{JoinReport, LoraModem, ModemBuilder, ModemConfig};
pub use vocabulary::{
    AbpCredentials, ChannelPlan, DeviceClass, DeviceControl, DeviceInfo, DutyCycle, LinkCheck,
    LoraE5, LowPower, MDot, NetworkClock, OtaaCredentials, RadioTuning, SubBand, UplinkReplies,
    Vocabulary,
};
