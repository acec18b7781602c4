//! Command vocabularies
//!
//! A vocabulary maps the engine's logical operations to one modem model's
//! literal command lines and terminal patterns. [`Vocabulary`] is what every
//! model must provide; the optional capabilities gate the matching
//! `LoraModem` methods at compile time:
//!
//! - [`DeviceControl`]: port, class, network type, retries, identity, reset
//! - [`ChannelPlan`]: channel mask
//! - [`SubBand`]: frequency sub-band selection
//! - [`RadioTuning`]: duty cycle and data rate
//! - [`NetworkClock`]: network time
//! - [`LowPower`]: sleep modes

pub mod lora_e5;
pub mod mdot;

pub use lora_e5::LoraE5;
pub use mdot::MDot;

use lora_at_core::{ChannelMask, EpochKind, EpochValue};
use lora_at_session::{Dialect, Exchange, JoinOutcome, Reply, Trailer};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Over-the-air activation inputs, hex encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaaCredentials<'a> {
    pub app_eui: &'a str,
    pub app_key: &'a str,
    pub dev_eui: Option<&'a str>,
}

/// Activation-by-personalization inputs, hex encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbpCredentials<'a> {
    pub dev_addr: &'a str,
    pub nwk_skey: &'a str,
    pub app_skey: &'a str,
    pub uplink_counter: Option<u32>,
    pub downlink_counter: Option<u32>,
}

/// Answer to a link check request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCheck {
    pub margin: u8,
    pub gateways: u8,
}

/// Duty cycle limitation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    pub enabled: bool,
    /// Aggregate duty cycle cap as `1 / 2^max`
    pub max: u8,
}

/// LoRaWAN device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    /// Receive windows only after an uplink
    A,
    /// Scheduled receive slots
    B,
    /// Continuously listening
    C,
}

impl DeviceClass {
    pub fn as_char(&self) -> char {
        match self {
            DeviceClass::A => 'A',
            DeviceClass::B => 'B',
            DeviceClass::C => 'C',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(DeviceClass::A),
            'B' => Some(DeviceClass::B),
            'C' => Some(DeviceClass::C),
            _ => None,
        }
    }
}

/// Identity and session values a modem may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceInfo {
    DevEui,
    AppEui,
    AppKey,
    DevAddr,
    NwkSKey,
    AppSKey,
    Firmware,
    /// LoRaWAN MAC version implemented by the firmware
    MacVersion,
    /// Regional band plan
    Band,
}

/// Terminal patterns of an uplink transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplinkReplies {
    /// Printed when the modem accepts the payload
    pub start: Option<&'static str>,
    /// Network acknowledgement of a confirmed uplink
    pub ack: &'static str,
    /// End of the transmission
    pub done: &'static str,
    /// Transmission refused or failed
    pub error: &'static str,
    /// Read after `done`
    pub trailer: Trailer,
}

/// Operations every supported modem provides
pub trait Vocabulary: Dialect {
    /// Model name for logging
    fn model(&self) -> &'static str;

    /// Liveness check, slot 1 on success
    fn probe(&self) -> Exchange;

    /// Commands run once after a successful probe
    fn init_sequence(&self) -> Vec<Exchange>;

    /// Query the payload budget of the next transmission
    fn uplink_budget_query(&self) -> Exchange;

    fn parse_uplink_budget(&self, reply: &Reply) -> Option<usize>;

    /// Command carrying `payload`; an empty payload flushes the MAC queue
    fn uplink(&self, payload: &[u8], confirmed: bool) -> Exchange;

    fn uplink_replies(&self) -> UplinkReplies;

    /// Downlink payload carried inside a successful uplink reply
    fn downlink_in_reply(&self, _reply: &Reply) -> Option<Vec<u8>> {
        None
    }

    /// Commands that switch network acknowledgement of uplinks
    fn confirmation(&self, _required: bool) -> Vec<Exchange> {
        Vec::new()
    }

    fn join_request(&self, force: bool) -> Exchange;

    /// Classify the slot a join request's reply matched
    fn classify_join(&self, index: u8) -> JoinOutcome;

    /// Wait that finishes a join reply after classification
    fn join_trailer(&self, _outcome: JoinOutcome, _timeout: Duration) -> Option<Exchange> {
        None
    }

    /// Query how long until a channel is free for the next join
    fn channel_free_query(&self) -> Option<Exchange> {
        None
    }

    fn parse_channel_free(&self, _reply: &Reply) -> Option<Duration> {
        None
    }

    fn provision_otaa(&self, credentials: &OtaaCredentials<'_>) -> Vec<Exchange>;

    fn provision_abp(&self, credentials: &AbpCredentials<'_>) -> Vec<Exchange>;

    /// Request a link check; the answer may arrive as a notification
    fn link_check_request(&self) -> Exchange;

    fn parse_link_check(&self, _reply: &Reply) -> Option<LinkCheck> {
        None
    }

    /// Wait that finishes a link check reply saying the modem has no
    /// network session; `None` for any other reply
    fn link_check_refused(&self, _reply: &Reply) -> Option<Exchange> {
        None
    }

    /// The link check answer only comes back with the next uplink
    fn link_check_via_uplink(&self) -> bool {
        false
    }

    /// A successful join reply is confirmed with a link check
    fn verify_join(&self) -> bool {
        false
    }

    /// Direct signal strength query, if the model has one
    fn signal_query(&self) -> Option<Exchange> {
        None
    }

    fn parse_signal(&self, _reply: &Reply) -> Option<i8> {
        None
    }
}

/// Device settings, identity and reset
pub trait DeviceControl: Vocabulary {
    /// Application port of subsequent uplinks
    fn set_port(&self, port: u8) -> Exchange;

    fn port_query(&self) -> Exchange;

    fn parse_port(&self, reply: &Reply) -> Option<u8>;

    fn set_class(&self, class: DeviceClass) -> Exchange;

    fn class_query(&self) -> Exchange;

    fn parse_class(&self, reply: &Reply) -> Option<DeviceClass>;

    /// Public or private network sync word
    fn set_public_network(&self, public: bool) -> Exchange;

    fn public_network_query(&self) -> Exchange;

    fn parse_public_network(&self, reply: &Reply) -> Option<bool>;

    /// Retransmissions of an unacknowledged confirmed uplink
    fn set_confirmation_retries(&self, retries: u8) -> Exchange;

    fn confirmation_retries_query(&self) -> Exchange;

    fn parse_confirmation_retries(&self, reply: &Reply) -> Option<u8>;

    /// `None` if the band is fixed at the factory
    fn set_band(&self, band: &str) -> Option<Exchange>;

    /// `None` if the value cannot be read back from the modem
    fn info_query(&self, info: DeviceInfo) -> Option<Exchange>;

    fn parse_info(&self, info: DeviceInfo, reply: &Reply) -> Option<String>;

    /// Commands that reset the CPU, saving pending settings first
    fn restart(&self) -> Vec<Exchange>;

    /// Commands that restore factory settings and reset the CPU
    fn factory_default(&self) -> Vec<Exchange>;

    /// Time the modem needs to come back after a reset
    fn reset_settle_time(&self) -> Duration {
        Duration::ZERO
    }
}

/// Channel enable/disable support
pub trait ChannelPlan: Vocabulary {
    /// 16 or 72
    fn channel_count(&self) -> usize;

    fn channel_mask_query(&self) -> Exchange;

    fn parse_channel_mask(&self, reply: &Reply) -> Option<ChannelMask>;

    /// Commands that write a whole mask
    fn write_channel_mask(&self, mask: &ChannelMask) -> Vec<Exchange>;

    /// A single-channel command, if the model has one
    fn channel_toggle(&self, _channel: usize, _enabled: bool) -> Option<Exchange> {
        None
    }
}

/// Frequency sub-band selection of 64-channel plans
pub trait SubBand: Vocabulary {
    /// 1..=8 selects one block of eight channels, 0 enables all
    fn set_frequency_sub_band(&self, sub_band: u8) -> Exchange;

    fn frequency_sub_band_query(&self) -> Exchange;

    fn parse_frequency_sub_band(&self, reply: &Reply) -> Option<u8>;
}

/// Duty cycle and data rate control
pub trait RadioTuning: Vocabulary {
    /// `None` if the model cannot switch the limitation this way
    fn set_duty_cycle(&self, enabled: bool) -> Option<Exchange>;

    fn duty_cycle_query(&self) -> Exchange;

    fn parse_duty_cycle(&self, reply: &Reply) -> Option<DutyCycle>;

    fn set_max_duty_cycle(&self, max: u8) -> Exchange;

    fn set_data_rate(&self, data_rate: u8) -> Exchange;

    fn data_rate_query(&self) -> Exchange;

    fn parse_data_rate(&self, reply: &Reply) -> Option<u8>;

    fn set_adaptive_data_rate(&self, enabled: bool) -> Exchange;

    fn adaptive_data_rate_query(&self) -> Exchange;

    fn parse_adaptive_data_rate(&self, reply: &Reply) -> Option<bool>;
}

/// Network time support
pub trait NetworkClock: Vocabulary {
    /// Ask the network for the time
    fn time_sync_request(&self) -> Option<Exchange> {
        None
    }

    /// The answer to [`time_sync_request`](Self::time_sync_request) only
    /// comes back with the next uplink
    fn time_sync_via_uplink(&self) -> bool {
        false
    }

    fn time_query(&self) -> Exchange;

    fn parse_time(&self, reply: &Reply) -> Option<EpochValue>;

    /// Seconds since the epoch of `kind` for a parsed time
    fn epoch_seconds(&self, value: EpochValue, kind: EpochKind) -> u32 {
        value.convert(kind).seconds
    }

    fn time_query_attempts(&self) -> u8 {
        1
    }

    fn time_retry_delay(&self) -> Duration {
        Duration::from_secs(10)
    }
}

/// Sleep modes
pub trait LowPower: Vocabulary {
    /// Sleep between commands, woken by the next command
    fn auto_sleep(&self, enabled: bool) -> Exchange;

    /// Sleep for `duration`, then wake by itself
    fn sleep(&self, duration: Duration) -> Vec<Exchange>;

    /// Sleep until the next byte arrives on the serial line
    fn uart_sleep(&self) -> Vec<Exchange>;
}

/// First unsigned integer in `text`
pub(crate) fn first_number(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
