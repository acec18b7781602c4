//! Modem timing and retry configuration

use crate::backoff::BackoffPolicy;
use lora_at_session::{DEFAULT_CAPACITY, DEFAULT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing constants and retry counts of one [`LoraModem`](super::LoraModem)
///
/// Fields missing from a serialized form take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Reply timeout of ordinary commands
    pub command_timeout: Duration,
    /// Total time `begin` keeps probing
    pub probe_timeout: Duration,
    /// Reply timeout of one probe
    pub probe_reply_timeout: Duration,
    pub join_timeout: Duration,
    pub join_attempts: u8,
    /// Ask the modem to join even if it holds a session
    pub force_join: bool,
    /// Wait for the end of an unconfirmed uplink
    pub message_timeout: Duration,
    /// Wait for the network acknowledgement of a confirmed uplink
    pub ack_timeout: Duration,
    pub link_check_attempts: u8,
    pub link_check_interval: Duration,
    pub signal_query_attempts: u8,
    /// `maintain` polls for downlinks when the last uplink is older
    pub downlink_check_interval: Duration,
    pub downlink_capacity: usize,
    pub poll_interval: Duration,
    /// Consecutive zero-budget transmissions before a send gives up
    pub max_consecutive_flushes: u8,
    pub confirmation_required: bool,
    pub backoff: BackoffPolicy,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(10),
            probe_reply_timeout: Duration::from_millis(200),
            join_timeout: Duration::from_secs(60),
            join_attempts: 5,
            force_join: false,
            message_timeout: Duration::from_secs(15),
            ack_timeout: Duration::from_secs(60),
            link_check_attempts: 10,
            link_check_interval: Duration::from_secs(5),
            signal_query_attempts: 5,
            downlink_check_interval: Duration::from_secs(30),
            downlink_capacity: DEFAULT_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_flushes: 8,
            confirmation_required: false,
            backoff: BackoffPolicy::default(),
        }
    }
}
