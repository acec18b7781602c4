//! Per-handle protocol state

use crate::buffer::DownlinkBuffer;
use crate::state::JoinState;
use crate::statistics::SessionStatistics;
use tokio::time::Instant;

/// Mutable state shared by the join, send and URC paths
///
/// Lives as long as the driver handle. Nothing here survives a modem power
/// cycle; the network session itself is kept by the modem.
#[derive(Debug, Clone)]
pub struct Session {
    pub network_connected: bool,
    /// Demodulation margin from the last link check, in dB
    pub link_margin: Option<u8>,
    /// RSSI of the last received downlink, in dBm
    pub signal_quality: Option<i8>,
    pub confirmation_required: bool,
    /// The modem needs a wake preamble before each command
    pub low_power_mode: bool,
    /// Port of the last downlink
    pub last_port: Option<u8>,
    /// Set by every successful uplink
    pub last_downlink_check: Option<Instant>,
    pub join_state: JoinState,
    pub downlink: DownlinkBuffer,
    pub statistics: SessionStatistics,
}

impl Session {
    pub fn new(downlink_capacity: usize) -> Self {
        Self {
            network_connected: false,
            link_margin: None,
            signal_quality: None,
            confirmation_required: false,
            low_power_mode: false,
            last_port: None,
            last_downlink_check: None,
            join_state: JoinState::Idle,
            downlink: DownlinkBuffer::new(downlink_capacity),
            statistics: SessionStatistics::new(),
        }
    }

    /// Move the join state machine, rejecting invalid transitions
    pub fn transition_to(&mut self, new_state: JoinState) -> crate::LoraResult<()> {
        self.join_state.validate_transition(new_state)?;
        log::debug!("join state {} -> {}", self.join_state, new_state);
        self.join_state = new_state;
        Ok(())
    }

    /// Store a received downlink payload
    ///
    /// Writes at most `free()` bytes. A larger payload is truncated and the
    /// overflow logged.
    ///
    /// # Returns
    /// Number of bytes stored
    pub fn deliver_downlink(&mut self, port: Option<u8>, payload: &[u8]) -> usize {
        let free = self.downlink.free();
        if payload.len() > free {
            log::warn!(
                "downlink overflow: {} bytes received, {} bytes free, {} dropped",
                payload.len(),
                free,
                payload.len() - free
            );
            self.statistics.increment_downlink_overflows();
        }
        let written = self.downlink.put(payload, true);
        let size = self.downlink.size();
        self.downlink.announce(size);
        if port.is_some() {
            self.last_port = port;
        }
        self.statistics.add_downlink_bytes(written);
        log::debug!("downlink of {} bytes on port {:?}", written, port);
        written
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(crate::buffer::DEFAULT_CAPACITY)
    }
}
