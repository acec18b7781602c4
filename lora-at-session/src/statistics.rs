//! Session statistics collection

/// AT session statistics
///
/// Counters updated by the command channel, the URC dispatcher and the
/// uplink controller. Query them at any time to judge link health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatistics {
    /// Command lines written to the modem
    pub commands_sent: u64,
    /// Waits that ended on a terminal pattern
    pub replies_matched: u64,
    /// Waits that ended without a match
    pub timeouts: u64,
    /// Unsolicited notifications consumed
    pub urcs_handled: u64,
    /// Bytes left over after a timed-out wait
    pub bytes_discarded: u64,
    /// Downlink payload bytes stored in the ring buffer
    pub downlink_bytes: u64,
    /// Downlink payloads truncated for lack of space
    pub downlink_overflows: u64,
    /// Uplink chunk attempts that had to be repeated
    pub uplink_retries: u64,
    /// Payload bytes confirmed sent
    pub uplink_bytes: u64,
}

impl SessionStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_commands_sent(&mut self) {
        self.commands_sent += 1;
    }

    pub fn increment_replies_matched(&mut self) {
        self.replies_matched += 1;
    }

    pub fn increment_timeouts(&mut self) {
        self.timeouts += 1;
    }

    pub fn increment_urcs_handled(&mut self) {
        self.urcs_handled += 1;
    }

    pub fn add_bytes_discarded(&mut self, count: usize) {
        self.bytes_discarded += count as u64;
    }

    pub fn add_downlink_bytes(&mut self, count: usize) {
        self.downlink_bytes += count as u64;
    }

    pub fn increment_downlink_overflows(&mut self) {
        self.downlink_overflows += 1;
    }

    pub fn increment_uplink_retries(&mut self) {
        self.uplink_retries += 1;
    }

    pub fn add_uplink_bytes(&mut self, count: usize) {
        self.uplink_bytes += count as u64;
    }

    /// Percentage of waits that timed out
    ///
    /// Returns 0.0 if nothing has been waited for yet.
    pub fn timeout_rate(&self) -> f64 {
        let waits = self.replies_matched + self.timeouts;
        if waits == 0 {
            0.0
        } else {
            (self.timeouts as f64 / waits as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_rate() {
        let mut stats = SessionStatistics::new();
        assert_eq!(stats.timeout_rate(), 0.0);

        stats.increment_replies_matched();
        stats.increment_replies_matched();
        stats.increment_replies_matched();
        stats.increment_timeouts();
        assert_eq!(stats.timeout_rate(), 25.0);

        stats.clear();
        assert_eq!(stats, SessionStatistics::default());
    }
}
