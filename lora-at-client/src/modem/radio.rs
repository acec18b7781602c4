//! Channel plan, radio tuning and sleep operations
//!
//! Each impl block exists only for vocabularies with the matching
//! capability, so calling an unsupported operation does not compile.

use super::modem::LoraModem;
use crate::vocabulary::{ChannelPlan, LowPower, RadioTuning};
use lora_at_core::ChannelMask;
use lora_at_transport::ByteTransport;
use std::time::Duration;

impl<T, V> LoraModem<T, V>
where
    T: ByteTransport,
    V: ChannelPlan,
{
    /// Current channel mask as reported by the modem
    pub async fn channel_mask(&mut self) -> Option<ChannelMask> {
        let query = self.vocabulary().channel_mask_query();
        self.query(&query, |v, reply| v.parse_channel_mask(reply)).await
    }

    /// Current channel mask in its hex wire form
    pub async fn channel_mask_hex(&mut self) -> Option<String> {
        self.channel_mask().await.map(|mask| mask.to_hex())
    }

    /// Write a whole channel mask
    ///
    /// The mask must cover the modem's channel count.
    pub async fn set_channel_mask(&mut self, mask: &ChannelMask) -> bool {
        let expected = self.vocabulary().channel_count();
        if mask.channel_count() != expected {
            log::error!(
                "channel mask covers {} channels, modem has {}",
                mask.channel_count(),
                expected
            );
            return false;
        }
        for step in self.vocabulary().write_channel_mask(mask) {
            if !self.run_checked(&step).await {
                log::warn!("{} failed", step.describe());
                return false;
            }
        }
        true
    }

    /// Write a channel mask given in hex (4, 18 or 20 digits)
    pub async fn set_channel_mask_hex(&mut self, hex: &str) -> bool {
        match ChannelMask::from_hex(hex) {
            Ok(mask) => self.set_channel_mask(&mask).await,
            Err(e) => {
                log::error!("{}", e);
                false
            }
        }
    }

    pub async fn is_channel_enabled(&mut self, channel: usize) -> bool {
        self.channel_mask()
            .await
            .is_some_and(|mask| mask.is_enabled(channel).unwrap_or(false))
    }

    pub async fn enable_channel(&mut self, channel: usize) -> bool {
        self.toggle_channel(channel, true).await
    }

    pub async fn disable_channel(&mut self, channel: usize) -> bool {
        self.toggle_channel(channel, false).await
    }

    /// Single-channel command if the model has one, otherwise
    /// read-modify-write of the whole mask
    async fn toggle_channel(&mut self, channel: usize, enabled: bool) -> bool {
        let count = self.vocabulary().channel_count();
        if channel >= count {
            log::error!("channel {} out of range (0..{})", channel, count);
            return false;
        }
        if let Some(toggle) = self.vocabulary().channel_toggle(channel, enabled) {
            return self.run_checked(&toggle).await;
        }

        let Some(mut mask) = self.channel_mask().await else {
            return false;
        };
        if let Err(e) = mask.set_enabled(channel, enabled) {
            log::error!("{}", e);
            return false;
        }
        self.set_channel_mask(&mask).await
    }
}

impl<T, V> LoraModem<T, V>
where
    T: ByteTransport,
    V: RadioTuning,
{
    /// Switch the regulatory duty cycle limitation
    pub async fn enable_duty_cycle(&mut self, enabled: bool) -> bool {
        match self.vocabulary().set_duty_cycle(enabled) {
            Some(command) => self.run_checked(&command).await,
            None => {
                log::warn!(
                    "{} cannot switch duty cycle {}",
                    self.vocabulary().model(),
                    if enabled { "on" } else { "off" }
                );
                false
            }
        }
    }

    pub async fn is_duty_cycle_enabled(&mut self) -> bool {
        let query = self.vocabulary().duty_cycle_query();
        self.query(&query, |v, reply| v.parse_duty_cycle(reply))
            .await
            .is_some_and(|duty| duty.enabled)
    }

    /// Cap the aggregate duty cycle at `1 / 2^max`
    pub async fn set_max_duty_cycle(&mut self, max: u8) -> bool {
        let command = self.vocabulary().set_max_duty_cycle(max);
        self.run_checked(&command).await
    }

    pub async fn max_duty_cycle(&mut self) -> Option<u8> {
        let query = self.vocabulary().duty_cycle_query();
        self.query(&query, |v, reply| v.parse_duty_cycle(reply))
            .await
            .map(|duty| duty.max)
    }

    pub async fn set_data_rate(&mut self, data_rate: u8) -> bool {
        let command = self.vocabulary().set_data_rate(data_rate);
        self.run_checked(&command).await
    }

    pub async fn data_rate(&mut self) -> Option<u8> {
        let query = self.vocabulary().data_rate_query();
        self.query(&query, |v, reply| v.parse_data_rate(reply)).await
    }

    pub async fn set_adaptive_data_rate(&mut self, enabled: bool) -> bool {
        let command = self.vocabulary().set_adaptive_data_rate(enabled);
        self.run_checked(&command).await
    }

    pub async fn adaptive_data_rate(&mut self) -> Option<bool> {
        let query = self.vocabulary().adaptive_data_rate_query();
        self.query(&query, |v, reply| v.parse_adaptive_data_rate(reply))
            .await
    }
}

impl<T, V> LoraModem<T, V>
where
    T: ByteTransport,
    V: LowPower,
{
    /// Let the modem sleep between commands
    ///
    /// While enabled, commands are preceded by the wake preamble.
    pub async fn enable_auto_sleep(&mut self, enabled: bool) -> bool {
        let command = self.vocabulary().auto_sleep(enabled);
        if !self.run_checked(&command).await {
            return false;
        }
        let needs_wake = enabled && !self.vocabulary().wake_preamble().is_empty();
        self.session_mut().low_power_mode = needs_wake;
        true
    }

    /// Sleep for `duration`; the modem wakes by itself
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        let steps = self.vocabulary().sleep(duration);
        if !self.run_sequence(&steps).await {
            log::warn!("{} did not enter timed sleep", self.vocabulary().model());
            return false;
        }
        log::debug!("modem asleep for {:?}", duration);
        true
    }

    /// Sleep until the next serial traffic
    ///
    /// Later commands carry the wake preamble on models that need one.
    pub async fn uart_sleep(&mut self) -> bool {
        let steps = self.vocabulary().uart_sleep();
        if !self.run_sequence(&steps).await {
            log::warn!("{} did not enter serial sleep", self.vocabulary().model());
            return false;
        }
        if !self.vocabulary().wake_preamble().is_empty() {
            self.session_mut().low_power_mode = true;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::modem::tests::scripted;
    use crate::vocabulary::{LoraE5, MDot};
    use lora_at_core::ChannelMask;
    use std::time::Duration;
    use tokio_test::io::Builder;

    #[tokio::test(start_paused = true)]
    async fn test_mdot_mask_read_modify_write() {
        let mock = Builder::new()
            .write(b"AT+CHM?\r\n")
            .read(b"\r\n00FF00000000000000000000\r\n\r\nOK\r\n")
            .build();
        let mut modem = scripted(mock, MDot::new());
        // 24 digits is not a mask size
        assert_eq!(modem.channel_mask().await, None);

        let mut builder = Builder::new();
        builder
            .write(b"AT+CHM?\r\n")
            .read(b"\r\n00FF0000000000000000\r\n\r\nOK\r\n");
        for (offset, chunk) in [(4, "00FF"), (3, "0000"), (2, "0000"), (1, "0000"), (0, "0001")] {
            builder
                .write(format!("AT+CHM={},{}\r\n", offset, chunk).as_bytes())
                .read(b"\r\nOK\r\n");
        }
        let mut modem = scripted(builder.build(), MDot::new());
        assert!(modem.enable_channel(64).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_e5_single_channel_toggle() {
        let mock = Builder::new()
            .write(b"AT+CH=3,OFF\r\n")
            .read(b"+CH: CH3 off\r\n")
            .build();
        let mut modem = scripted(mock, LoraE5::new());
        assert!(modem.disable_channel(3).await);
        assert!(!modem.disable_channel(72).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mask_size_must_match_modem() {
        let mut modem = scripted(Builder::new().build(), MDot::new());
        let mask = ChannelMask::new(16).unwrap();
        assert!(!modem.set_channel_mask(&mask).await);
        assert!(!modem.set_channel_mask_hex("not hex").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duty_cycle_and_data_rate() {
        let mock = Builder::new()
            .write(b"AT+LW=DC, OFF\r\n")
            .read(b"+LW: DC, OFF\r\n")
            .write(b"AT+LW=DC\r\n")
            .read(b"+LW: DC, OFF, 0\r\n")
            .write(b"AT+DR=3\r\n")
            .read(b"+DR: DR3\r\n")
            .write(b"AT+DR\r\n")
            .read(b"+DR: DR3\r\n")
            .write(b"AT+ADR?\r\n")
            .read(b"+ADR: ON\r\n")
            .build();
        let mut modem = scripted(mock, LoraE5::new());
        assert!(modem.enable_duty_cycle(false).await);
        assert!(!modem.is_duty_cycle_enabled().await);
        assert!(modem.set_data_rate(3).await);
        assert_eq!(modem.data_rate().await, Some(3));
        assert_eq!(modem.adaptive_data_rate().await, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mdot_cannot_reenable_duty_cycle() {
        let mut modem = scripted(Builder::new().build(), MDot::new());
        assert!(!modem.enable_duty_cycle(true).await);
        assert_eq!(modem.statistics().commands_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_sleep_sets_low_power_mode() {
        let mock = Builder::new()
            .write(b"AT+LOWPOWER=AUTOON\r\n")
            .read(b"+LOWPOWER: AUTOON\r\n")
            .write(b"\xFF\xFF\xFF\xFFAT+LOWPOWER=AUTOOFF\r\n")
            .read(b"+LOWPOWER: AUTOOFF\r\n")
            .build();
        let mut modem = scripted(mock, LoraE5::new());
        assert!(modem.enable_auto_sleep(true).await);
        assert!(modem.session().low_power_mode);
        assert!(modem.enable_auto_sleep(false).await);
        assert!(!modem.session().low_power_mode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_e5_timed_and_serial_sleep() {
        let mock = Builder::new()
            .write(b"AT+LOWPOWER=5000\r\n")
            .read(b"+LOWPOWER: SLEEP\r\n")
            .write(b"AT+LOWPOWER\r\n")
            .read(b"+LOWPOWER: SLEEP\r\n")
            .build();
        let mut modem = scripted(mock, LoraE5::new());
        assert!(modem.sleep(Duration::from_secs(5)).await);
        assert!(!modem.session().low_power_mode);
        assert!(modem.uart_sleep().await);
        assert!(modem.session().low_power_mode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mdot_sleep_sequences() {
        let mock = Builder::new()
            .write(b"AT+WM=0\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+WI=60\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+SLEEP=0\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+WM=1\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+WP=1,0,0\r\n")
            .read(b"\r\nERROR\r\n")
            .build();
        let mut modem = scripted(mock, MDot::new());
        assert!(modem.sleep(Duration::from_secs(60)).await);
        // the wake pin is required, so sleep is never requested
        assert!(!modem.uart_sleep().await);
        assert!(!modem.session().low_power_mode);
        assert_eq!(modem.statistics().commands_sent, 5);
    }
}
