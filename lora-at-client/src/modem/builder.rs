//! Modem builder
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use lora_at_client::{MDot, ModemBuilder};
//!
//! # async fn demo() -> lora_at_core::LoraResult<()> {
//! let mut modem = ModemBuilder::new()
//!     .serial("/dev/ttyACM0", 115200)
//!     .join_attempts(3)
//!     .confirmation_required(true)
//!     .build_serial(MDot::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use super::config::ModemConfig;
use super::modem::LoraModem;
use crate::backoff::BackoffPolicy;
use crate::vocabulary::Vocabulary;
use lora_at_core::{LoraError, LoraResult};
use lora_at_transport::serial::DEFAULT_BAUD_RATE;
use lora_at_transport::{ByteTransport, SerialSettings, SerialTransport, TransportLayer};
use std::time::Duration;

/// Builder for [`LoraModem`]
///
/// Starts from [`ModemConfig::default`]; every setter overrides one field.
#[derive(Debug, Clone)]
pub struct ModemBuilder {
    serial: Option<SerialSettings>,
    config: ModemConfig,
}

impl ModemBuilder {
    pub fn new() -> Self {
        Self {
            serial: None,
            config: ModemConfig::default(),
        }
    }

    /// Configure the serial port
    ///
    /// # Arguments
    /// * `port_name` - e.g. "/dev/ttyUSB0" or "COM3"
    /// * `baud_rate` - e.g. 9600 for the LoRa-E5, 115200 for the mDOT
    pub fn serial(mut self, port_name: &str, baud_rate: u32) -> Self {
        self.serial = Some(SerialSettings::new(port_name.to_string(), baud_rate));
        self
    }

    /// Serial port at the default baud rate
    pub fn serial_port(self, port_name: &str) -> Self {
        self.serial(port_name, DEFAULT_BAUD_RATE)
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ModemConfig) -> Self {
        self.config = config;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout = timeout;
        self
    }

    pub fn join_attempts(mut self, attempts: u8) -> Self {
        self.config.join_attempts = attempts;
        self
    }

    pub fn force_join(mut self, force: bool) -> Self {
        self.config.force_join = force;
        self
    }

    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.config.message_timeout = timeout;
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Applied by `begin`
    pub fn confirmation_required(mut self, required: bool) -> Self {
        self.config.confirmation_required = required;
        self
    }

    pub fn downlink_capacity(mut self, capacity: usize) -> Self {
        self.config.downlink_capacity = capacity;
        self
    }

    pub fn downlink_check_interval(mut self, interval: Duration) -> Self {
        self.config.downlink_check_interval = interval;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Build over a caller-supplied transport (already open)
    pub fn build_with<T, V>(self, transport: T, vocabulary: V) -> LoraModem<T, V>
    where
        T: ByteTransport,
        V: Vocabulary,
    {
        LoraModem::new(transport, vocabulary, self.config)
    }

    /// Open the configured serial port and build over it
    ///
    /// # Errors
    /// `InvalidData` if no serial port was configured, `Connection` if it
    /// cannot be opened
    pub async fn build_serial<V: Vocabulary>(
        self,
        vocabulary: V,
    ) -> LoraResult<LoraModem<SerialTransport, V>> {
        let settings = self.serial.clone().ok_or_else(|| {
            LoraError::InvalidData("Serial port must be configured".to_string())
        })?;
        let mut transport = SerialTransport::new(settings);
        transport.open().await?;
        Ok(self.build_with(transport, vocabulary))
    }
}

impl Default for ModemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::LoraE5;
    use lora_at_transport::StreamTransport;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_setters_override_defaults() {
        let builder = ModemBuilder::new()
            .join_attempts(2)
            .confirmation_required(true)
            .downlink_capacity(64);
        assert_eq!(builder.config.join_attempts, 2);
        assert!(builder.config.confirmation_required);
        assert_eq!(builder.config.command_timeout, Duration::from_secs(1));

        let modem = builder.build_with(StreamTransport::new(Builder::new().build()), LoraE5::new());
        assert_eq!(modem.session().downlink.capacity(), 64);
        assert!(modem.is_confirmation_required());
    }

    #[tokio::test]
    async fn test_serial_must_be_configured() {
        let result = ModemBuilder::new().build_serial(LoraE5::new()).await;
        assert!(matches!(result, Err(LoraError::InvalidData(_))));
    }
}
