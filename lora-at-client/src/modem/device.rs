//! Device settings, identity and reset

use super::modem::LoraModem;
use crate::vocabulary::{DeviceClass, DeviceControl, DeviceInfo, SubBand};
use lora_at_session::{Exchange, Reply};
use lora_at_transport::ByteTransport;
use tokio::time::sleep;

impl<T, V> LoraModem<T, V>
where
    T: ByteTransport,
    V: DeviceControl,
{
    /// Run a setter and compare any value echoed back with the one written
    async fn set_verified<R: PartialEq>(
        &mut self,
        exchange: &Exchange,
        expected: R,
        parse: impl FnOnce(&V, &Reply) -> Option<R>,
    ) -> bool {
        let Some(reply) = self.run(exchange).await else {
            return false;
        };
        if !reply.is_success() {
            log::warn!("{} rejected", exchange.describe());
            return false;
        }
        let echoed = parse(self.vocabulary(), &reply);
        if echoed.as_ref().is_some_and(|value| *value != expected) {
            log::warn!("{} echoed a different value", exchange.describe());
            return false;
        }
        true
    }

    pub async fn set_port(&mut self, port: u8) -> bool {
        let command = self.vocabulary().set_port(port);
        self.set_verified(&command, port, |v, reply| v.parse_port(reply)).await
    }

    /// Application port used for uplinks
    pub async fn port(&mut self) -> Option<u8> {
        let query = self.vocabulary().port_query();
        self.query(&query, |v, reply| v.parse_port(reply)).await
    }

    pub async fn set_class(&mut self, class: DeviceClass) -> bool {
        let command = self.vocabulary().set_class(class);
        self.set_verified(&command, class, |v, reply| v.parse_class(reply)).await
    }

    pub async fn class(&mut self) -> Option<DeviceClass> {
        let query = self.vocabulary().class_query();
        self.query(&query, |v, reply| v.parse_class(reply)).await
    }

    /// Join public or private networks
    pub async fn set_public_network(&mut self, public: bool) -> bool {
        let command = self.vocabulary().set_public_network(public);
        self.set_verified(&command, public, |v, reply| v.parse_public_network(reply))
            .await
    }

    pub async fn is_public_network(&mut self) -> Option<bool> {
        let query = self.vocabulary().public_network_query();
        self.query(&query, |v, reply| v.parse_public_network(reply)).await
    }

    /// Retransmissions of an unacknowledged confirmed uplink
    pub async fn set_confirmation_retries(&mut self, retries: u8) -> bool {
        let command = self.vocabulary().set_confirmation_retries(retries);
        self.set_verified(&command, retries, |v, reply| {
            v.parse_confirmation_retries(reply)
        })
        .await
    }

    pub async fn confirmation_retries(&mut self) -> Option<u8> {
        let query = self.vocabulary().confirmation_retries_query();
        self.query(&query, |v, reply| v.parse_confirmation_retries(reply))
            .await
    }

    /// Select a regional band plan (`EU868`, `US915`, ...)
    ///
    /// # Returns
    /// `false` without any I/O on models whose band is fixed
    pub async fn set_band(&mut self, band: &str) -> bool {
        let Some(command) = self.vocabulary().set_band(band) else {
            log::warn!("{} band cannot be changed", self.vocabulary().model());
            return false;
        };
        self.run_checked(&command).await
    }

    pub async fn band(&mut self) -> Option<String> {
        self.device_info(DeviceInfo::Band).await
    }

    /// Read one identity or session value
    ///
    /// # Returns
    /// `None` if the modem does not answer or keeps the value unreadable
    pub async fn device_info(&mut self, info: DeviceInfo) -> Option<String> {
        let Some(query) = self.vocabulary().info_query(info) else {
            log::debug!("{:?} is not readable on {}", info, self.vocabulary().model());
            return None;
        };
        self.query(&query, |v, reply| v.parse_info(info, reply)).await
    }

    pub async fn dev_eui(&mut self) -> Option<String> {
        self.device_info(DeviceInfo::DevEui).await
    }

    pub async fn app_eui(&mut self) -> Option<String> {
        self.device_info(DeviceInfo::AppEui).await
    }

    pub async fn app_key(&mut self) -> Option<String> {
        self.device_info(DeviceInfo::AppKey).await
    }

    /// Device (network) address
    pub async fn dev_addr(&mut self) -> Option<String> {
        self.device_info(DeviceInfo::DevAddr).await
    }

    pub async fn nwk_skey(&mut self) -> Option<String> {
        self.device_info(DeviceInfo::NwkSKey).await
    }

    pub async fn app_skey(&mut self) -> Option<String> {
        self.device_info(DeviceInfo::AppSKey).await
    }

    /// `Firmware: <version> LoRaWAN: <mac version>`, the second part only
    /// on models that report it
    pub async fn module_info(&mut self) -> Option<String> {
        let firmware = self.device_info(DeviceInfo::Firmware).await?;
        let mut info = format!("Firmware: {}", firmware);
        if self.vocabulary().info_query(DeviceInfo::MacVersion).is_some() {
            let mac = self.device_info(DeviceInfo::MacVersion).await;
            info.push_str(" LoRaWAN: ");
            info.push_str(mac.as_deref().unwrap_or("UNKNOWN"));
        }
        Some(info)
    }

    /// Reset the modem CPU and bring it up again
    ///
    /// The modem must be answering before the reset is sent.
    pub async fn restart(&mut self) -> bool {
        if !self.probe().await {
            log::warn!("{} modem did not answer, not restarting", self.vocabulary().model());
            return false;
        }
        let steps = self.vocabulary().restart();
        if !self.run_sequence(&steps).await {
            log::warn!("{} reset failed", self.vocabulary().model());
            return false;
        }
        sleep(self.vocabulary().reset_settle_time()).await;
        log::info!("{} reset", self.vocabulary().model());
        self.begin().await
    }

    /// Restore factory settings and reset the CPU
    ///
    /// The modem is not brought up again: echo and serial settings may
    /// differ from what this driver expects until [`begin`](Self::begin).
    pub async fn factory_default(&mut self) -> bool {
        let steps = self.vocabulary().factory_default();
        let done = self.run_sequence(&steps).await;
        sleep(self.vocabulary().reset_settle_time()).await;
        self.session_mut().network_connected = false;
        if done {
            log::info!("{} restored to factory settings", self.vocabulary().model());
        } else {
            log::warn!("{} factory reset failed", self.vocabulary().model());
        }
        done
    }
}

impl<T, V> LoraModem<T, V>
where
    T: ByteTransport,
    V: SubBand,
{
    /// Restrict a 64-channel plan to one block of eight channels
    ///
    /// # Arguments
    /// * `sub_band` - 1..=8, or 0 for all channels
    pub async fn set_frequency_sub_band(&mut self, sub_band: u8) -> bool {
        if sub_band > 8 {
            log::error!("frequency sub-band {} out of range (0..=8)", sub_band);
            return false;
        }
        let command = self.vocabulary().set_frequency_sub_band(sub_band);
        self.run_checked(&command).await
    }

    pub async fn frequency_sub_band(&mut self) -> Option<u8> {
        let query = self.vocabulary().frequency_sub_band_query();
        self.query(&query, |v, reply| v.parse_frequency_sub_band(reply))
            .await
    }
}
