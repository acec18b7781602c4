//! Network time

use super::modem::LoraModem;
use crate::vocabulary::NetworkClock;
use lora_at_core::EpochKind;
use lora_at_transport::ByteTransport;
use tokio::time::sleep;

impl<T, V> LoraModem<T, V>
where
    T: ByteTransport,
    V: NetworkClock,
{
    /// Current network time as seconds since the epoch of `kind`
    ///
    /// Models that learn the time from the network first send a time
    /// request, riding on an empty uplink when the answer needs one.
    ///
    /// # Returns
    /// 0 if the modem has no valid time
    pub async fn get_date_time_epoch(&mut self, kind: EpochKind) -> u32 {
        if let Some(request) = self.vocabulary().time_sync_request() {
            if !self.run_checked(&request).await {
                log::warn!("{} failed", request.describe());
            } else if self.vocabulary().time_sync_via_uplink() && self.is_network_connected() {
                self.transmit_chunk(&[]).await;
            }
        }

        let attempts = self.vocabulary().time_query_attempts().max(1);
        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(self.vocabulary().time_retry_delay()).await;
            }
            let query = self.vocabulary().time_query();
            if let Some(value) = self.query(&query, |v, reply| v.parse_time(reply)).await {
                let seconds = self.vocabulary().epoch_seconds(value, kind);
                log::debug!("network time {} s ({})", seconds, kind.as_str());
                return seconds;
            }
        }
        log::warn!("no network time after {} attempt(s)", attempts);
        0
    }
}
