//! Uplink transmission controller
//!
//! A payload longer than the modem's per-transmission budget goes out as
//! several chunks. Each chunk is retried on its own; bytes already sent are
//! never sent again. A budget of zero means the modem's MAC command queue
//! is full, and an empty transmission is made to flush it.

use super::modem::LoraModem;
use crate::vocabulary::Vocabulary;
use lora_at_session::{Reply, Trailer};
use lora_at_transport::ByteTransport;
use std::time::Duration;
use tokio::time::Instant;

/// Attempts per chunk before a send is abandoned
pub const UPLINK_CHUNK_ATTEMPTS: u8 = 5;

impl<T, V> LoraModem<T, V>
where
    T: ByteTransport,
    V: Vocabulary,
{
    /// Send an application payload
    ///
    /// Runs at least one transmission, so an empty payload flushes the MAC
    /// queue. Stops early when the session is lost, a chunk fails
    /// [`UPLINK_CHUNK_ATTEMPTS`] times, or the modem keeps reporting a zero
    /// budget.
    ///
    /// # Returns
    /// Number of payload bytes sent; compare with `payload.len()` to detect
    /// a partial send
    pub async fn send(&mut self, payload: &[u8]) -> usize {
        let total = payload.len();
        let mut sent = 0;
        let mut flushes = 0u8;

        loop {
            if !self.is_network_connected() {
                log::warn!("not connected, {} of {} bytes sent", sent, total);
                break;
            }

            let chunk_len = if total == 0 {
                0
            } else {
                self.uplink_budget().await.min(total - sent)
            };
            if chunk_len == 0 {
                flushes += 1;
                if flushes > self.config.max_consecutive_flushes {
                    log::warn!("MAC queue never drained, {} of {} bytes sent", sent, total);
                    break;
                }
                log::debug!("sending empty uplink to flush the MAC queue");
            } else {
                flushes = 0;
            }

            let chunk = &payload[sent..sent + chunk_len];
            if !self.transmit_with_retries(chunk).await {
                log::warn!("uplink abandoned, {} of {} bytes sent", sent, total);
                break;
            }
            sent += chunk_len;
            if sent >= total {
                break;
            }
        }
        sent
    }

    /// Payload bytes the next transmission may carry, 0 if unknown
    async fn uplink_budget(&mut self) -> usize {
        let query = self.vocabulary().uplink_budget_query();
        self.query(&query, |v, reply| v.parse_uplink_budget(reply))
            .await
            .unwrap_or(0)
    }

    async fn transmit_with_retries(&mut self, chunk: &[u8]) -> bool {
        for attempt in 1..=UPLINK_CHUNK_ATTEMPTS {
            if !self.is_network_connected() {
                return false;
            }
            if attempt > 1 {
                log::debug!("retrying {}-byte uplink (attempt {})", chunk.len(), attempt);
                self.session_mut().statistics.increment_uplink_retries();
            }
            if self.transmit_chunk(chunk).await {
                return true;
            }
        }
        false
    }

    /// One transmission: write, wait for the start (if any), then for the
    /// acknowledgement or the end of transmission
    ///
    /// A downlink carried in the reply goes to the ring buffer.
    pub(super) async fn transmit_chunk(&mut self, chunk: &[u8]) -> bool {
        let confirmed = self.session().confirmation_required;
        let uplink = self.vocabulary().uplink(chunk, confirmed);
        let replies = self.vocabulary().uplink_replies();

        if let Err(e) = self.port.write_command(uplink.command()).await {
            log::error!("{} failed: {}", uplink.describe(), e);
            return false;
        }

        if let Some(start) = replies.start {
            let reply = self
                .wait(self.config.command_timeout, &[start, replies.error, replies.done])
                .await;
            if !reply.is_some_and(|reply| reply.is_success()) {
                log::debug!("{} was not accepted", uplink.describe());
                return false;
            }
        }

        let reply = if confirmed {
            let Some(reply) = self
                .wait(self.config.ack_timeout, &[replies.ack, replies.done, replies.error])
                .await
            else {
                return false;
            };
            if reply.is_success() && replies.ack != replies.done {
                // the end of transmission still follows the acknowledgement
                self.wait(self.config.message_timeout, &[replies.done]).await;
            }
            reply
        } else {
            let Some(reply) = self
                .wait(self.config.message_timeout, &[replies.done, replies.error])
                .await
            else {
                return false;
            };
            reply
        };

        if !reply.is_success() {
            let reason = if reply.is_timeout() { "no reply" } else { "failed" };
            log::debug!("{}: {}", uplink.describe(), reason);
            return false;
        }
        if replies.trailer == Trailer::Line {
            if let Err(e) = self.port.read_line(self.config.command_timeout).await {
                log::error!("{} trailer: {}", uplink.describe(), e);
            }
        }

        let session = self.session_mut();
        session.last_downlink_check = Some(Instant::now());
        session.statistics.add_uplink_bytes(chunk.len());
        if let Some(payload) = self.vocabulary().downlink_in_reply(&reply) {
            self.session_mut().deliver_downlink(None, &payload);
        }
        true
    }

    async fn wait(&mut self, timeout: Duration, patterns: &[&str]) -> Option<Reply> {
        match self.port.wait_response(timeout, patterns).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                log::error!("uplink reply: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::modem::tests::{joined, scripted};
    use super::*;
    use crate::vocabulary::{LoraE5, MDot};
    use tokio_test::io::Builder;

    #[tokio::test(start_paused = true)]
    async fn test_chunks_follow_reported_budgets() {
        let mock = Builder::new()
            .write(b"AT+LW=LEN\r\n")
            .read(b"+LW: LEN, 4\r\n")
            .write(b"AT+MSGHEX=\"00010203\"\r\n")
            .read(b"+MSGHEX: Start\r\n+MSGHEX: Done\r\n")
            .write(b"AT+LW=LEN\r\n")
            .read(b"+LW: LEN, 4\r\n")
            .write(b"AT+MSGHEX=\"04050607\"\r\n")
            .read(b"+MSGHEX: Start\r\n+MSGHEX: Done\r\n")
            .write(b"AT+LW=LEN\r\n")
            .read(b"+LW: LEN, 2\r\n")
            .write(b"AT+MSGHEX=\"0809\"\r\n")
            .read(b"+MSGHEX: Start\r\n+MSGHEX: Done\r\n")
            .build();
        let mut modem = joined(mock, LoraE5::new());

        let payload: Vec<u8> = (0..10).collect();
        assert_eq!(modem.send(&payload).await, 10);
        assert_eq!(modem.statistics().uplink_bytes, 10);
        assert_eq!(modem.statistics().uplink_retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_flushes_then_sends() {
        let mock = Builder::new()
            .write(b"AT+LW=LEN\r\n")
            .read(b"+LW: LEN, 0\r\n")
            .write(b"AT+MSGHEX\r\n")
            .read(b"+MSGHEX: Start\r\n+MSGHEX: Done\r\n")
            .write(b"AT+LW=LEN\r\n")
            .read(b"+LW: LEN, 51\r\n")
            .write(b"AT+MSGHEX=\"AABB\"\r\n")
            .read(b"+MSGHEX: Start\r\n+MSGHEX: Done\r\n")
            .build();
        let mut modem = joined(mock, LoraE5::new());
        assert_eq!(modem.send(&[0xAA, 0xBB]).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chunk_is_retried_alone() {
        let mock = Builder::new()
            .write(b"AT+LW=LEN\r\n")
            .read(b"+LW: LEN, 1\r\n")
            .write(b"AT+MSGHEX=\"01\"\r\n")
            .read(b"+MSGHEX: Start\r\n+MSGHEX: Done\r\n")
            .write(b"AT+LW=LEN\r\n")
            .read(b"+LW: LEN, 1\r\n")
            .write(b"AT+MSGHEX=\"02\"\r\n")
            .read(b"+MSGHEX: ERROR(-1)\r\n")
            .write(b"AT+MSGHEX=\"02\"\r\n")
            .read(b"+MSGHEX: Start\r\n+MSGHEX: Done\r\n")
            .build();
        let mut modem = joined(mock, LoraE5::new());
        assert_eq!(modem.send(&[0x01, 0x02]).await, 2);
        assert_eq!(modem.statistics().uplink_retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_joined_notice_ends_send() {
        let mock = Builder::new()
            .write(b"AT+LW=LEN\r\n")
            .read(b"+LW: LEN, 51\r\n")
            .write(b"AT+MSGHEX=\"01\"\r\n")
            .read(b"+MSGHEX: Please join network first\r\n+MSGHEX: Done\r\n")
            .build();
        let mut modem = joined(mock, LoraE5::new());
        assert_eq!(modem.send(&[0x01]).await, 0);
        assert!(!modem.is_network_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_session() {
        let mut modem = scripted(Builder::new().build(), LoraE5::new());
        assert_eq!(modem.send(b"data").await, 0);
        assert_eq!(modem.statistics().commands_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_gives_up_after_five_attempts() {
        // budget query only runs once per chunk
        let mut builder = Builder::new();
        builder.write(b"AT+TXS?\r\n").read(b"\r\n242\r\n\r\nOK\r\n");
        for _ in 0..UPLINK_CHUNK_ATTEMPTS {
            builder.write(b"AT+SENDB=01\r\n").read(b"\r\nERROR\r\n");
        }
        let mut modem = joined(builder.build(), MDot::new());
        assert_eq!(modem.send(&[0x01]).await, 0);
        assert_eq!(modem.statistics().uplink_retries, u64::from(UPLINK_CHUNK_ATTEMPTS - 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mdot_downlink_inside_reply() {
        let mock = Builder::new()
            .write(b"AT+TXS?\r\n")
            .read(b"\r\n242\r\n\r\nOK\r\n")
            .write(b"AT+SENDB=CAFE\r\n")
            .read(b"\r\n0A0B0C\r\n\r\nOK\r\n")
            .build();
        let mut modem = joined(mock, MDot::new());
        assert_eq!(modem.send(&[0xCA, 0xFE]).await, 2);
        assert_eq!(modem.available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_uplink_waits_for_ack() {
        let mock = Builder::new()
            .write(b"AT+LW=LEN\r\n")
            .read(b"+LW: LEN, 51\r\n")
            .write(b"AT+CMSGHEX=\"01\"\r\n")
            .read(b"+CMSGHEX: Start\r\n+CMSGHEX: Wait ACK\r\n+CMSGHEX: ACK Received\r\n")
            .read(b"+CMSGHEX: RXWIN1, RSSI -40, SNR 8.0\r\n+CMSGHEX: Done\r\n")
            .build();
        let mut modem = joined(mock, LoraE5::new());
        modem.session_mut().confirmation_required = true;
        assert_eq!(modem.send(&[0x01]).await, 1);
        assert_eq!(modem.session().signal_quality, Some(-40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_uplink_without_ack_fails() {
        let mut builder = Builder::new();
        builder.write(b"AT+LW=LEN\r\n").read(b"+LW: LEN, 51\r\n");
        for _ in 0..UPLINK_CHUNK_ATTEMPTS {
            builder
                .write(b"AT+CMSGHEX=\"01\"\r\n")
                .read(b"+CMSGHEX: Start\r\n+CMSGHEX: Wait ACK\r\n+CMSGHEX: Done\r\n");
        }
        let mut modem = joined(builder.build(), LoraE5::new());
        modem.session_mut().confirmation_required = true;
        assert_eq!(modem.send(&[0x01]).await, 0);
    }
}
