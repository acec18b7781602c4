//! Join state machine
//!
//! # State Transitions
//! ```text
//! Idle/Joined/Failed -> Joining (join or ABP provisioning started)
//! Joining -> Joining (attempt failed, backoff slept)
//! Joining -> Joined (success, already joined, or link check answered)
//! Joining -> Failed (attempts exhausted)
//! ```
//!
//! OTAA pushes the join credentials and runs the retry loop, confirming
//! the join with a link check on models whose join reply is not final. ABP
//! pushes the session keys and, since there is no join handshake, proves
//! the session with a link check.

use super::modem::LoraModem;
use crate::vocabulary::{AbpCredentials, OtaaCredentials, Vocabulary};
use lora_at_core::hex;
use lora_at_session::{JoinAttempt, JoinOutcome, JoinState};
use lora_at_transport::ByteTransport;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Hex digits of an EUI-64
pub const EUI_DIGITS: usize = 16;

/// Hex digits of a 128-bit key
pub const KEY_DIGITS: usize = 32;

/// Hex digits of a device address
pub const DEV_ADDR_DIGITS: usize = 8;

/// How a single link check request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkCheckResult {
    Answered,
    Unanswered,
    /// The modem has no network session, retrying cannot help
    NotJoined,
}

/// Result of one [`LoraModem::join`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReport {
    /// `Joined` or `Failed`
    pub state: JoinState,
    pub attempts_made: u8,
    /// Backoff computed after each failed attempt, in order
    pub delays: Vec<Duration>,
    pub last_outcome: Option<JoinOutcome>,
}

impl JoinReport {
    pub fn is_joined(&self) -> bool {
        self.state.is_joined()
    }
}

fn check_hex(name: &str, value: &str, digits: usize) -> bool {
    if hex::is_hex_of_len(value, digits) {
        return true;
    }
    log::error!("{} must be {} hex digits, got {:?}", name, digits, value);
    false
}

impl<T, V> LoraModem<T, V>
where
    T: ByteTransport,
    V: Vocabulary,
{
    /// Run the join retry loop
    ///
    /// Each failed attempt computes a backoff from the configured policy,
    /// lower-bounded by the modem's channel free time when it reports one.
    /// The delay is slept only if another attempt remains.
    ///
    /// # Arguments
    /// * `attempts` - Join commands to issue at most
    /// * `timeout` - Reply timeout of each join command
    pub async fn join(&mut self, attempts: u8, timeout: Duration) -> JoinReport {
        let mut attempt = JoinAttempt::new(attempts);
        let mut report = JoinReport {
            state: JoinState::Joining,
            attempts_made: 0,
            delays: Vec::new(),
            last_outcome: None,
        };
        self.enter(JoinState::Joining);

        while attempt.begin() {
            report.attempts_made = attempt.made;
            let outcome = self.join_once(timeout).await;
            report.last_outcome = Some(outcome);

            if outcome.is_joined() {
                log::info!("joined after {} attempt(s) ({:?})", attempt.made, outcome);
                self.session_mut().network_connected = true;
                self.enter(JoinState::Joined);
                report.state = JoinState::Joined;
                return report;
            }

            let channel_free = self.channel_free_time().await;
            attempt.delay = self
                .config
                .backoff
                .next_delay(attempt.made, channel_free, attempt.delay);
            report.delays.push(attempt.delay);
            if attempt.exhausted() {
                break;
            }
            log::info!(
                "join attempt {} ended {:?}, retrying in {:?}",
                attempt.made,
                outcome,
                attempt.delay
            );
            sleep(attempt.delay).await;
            self.enter(JoinState::Joining);
        }

        log::warn!("join failed after {} attempt(s)", attempt.made);
        self.session_mut().network_connected = false;
        self.enter(JoinState::Failed);
        report.state = JoinState::Failed;
        report
    }

    async fn join_once(&mut self, timeout: Duration) -> JoinOutcome {
        let request = self
            .vocabulary()
            .join_request(self.config.force_join)
            .with_timeout(timeout);
        let Some(reply) = self.run(&request).await else {
            return JoinOutcome::Timeout;
        };
        let outcome = self.vocabulary().classify_join(reply.index);
        if let Some(trailer) = self.vocabulary().join_trailer(outcome, timeout) {
            self.run(&trailer).await;
        }
        outcome
    }

    async fn channel_free_time(&mut self) -> Option<Duration> {
        let query = self.vocabulary().channel_free_query()?;
        self.query(&query, |v, reply| v.parse_channel_free(reply)).await
    }

    fn enter(&mut self, state: JoinState) {
        if let Err(e) = self.session_mut().transition_to(state) {
            log::debug!("{}", e);
            self.session_mut().join_state = state;
        }
    }

    /// Over-the-air activation
    ///
    /// # Arguments
    /// * `app_eui` - 16 hex digits
    /// * `app_key` - 32 hex digits
    /// * `dev_eui` - 16 hex digits, if the modem's own should be replaced
    /// * `timeout` - Per-attempt join timeout, `join_timeout` if `None`
    ///
    /// # Returns
    /// `true` once joined; malformed credentials are rejected before
    /// anything is written
    pub async fn join_otaa(
        &mut self,
        app_eui: &str,
        app_key: &str,
        dev_eui: Option<&str>,
        timeout: Option<Duration>,
    ) -> bool {
        let valid = check_hex("AppEUI", app_eui, EUI_DIGITS)
            && check_hex("AppKey", app_key, KEY_DIGITS)
            && dev_eui.is_none_or(|eui| check_hex("DevEUI", eui, EUI_DIGITS));
        if !valid {
            return false;
        }

        let credentials = OtaaCredentials {
            app_eui,
            app_key,
            dev_eui,
        };
        let steps = self.vocabulary().provision_otaa(&credentials);
        if !self.run_sequence(&steps).await {
            log::warn!("OTAA provisioning failed");
            return false;
        }
        let timeout = timeout.unwrap_or(self.config.join_timeout);
        if !self.join(self.config.join_attempts, timeout).await.is_joined() {
            return false;
        }
        if self.vocabulary().verify_join() && !self.verify_connection().await {
            log::warn!("join reported success but the link check failed");
            self.enter(JoinState::Failed);
            return false;
        }
        true
    }

    /// Activation by personalization
    ///
    /// # Arguments
    /// * `dev_addr` - 8 hex digits
    /// * `nwk_skey`, `app_skey` - 32 hex digits each
    /// * `uplink_counter`, `downlink_counter` - Frame counters to resume from
    /// * `timeout` - Bound on the link check, unbounded attempts-wise if `None`
    pub async fn join_abp(
        &mut self,
        dev_addr: &str,
        nwk_skey: &str,
        app_skey: &str,
        uplink_counter: Option<u32>,
        downlink_counter: Option<u32>,
        timeout: Option<Duration>,
    ) -> bool {
        let valid = check_hex("DevAddr", dev_addr, DEV_ADDR_DIGITS)
            && check_hex("NwkSKey", nwk_skey, KEY_DIGITS)
            && check_hex("AppSKey", app_skey, KEY_DIGITS);
        if !valid {
            return false;
        }

        let credentials = AbpCredentials {
            dev_addr,
            nwk_skey,
            app_skey,
            uplink_counter,
            downlink_counter,
        };
        self.enter(JoinState::Joining);
        let steps = self.vocabulary().provision_abp(&credentials);
        if !self.run_sequence(&steps).await {
            log::warn!("ABP provisioning failed");
            self.enter(JoinState::Failed);
            return false;
        }

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let linked = self.check_link(self.config.link_check_attempts, deadline).await;
        self.enter(if linked { JoinState::Joined } else { JoinState::Failed });
        linked
    }

    /// Prove the network session with a link check
    ///
    /// Sets `network_connected` and the link margin from the answer. Makes
    /// up to `link_check_attempts` requests, `link_check_interval` apart.
    pub async fn verify_connection(&mut self) -> bool {
        self.check_link(self.config.link_check_attempts, None).await
    }

    async fn check_link(&mut self, attempts: u8, deadline: Option<Instant>) -> bool {
        for attempt in 1..=attempts {
            if attempt > 1 {
                let next = Instant::now() + self.config.link_check_interval;
                if deadline.is_some_and(|deadline| next >= deadline) {
                    break;
                }
                sleep(self.config.link_check_interval).await;
            }
            match self.link_check_once().await {
                LinkCheckResult::Answered => {
                    log::info!("link check answered, margin {:?} dB", self.link_margin());
                    self.session_mut().network_connected = true;
                    return true;
                }
                LinkCheckResult::NotJoined => {
                    log::warn!("link check refused, network not joined");
                    break;
                }
                LinkCheckResult::Unanswered => {
                    log::debug!("link check attempt {} unanswered", attempt);
                }
            }
        }
        log::warn!("link check failed");
        self.session_mut().network_connected = false;
        false
    }

    async fn link_check_once(&mut self) -> LinkCheckResult {
        let request = self.vocabulary().link_check_request();
        let Some(reply) = self.run(&request).await else {
            return LinkCheckResult::Unanswered;
        };
        if let Some(rest) = self.vocabulary().link_check_refused(&reply) {
            self.run(&rest).await;
            return LinkCheckResult::NotJoined;
        }
        if !reply.is_success() {
            return LinkCheckResult::Unanswered;
        }
        if let Some(check) = self.vocabulary().parse_link_check(&reply) {
            log::debug!("{} gateway(s) heard the link check", check.gateways);
            self.session_mut().link_margin = Some(check.margin);
            return LinkCheckResult::Answered;
        }
        if !self.vocabulary().link_check_via_uplink() {
            return LinkCheckResult::Unanswered;
        }
        // the answer comes back as a notification during the next uplink
        self.session_mut().link_margin = None;
        if self.transmit_chunk(&[]).await && self.link_margin().is_some() {
            LinkCheckResult::Answered
        } else {
            LinkCheckResult::Unanswered
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::modem::tests::scripted;
    use super::*;
    use crate::vocabulary::{LoraE5, MDot};
    use tokio_test::io::Builder;

    const JOIN_FAILED: &[u8] =
        b"+JOIN: Start\r\n+JOIN: NORMAL\r\n+JOIN: Join failed\r\n+JOIN: Done\r\n";

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_end_failed() {
        let mut builder = Builder::new();
        for _ in 0..3 {
            builder.write(b"AT+JOIN\r\n").read(JOIN_FAILED);
        }
        let mut modem = scripted(builder.build(), LoraE5::new());

        let start = Instant::now();
        let report = modem.join(3, Duration::from_secs(10)).await;
        assert_eq!(report.state, JoinState::Failed);
        assert_eq!(report.attempts_made, 3);
        assert_eq!(report.last_outcome, Some(JoinOutcome::Failure));
        assert_eq!(
            report.delays,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert!(report.delays.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(modem.statistics().commands_sent, 3);
        assert_eq!(modem.join_state(), JoinState::Failed);
        // no sleep after the last attempt
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_succeeds_on_second_attempt() {
        let mock = Builder::new()
            .write(b"AT+JOIN\r\n")
            .read(b"+JOIN: Start\r\n+JOIN: LoRaWAN modem is busy\r\n")
            .write(b"AT+JOIN\r\n")
            .read(b"+JOIN: Start\r\n+JOIN: NORMAL\r\n+JOIN: Network joined\r\n")
            .read(b"+JOIN: NetID 000013 DevAddr 26:01:1F:00\r\n+JOIN: Done\r\n")
            .build();
        let mut modem = scripted(mock, LoraE5::new());

        let report = modem.join(5, Duration::from_secs(10)).await;
        assert!(report.is_joined());
        assert_eq!(report.attempts_made, 2);
        assert_eq!(report.delays, vec![Duration::from_secs(1)]);
        assert!(modem.is_network_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_joined_counts_as_joined() {
        let mock = Builder::new()
            .write(b"AT+JOIN\r\n")
            .read(b"+JOIN: Joined already\r\n")
            .build();
        let mut modem = scripted(mock, LoraE5::new());
        let report = modem.join(1, Duration::from_secs(10)).await;
        assert_eq!(report.last_outcome, Some(JoinOutcome::AlreadyJoined));
        assert!(modem.is_network_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_respects_channel_free_time() {
        let mock = Builder::new()
            .write(b"AT+JOIN\r\n")
            .read(b"\r\nERROR\r\n")
            .write(b"AT+TXN?\r\n")
            .read(b"\r\n5000\r\n\r\nOK\r\n")
            .write(b"AT+JOIN\r\n")
            .read(b"\r\nSuccessfully joined network\r\n\r\nOK\r\n")
            .build();
        let mut modem = scripted(mock, MDot::new());

        let report = modem.join(2, Duration::from_secs(10)).await;
        assert!(report.is_joined());
        assert_eq!(report.delays, vec![Duration::from_millis(5100)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_fail_without_io() {
        let mut modem = scripted(Builder::new().build(), LoraE5::new());
        let report = modem.join(0, Duration::from_secs(10)).await;
        assert_eq!(report.state, JoinState::Failed);
        assert_eq!(report.attempts_made, 0);
        assert!(report.delays.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_otaa_rejects_malformed_credentials() {
        let mut modem = scripted(Builder::new().build(), LoraE5::new());
        assert!(!modem.join_otaa("70B3D57E", "2B7E151628AED2A6ABF7158809CF4F3C", None, None).await);
        assert!(
            !modem
                .join_otaa("70B3D57ED0000000", "2B7E151628AED2A6ABF7158809CF4F3C", Some("XYZ"), None)
                .await
        );
        assert_eq!(modem.statistics().commands_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_otaa_provisions_then_joins() {
        let mock = Builder::new()
            .write(b"AT+ID=AppEui, \"70B3D57ED0000000\"\r\n")
            .read(b"+ID: AppEui, 70:B3:D5:7E:D0:00:00:00\r\n")
            .write(b"AT+KEY=APPKEY, \"2B7E151628AED2A6ABF7158809CF4F3C\"\r\n")
            .read(b"+KEY: APPKEY 2B7E151628AED2A6ABF7158809CF4F3C\r\n")
            .write(b"AT+MODE=LWOTAA\r\n")
            .read(b"+MODE: LWOTAA\r\n")
            .write(b"AT+JOIN\r\n")
            .read(b"+JOIN: Start\r\n+JOIN: Network joined\r\n+JOIN: Done\r\n")
            .build();
        let mut modem = scripted(mock, LoraE5::new());
        assert!(
            modem
                .join_otaa("70B3D57ED0000000", "2B7E151628AED2A6ABF7158809CF4F3C", None, None)
                .await
        );
        assert_eq!(modem.join_state(), JoinState::Joined);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abp_verifies_with_link_check() {
        let mock = Builder::new()
            .write(b"AT+NJM=0\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+NA=26011F00\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+NSK=00112233445566778899AABBCCDDEEFF\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+DSK=FFEEDDCCBBAA99887766554433221100\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+ULC=7\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT&W\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+NLC\r\n")
            .read(b"\r\n12,2\r\n\r\nOK\r\n")
            .build();
        let mut modem = scripted(mock, MDot::new());
        assert!(
            modem
                .join_abp(
                    "26011F00",
                    "00112233445566778899AABBCCDDEEFF",
                    "FFEEDDCCBBAA99887766554433221100",
                    Some(7),
                    None,
                    None,
                )
                .await
        );
        assert!(modem.is_network_connected());
        assert_eq!(modem.link_margin(), Some(12));
        assert_eq!(modem.join_state(), JoinState::Joined);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_check_answer_via_uplink() {
        let mock = Builder::new()
            .write(b"AT+LW=LCR\r\n")
            .read(b"+LW: LCR\r\n")
            .write(b"AT+MSGHEX\r\n")
            .read(b"+MSGHEX: Start\r\n+MSGHEX: Link 20, 1\r\n+MSGHEX: Done\r\n")
            .build();
        let mut modem = scripted(mock, LoraE5::new());
        assert!(modem.verify_connection().await);
        assert_eq!(modem.link_margin(), Some(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mdot_otaa_join_confirmed_by_link_check() {
        let mock = Builder::new()
            .write(b"AT+NJM=1\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+NI=0,70B3D57ED0000000\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+NK=0,2B7E151628AED2A6ABF7158809CF4F3C\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT&W\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+JOIN\r\n")
            .read(b"\r\nSuccessfully joined network\r\n\r\nOK\r\n")
            .write(b"AT+NLC\r\n")
            .read(b"\r\n12,2\r\n\r\nOK\r\n")
            .build();
        let mut modem = scripted(mock, MDot::new());
        assert!(
            modem
                .join_otaa("70B3D57ED0000000", "2B7E151628AED2A6ABF7158809CF4F3C", None, None)
                .await
        );
        assert_eq!(modem.link_margin(), Some(12));
        assert_eq!(modem.join_state(), JoinState::Joined);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mdot_otaa_join_fails_when_link_check_refused() {
        let mock = Builder::new()
            .write(b"AT+NJM=1\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+NI=0,70B3D57ED0000000\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+NK=0,2B7E151628AED2A6ABF7158809CF4F3C\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT&W\r\n")
            .read(b"\r\nOK\r\n")
            .write(b"AT+JOIN\r\n")
            .read(b"\r\nSuccessfully joined network\r\n\r\nOK\r\n")
            .write(b"AT+NLC\r\n")
            .read(b"\r\nNetwork Not Joined\r\n\r\nERROR\r\n")
            .build();
        let mut modem = scripted(mock, MDot::new());
        assert!(
            !modem
                .join_otaa("70B3D57ED0000000", "2B7E151628AED2A6ABF7158809CF4F3C", None, None)
                .await
        );
        assert_eq!(modem.join_state(), JoinState::Failed);
        assert!(!modem.is_network_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_joined_link_check_stops_retries() {
        let mock = Builder::new()
            .write(b"AT+NLC\r\n")
            .read(b"\r\nNetwork Not Joined\r\n\r\nERROR\r\n")
            .build();
        let mut modem = scripted(mock, MDot::new());
        modem.session_mut().network_connected = true;
        assert!(!modem.check_link(5, None).await);
        assert_eq!(modem.statistics().commands_sent, 1);
        assert!(!modem.is_network_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_check_bounded_by_deadline() {
        let mock = Builder::new()
            .write(b"AT+NLC\r\n")
            .read(b"\r\nERROR\r\n")
            .build();
        let mut modem = scripted(mock, MDot::new());
        modem.session_mut().network_connected = true;
        assert!(
            !modem
                .check_link(10, Some(Instant::now() + Duration::from_secs(3)))
                .await
        );
        assert!(!modem.is_network_connected());
    }
}
