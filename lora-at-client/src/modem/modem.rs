//! LoRaWAN modem engine
//!
//! [`LoraModem`] is the application-facing handle. It owns the command
//! channel and the session and turns every protocol failure into a plain
//! value (`false`, `0`, `None`) after logging it.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use lora_at_client::{LoraE5, ModemBuilder};
//!
//! # async fn demo() -> lora_at_core::LoraResult<()> {
//! let mut modem = ModemBuilder::new()
//!     .serial("/dev/ttyUSB0", 9600)
//!     .build_serial(LoraE5::new())
//!     .await?;
//!
//! if modem.begin().await
//!     && modem.join_otaa("70B3D57ED0000000", "2B7E151628AED2A6ABF7158809CF4F3C", None, None).await
//! {
//!     let sent = modem.send(b"hello").await;
//!     let mut buf = [0u8; 64];
//!     let received = modem.read(&mut buf, 64).await;
//! }
//! # Ok(())
//! # }
//! ```

use super::config::ModemConfig;
use crate::vocabulary::Vocabulary;
use lora_at_session::{
    AtPort, Exchange, JoinState, Reply, ResponseMatcher, Session, SessionStatistics,
};
use lora_at_transport::ByteTransport;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Pause between two probes
const PROBE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long `maintain` listens for pending notifications
const URC_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Driver handle for one LoRaWAN modem
///
/// Generic over the byte transport and the modem's command vocabulary.
/// Optional operations (channel plan, radio tuning, network time, sleep)
/// exist only when the vocabulary implements the matching capability.
#[derive(Debug)]
pub struct LoraModem<T, V> {
    pub(super) port: AtPort<T, V>,
    pub(super) config: ModemConfig,
}

impl<T, V> LoraModem<T, V>
where
    T: ByteTransport,
    V: Vocabulary,
{
    /// Create a driver over an opened transport
    ///
    /// Nothing is written until [`begin`](Self::begin).
    pub fn new(transport: T, vocabulary: V, config: ModemConfig) -> Self {
        let mut session = Session::new(config.downlink_capacity);
        session.confirmation_required = config.confirmation_required;
        let matcher = ResponseMatcher::new(config.poll_interval);
        let port = AtPort::new(transport, vocabulary, session, matcher, config.command_timeout);
        Self { port, config }
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &V {
        self.port.dialect()
    }

    pub fn session(&self) -> &Session {
        self.port.session()
    }

    pub(crate) fn session_mut(&mut self) -> &mut Session {
        self.port.session_mut()
    }

    pub fn statistics(&self) -> &SessionStatistics {
        &self.port.session().statistics
    }

    /// Session flag set by a successful join and cleared by a "not joined"
    /// notification; no command is sent
    pub fn is_network_connected(&self) -> bool {
        self.port.session().network_connected
    }

    pub fn join_state(&self) -> JoinState {
        self.port.session().join_state
    }

    /// Demodulation margin of the last link check
    pub fn link_margin(&self) -> Option<u8> {
        self.port.session().link_margin
    }

    pub fn is_confirmation_required(&self) -> bool {
        self.port.session().confirmation_required
    }

    /// Give back the transport, the vocabulary and the session
    pub fn into_parts(self) -> (T, V, Session) {
        self.port.into_parts()
    }

    /// Bring the modem up
    ///
    /// Probes until `probe_timeout`; a silent modem with a wake preamble is
    /// assumed asleep and probed again in low-power mode. The init sequence
    /// then runs, and the configured confirmation mode is applied.
    ///
    /// # Returns
    /// `true` if the modem answered and every required init step succeeded
    pub async fn begin(&mut self) -> bool {
        log::info!("probing {} modem", self.vocabulary().model());
        if !self.probe().await {
            if self.vocabulary().wake_preamble().is_empty() {
                log::warn!("{} modem did not answer", self.vocabulary().model());
                return false;
            }
            log::debug!("no answer, probing again with wake preamble");
            self.session_mut().low_power_mode = true;
            if !self.probe().await {
                log::warn!("{} modem did not answer", self.vocabulary().model());
                return false;
            }
        }

        let init = self.vocabulary().init_sequence();
        if !self.run_sequence(&init).await {
            log::warn!("{} init sequence failed", self.vocabulary().model());
            return false;
        }
        if self.config.confirmation_required && !self.set_confirmation_required(true).await {
            return false;
        }
        log::info!("{} modem ready", self.vocabulary().model());
        true
    }

    pub(super) async fn probe(&mut self) -> bool {
        let deadline = Instant::now() + self.config.probe_timeout;
        let probe = self
            .vocabulary()
            .probe()
            .with_timeout(self.config.probe_reply_timeout);
        loop {
            if self.run(&probe).await.is_some_and(|reply| reply.is_success()) {
                return true;
            }
            if Instant::now() + PROBE_RETRY_DELAY >= deadline {
                return false;
            }
            sleep(PROBE_RETRY_DELAY).await;
        }
    }

    /// Ask the network to acknowledge every uplink (or stop asking)
    pub async fn set_confirmation_required(&mut self, required: bool) -> bool {
        let steps = self.vocabulary().confirmation(required);
        if !self.run_sequence(&steps).await {
            log::warn!("could not set confirmation mode to {}", required);
            return false;
        }
        self.session_mut().confirmation_required = required;
        true
    }

    /// Downlink bytes ready for [`read`](Self::read)
    pub fn available(&self) -> usize {
        self.port.session().downlink.available()
    }

    /// Copy up to `max` downlink bytes into `buf`
    ///
    /// An empty ring on a joined modem triggers a downlink poll first.
    ///
    /// # Returns
    /// Number of bytes copied
    pub async fn read(&mut self, buf: &mut [u8], max: usize) -> usize {
        if self.session().downlink.is_empty() && self.is_network_connected() {
            self.poll_downlink().await;
        }
        self.session_mut().downlink.get(buf, max)
    }

    /// Send empty uplinks while they keep bringing downlink bytes
    ///
    /// Stops when a transmission fails or brings nothing, the ring is full,
    /// or the session is lost.
    ///
    /// # Returns
    /// Number of downlink bytes received
    pub async fn poll_downlink(&mut self) -> usize {
        let mut received = 0;
        while self.is_network_connected() && self.session().downlink.free() > 0 {
            let before = self.statistics().downlink_bytes;
            if !self.transmit_chunk(&[]).await {
                break;
            }
            let delta = (self.statistics().downlink_bytes - before) as usize;
            if delta == 0 {
                break;
            }
            received += delta;
        }
        if received > 0 {
            log::debug!("downlink poll brought {} bytes", received);
        }
        received
    }

    /// Housekeeping for an idle application loop
    ///
    /// Processes pending notifications, then polls for downlinks if the last
    /// uplink is older than `downlink_check_interval`.
    pub async fn maintain(&mut self) {
        if let Err(e) = self.port.drain_urcs(URC_DRAIN_TIMEOUT).await {
            log::error!("notification drain failed: {}", e);
            return;
        }
        let due = match self.session().last_downlink_check {
            Some(at) => at.elapsed() >= self.config.downlink_check_interval,
            None => true,
        };
        if due && self.is_network_connected() {
            self.poll_downlink().await;
        }
    }

    /// Received signal strength in dBm
    ///
    /// Uses the modem's own query if it has one, otherwise sends up to
    /// `signal_query_attempts` empty uplinks until a signal report arrives.
    pub async fn signal_quality(&mut self) -> Option<i8> {
        if let Some(query) = self.vocabulary().signal_query() {
            let rssi = self.query(&query, |v, reply| v.parse_signal(reply)).await;
            if rssi.is_some() {
                self.session_mut().signal_quality = rssi;
            }
            return rssi;
        }

        self.session_mut().signal_quality = None;
        for _ in 0..self.config.signal_query_attempts {
            if !self.is_network_connected() {
                break;
            }
            self.transmit_chunk(&[]).await;
            if let Some(rssi) = self.session().signal_quality {
                return Some(rssi);
            }
        }
        log::warn!("no signal report received");
        None
    }

    /// Run one exchange, logging and swallowing transport errors
    pub(super) async fn run(&mut self, exchange: &Exchange) -> Option<Reply> {
        match self.port.exchange(exchange).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                log::error!("{} failed: {}", exchange.describe(), e);
                None
            }
        }
    }

    /// Run one exchange and report whether slot 1 matched
    pub(super) async fn run_checked(&mut self, exchange: &Exchange) -> bool {
        self.run(exchange).await.is_some_and(|reply| reply.is_success())
    }

    /// See [`AtPort::run_sequence`]
    pub(super) async fn run_sequence(&mut self, steps: &[Exchange]) -> bool {
        match self.port.run_sequence(steps).await {
            Ok(done) => done,
            Err(e) => {
                log::error!("command sequence failed: {}", e);
                false
            }
        }
    }

    /// Run a query and parse its reply with the vocabulary
    pub(super) async fn query<R>(
        &mut self,
        exchange: &Exchange,
        parse: impl FnOnce(&V, &Reply) -> Option<R>,
    ) -> Option<R> {
        let reply = self.run(exchange).await?;
        let parsed = parse(self.vocabulary(), &reply);
        if parsed.is_none() {
            log::debug!("{}: unexpected reply {:?}", exchange.describe(), reply.body());
        }
        parsed
    }
}
