//! AT command channel
//!
//! [`AtPort`] owns the transport, the modem dialect and the [`Session`]
//! and runs exactly one command/reply cycle at a time.

use crate::error::LoraResult;
use crate::exchange::{Exchange, Reply, Trailer};
use crate::matcher::ResponseMatcher;
use crate::session::Session;
use crate::urc::Dialect;
use lora_at_transport::ByteTransport;
use std::time::Duration;

/// Half-duplex command channel to one modem
#[derive(Debug)]
pub struct AtPort<T, D> {
    transport: T,
    dialect: D,
    session: Session,
    matcher: ResponseMatcher,
    default_timeout: Duration,
}

impl<T, D> AtPort<T, D>
where
    T: ByteTransport,
    D: Dialect,
{
    /// Create a command channel
    ///
    /// # Arguments
    /// * `transport` - Opened byte transport
    /// * `dialect` - Modem line framing and notification table
    /// * `session` - Initial session state
    /// * `matcher` - Response matcher (carries the poll interval)
    /// * `default_timeout` - Used by exchanges that do not set their own
    pub fn new(
        transport: T,
        dialect: D,
        session: Session,
        matcher: ResponseMatcher,
        default_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            dialect,
            session,
            matcher,
            default_timeout,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Split into transport and session
    pub fn into_parts(self) -> (T, D, Session) {
        (self.transport, self.dialect, self.session)
    }

    /// Write one command line
    ///
    /// The wake preamble goes first while the session is in low-power mode.
    pub async fn write_command(&mut self, command: &[u8]) -> LoraResult<()> {
        let mut line = Vec::with_capacity(command.len() + 8);
        if self.session.low_power_mode {
            line.extend_from_slice(self.dialect.wake_preamble());
        }
        line.extend_from_slice(command);
        line.extend_from_slice(self.dialect.line_terminator());

        log::trace!(">> {}", String::from_utf8_lossy(command));
        self.transport.write_all(&line).await?;
        self.transport.flush().await?;
        self.session.statistics.increment_commands_sent();
        Ok(())
    }

    /// See [`ResponseMatcher::wait_response`]
    pub async fn wait_response(&mut self, timeout: Duration, patterns: &[&str]) -> LoraResult<Reply> {
        self.matcher
            .wait_response(
                &mut self.transport,
                &self.dialect,
                &mut self.session,
                timeout,
                patterns,
            )
            .await
    }

    /// See [`ResponseMatcher::read_line`]
    pub async fn read_line(&mut self, timeout: Duration) -> LoraResult<String> {
        self.matcher.read_line(&mut self.transport, timeout).await
    }

    /// Process pending notifications for up to `timeout`
    pub async fn drain_urcs(&mut self, timeout: Duration) -> LoraResult<()> {
        self.wait_response(timeout, &[]).await.map(|_| ())
    }

    /// Run one exchange: write the command, wait for a terminal pattern,
    /// then read the trailer if one was requested and a pattern matched
    pub async fn exchange(&mut self, exchange: &Exchange) -> LoraResult<Reply> {
        if !exchange.command().is_empty() {
            self.write_command(exchange.command()).await?;
        }
        if exchange.patterns().is_empty() {
            return Ok(Reply::timed_out());
        }

        let timeout = exchange.timeout().unwrap_or(self.default_timeout);
        let mut reply = self.wait_response(timeout, exchange.patterns()).await?;
        if reply.is_timeout() {
            log::debug!("{}: no reply within {:?}", exchange.describe(), timeout);
            return Ok(reply);
        }
        if exchange.trailer() == Trailer::Line {
            reply.trailer = self.read_line(self.default_timeout).await?;
        }
        log::debug!("{}: slot {} {:?}", exchange.describe(), reply.index, reply.body());
        Ok(reply)
    }

    /// Run exchanges in order, stopping at the first failed required step
    ///
    /// # Returns
    /// `true` if every required step matched slot 1
    pub async fn run_sequence(&mut self, exchanges: &[Exchange]) -> LoraResult<bool> {
        for exchange in exchanges {
            let reply = self.exchange(exchange).await?;
            if !reply.is_success() {
                if exchange.is_required() {
                    log::warn!("{} failed (slot {})", exchange.describe(), reply.index);
                    return Ok(false);
                }
                log::debug!("{} ignored (slot {})", exchange.describe(), reply.index);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urc::Urc;
    use lora_at_transport::StreamTransport;
    use tokio_test::io::{Builder, Mock};

    struct Sleepy;

    impl Dialect for Sleepy {
        fn recognize_urc(&self, _line: &str) -> Option<Urc> {
            None
        }

        fn wake_preamble(&self) -> &[u8] {
            &[0xFF, 0xFF, 0xFF, 0xFF]
        }
    }

    fn port(mock: Mock) -> AtPort<StreamTransport<Mock>, Sleepy> {
        AtPort::new(
            StreamTransport::new(mock),
            Sleepy,
            Session::default(),
            ResponseMatcher::default(),
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_with_trailer() {
        let mock = Builder::new()
            .write(b"AT+LW=LEN\r\n")
            .read(b"+LW: LEN, 51\r\n")
            .build();
        let mut port = port(mock);

        let reply = port
            .exchange(&Exchange::at("+LW=LEN").expect(&["+LW: LEN,"]).then_line())
            .await
            .unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.trailer.trim(), "51");
        assert_eq!(port.session().statistics.commands_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_preamble_in_low_power_mode() {
        let mock = Builder::new()
            .write(b"\xFF\xFF\xFF\xFFAT\r\n")
            .read(b"+AT: OK\r\n")
            .build();
        let mut port = port(mock);
        port.session_mut().low_power_mode = true;

        let reply = port.exchange(&Exchange::at("").expect(&["+AT: OK"])).await.unwrap();
        assert!(reply.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_stops_at_required_failure() {
        let mock = Builder::new()
            .write(b"ATE0\r\n")
            .read(b"ERROR\r\n")
            .write(b"ATV0\r\n")
            .read(b"ERROR\r\n")
            .build();
        let mut port = port(mock);

        let steps = [
            Exchange::at("E0").expect(&["OK\r\n", "ERROR\r\n"]),
            Exchange::at("V0").expect(&["OK\r\n", "ERROR\r\n"]).required(),
            Exchange::at("+LOG=0").expect(&["OK\r\n", "ERROR\r\n"]),
        ];
        assert!(!port.run_sequence(&steps).await.unwrap());
    }
}
