//! Response matcher
//!
//! Scans bytes from the transport against up to seven terminal patterns.
//! Slot 1 conventionally means success and slot 2 the modem's error reply.
//! Every byte is first offered to the URC dispatcher; if a notification is
//! consumed the buffer starts over, otherwise the buffer's suffix is tested
//! against the patterns in slot order.

use crate::error::{LoraError, LoraResult};
use crate::exchange::{MAX_PATTERNS, Reply};
use crate::session::Session;
use crate::urc::{Dialect, UrcDispatcher};
use lora_at_transport::ByteTransport;
use std::time::Duration;
use tokio::time::Instant;

/// Default time slice of one transport poll
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Progress of one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    Matched(u8),
    TimedOut,
}

/// Pattern matcher run once per issued command
#[derive(Debug, Clone)]
pub struct ResponseMatcher {
    poll_interval: Duration,
    dispatcher: UrcDispatcher,
}

impl ResponseMatcher {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            dispatcher: UrcDispatcher::new(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait for one of `patterns` to terminate the incoming data
    ///
    /// # Arguments
    /// * `transport` - Byte source
    /// * `dialect` - Recognises notifications interleaved with the reply
    /// * `session` - Receives notification side effects and statistics
    /// * `timeout` - Hard bound on the wait
    /// * `patterns` - Up to seven terminal strings; none means only
    ///   notifications are processed until the timeout
    ///
    /// # Returns
    /// The matched slot (1-based) and the text up to and including the
    /// match, or index 0 on timeout.
    ///
    /// # Errors
    /// `InvalidData` for more than seven patterns; transport failures are
    /// passed through.
    pub async fn wait_response<T, D>(
        &self,
        transport: &mut T,
        dialect: &D,
        session: &mut Session,
        timeout: Duration,
        patterns: &[&str],
    ) -> LoraResult<Reply>
    where
        T: ByteTransport + ?Sized,
        D: Dialect + ?Sized,
    {
        if patterns.len() > MAX_PATTERNS {
            return Err(LoraError::InvalidData(format!(
                "At most {} patterns can be matched, got {}",
                MAX_PATTERNS,
                patterns.len()
            )));
        }

        let deadline = Instant::now() + timeout;
        let mut buffer: Vec<u8> = Vec::with_capacity(64);
        let mut state = ScanState::Scanning;

        while state == ScanState::Scanning {
            let now = Instant::now();
            if now >= deadline {
                state = ScanState::TimedOut;
                continue;
            }

            let slice = (deadline - now).min(self.poll_interval);
            let Some(byte) = transport.read_byte(slice).await? else {
                tokio::task::yield_now().await;
                continue;
            };
            if byte == 0 {
                continue;
            }
            buffer.push(byte);

            if self.dispatcher.offer(dialect, &buffer, session) {
                buffer.clear();
                continue;
            }

            if let Some(slot) = patterns
                .iter()
                .position(|pattern| buffer.ends_with(pattern.as_bytes()))
            {
                state = ScanState::Matched(slot as u8 + 1);
            }
        }

        let text = String::from_utf8_lossy(&buffer).into_owned();
        match state {
            ScanState::Matched(index) => {
                session.statistics.increment_replies_matched();
                log::trace!("<< {:?} (slot {})", text, index);
                Ok(Reply {
                    index,
                    text,
                    trailer: String::new(),
                })
            }
            _ => {
                if !patterns.is_empty() {
                    session.statistics.increment_timeouts();
                }
                if !buffer.is_empty() {
                    log::warn!("unhandled data: {:?}", text);
                    session.statistics.add_bytes_discarded(buffer.len());
                }
                Ok(Reply::timed_out())
            }
        }
    }

    /// Read raw bytes up to and including LF, without URC processing
    ///
    /// Returns what was read when the timeout elapses first.
    pub async fn read_line<T>(&self, transport: &mut T, timeout: Duration) -> LoraResult<String>
    where
        T: ByteTransport + ?Sized,
    {
        let deadline = Instant::now() + timeout;
        let mut line = Vec::new();
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match transport.read_byte(deadline - now).await? {
                Some(b'\n') => {
                    line.push(b'\n');
                    break;
                }
                Some(0) => {}
                Some(byte) => line.push(byte),
                None => {}
            }
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

impl Default for ResponseMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
