//! Command/reply descriptions handed from a vocabulary to the engine

use std::time::Duration;

/// Most terminal patterns one wait may scan for
pub const MAX_PATTERNS: usize = 7;

/// What to read after a terminal pattern matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trailer {
    /// Nothing, the pattern ends the reply
    #[default]
    None,
    /// The rest of the matched line, up to and including LF
    Line,
}

/// One command line and the replies that terminate it
///
/// Built by a vocabulary, executed by [`AtPort::exchange`](crate::AtPort::exchange).
/// An empty command means "wait only".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    command: Vec<u8>,
    patterns: Vec<&'static str>,
    timeout: Option<Duration>,
    trailer: Trailer,
    required: bool,
}

impl Exchange {
    /// An `AT`-prefixed command, e.g. `Exchange::at("+JOIN")` sends `AT+JOIN`
    pub fn at(command: impl AsRef<str>) -> Self {
        let mut line = b"AT".to_vec();
        line.extend_from_slice(command.as_ref().as_bytes());
        Self::raw(line)
    }

    /// A command line given as raw bytes (no terminator)
    pub fn raw(command: Vec<u8>) -> Self {
        Self {
            command,
            patterns: Vec::new(),
            timeout: None,
            trailer: Trailer::None,
            required: false,
        }
    }

    /// Write nothing, only wait for the patterns
    pub fn wait() -> Self {
        Self::raw(Vec::new())
    }

    /// Terminal patterns, slot 1 first
    pub fn expect(mut self, patterns: &[&'static str]) -> Self {
        self.patterns = patterns.to_vec();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Also read the rest of the matched line
    pub fn then_line(mut self) -> Self {
        self.trailer = Trailer::Line;
        self
    }

    /// Mark as a step whose failure aborts the surrounding sequence
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn command(&self) -> &[u8] {
        &self.command
    }

    pub fn patterns(&self) -> &[&'static str] {
        &self.patterns
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn trailer(&self) -> Trailer {
        self.trailer
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Command text for logging
    pub fn describe(&self) -> String {
        if self.command.is_empty() {
            "<wait>".to_string()
        } else {
            String::from_utf8_lossy(&self.command).into_owned()
        }
    }
}

/// Outcome of a wait or an exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Matched slot, 1..=7, or 0 on timeout
    pub index: u8,
    /// Everything received up to and including the matched pattern
    pub text: String,
    /// The rest of the line when a [`Trailer::Line`] was requested
    pub trailer: String,
}

impl Reply {
    pub fn timed_out() -> Self {
        Self::default()
    }

    /// Slot 1 matched
    pub fn is_success(&self) -> bool {
        self.index == 1
    }

    pub fn is_timeout(&self) -> bool {
        self.index == 0
    }

    /// Matched text followed by the trailer
    pub fn body(&self) -> String {
        format!("{}{}", self.text, self.trailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_prefix() {
        let exchange = Exchange::at("+JOIN").expect(&["+JOIN: Network joined"]);
        assert_eq!(exchange.command(), b"AT+JOIN");
        assert_eq!(exchange.patterns().len(), 1);
        assert_eq!(exchange.trailer(), Trailer::None);
        assert!(!exchange.is_required());
        assert_eq!(exchange.describe(), "AT+JOIN");
    }

    #[test]
    fn test_wait_only() {
        let exchange = Exchange::wait()
            .expect(&["+JOIN: Done"])
            .with_timeout(Duration::from_secs(3))
            .then_line();
        assert!(exchange.command().is_empty());
        assert_eq!(exchange.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(exchange.trailer(), Trailer::Line);
        assert_eq!(exchange.describe(), "<wait>");
    }

    #[test]
    fn test_reply_helpers() {
        let reply = Reply {
            index: 1,
            text: "+LW: LEN,".to_string(),
            trailer: " 51\r\n".to_string(),
        };
        assert!(reply.is_success());
        assert_eq!(reply.body(), "+LW: LEN, 51\r\n");
        assert!(Reply::timed_out().is_timeout());
    }
}
