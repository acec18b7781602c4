//! Unsolicited result code (URC) dispatch
//!
//! The modem may emit notifications at any time, including in the middle of
//! a pending command reply. The response matcher offers its buffer here
//! after every byte; once a complete line is recognised by the dialect, its
//! side effect is applied to the [`Session`] and the bytes are consumed.

use crate::session::Session;
use lora_at_core::hex;

/// How a downlink payload is written inside its notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Hex,
    Raw,
}

/// A recognised notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Urc {
    /// The modem left low-power mode
    Wake,
    /// The modem lost or never had a network session
    NotJoined,
    /// A downlink payload arrived
    Downlink {
        port: Option<u8>,
        encoding: PayloadEncoding,
        data: String,
    },
    /// Signal report of a received frame
    Signal { rssi: i8 },
    /// Link check answer from the network server
    LinkCheck { margin: u8, gateways: u8 },
}

/// Line-level framing of one modem model
pub trait Dialect: Send + Sync {
    /// Recognise a complete notification line (no CR/LF)
    fn recognize_urc(&self, line: &str) -> Option<Urc>;

    /// Bytes written ahead of every command while the modem sleeps
    fn wake_preamble(&self) -> &[u8] {
        &[]
    }

    /// Command line terminator
    fn line_terminator(&self) -> &[u8] {
        b"\r\n"
    }
}

/// The last complete line of `buffer`, without its CR/LF
///
/// `None` unless the buffer ends in LF.
pub fn last_line(buffer: &[u8]) -> Option<String> {
    let body = buffer.strip_suffix(b"\n")?;
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    let start = body
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|pos| pos + 1)
        .unwrap_or(0);
    Some(String::from_utf8_lossy(&body[start..]).into_owned())
}

/// Applies recognised notifications to the session
#[derive(Debug, Default, Clone, Copy)]
pub struct UrcDispatcher;

impl UrcDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Offer the matcher's buffer
    ///
    /// # Returns
    /// `true` if a notification completed the buffer and was consumed
    pub fn offer<D: Dialect + ?Sized>(&self, dialect: &D, buffer: &[u8], session: &mut Session) -> bool {
        let Some(line) = last_line(buffer) else {
            return false;
        };
        if line.is_empty() {
            return false;
        }
        match dialect.recognize_urc(&line) {
            Some(urc) => {
                self.apply(urc, session);
                session.statistics.increment_urcs_handled();
                true
            }
            None => false,
        }
    }

    /// Perform a notification's side effect
    pub fn apply(&self, urc: Urc, session: &mut Session) {
        match urc {
            Urc::Wake => {
                log::debug!("modem woke up");
                session.low_power_mode = false;
            }
            Urc::NotJoined => {
                log::warn!("modem reports no network session");
                session.network_connected = false;
            }
            Urc::Downlink {
                port,
                encoding,
                data,
            } => {
                let payload = match encoding {
                    PayloadEncoding::Raw => data.into_bytes(),
                    PayloadEncoding::Hex => match hex::decode(&data) {
                        Ok(payload) => payload,
                        Err(e) => {
                            log::warn!("dropping malformed downlink {:?}: {}", data, e);
                            return;
                        }
                    },
                };
                session.deliver_downlink(port, &payload);
            }
            Urc::Signal { rssi } => {
                log::debug!("RSSI {} dBm", rssi);
                session.signal_quality = Some(rssi);
            }
            Urc::LinkCheck { margin, gateways } => {
                log::info!("link check: margin {} dB, {} gateway(s)", margin, gateways);
                session.link_margin = Some(margin);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl Dialect for Quiet {
        fn recognize_urc(&self, line: &str) -> Option<Urc> {
            match line {
                "WAKE" => Some(Urc::Wake),
                "GONE" => Some(Urc::NotJoined),
                "RX 0a0B" => Some(Urc::Downlink {
                    port: Some(9),
                    encoding: PayloadEncoding::Hex,
                    data: "0a0B".to_string(),
                }),
                "RX zz" => Some(Urc::Downlink {
                    port: None,
                    encoding: PayloadEncoding::Hex,
                    data: "zz".to_string(),
                }),
                _ => None,
            }
        }
    }

    #[test]
    fn test_last_line() {
        assert_eq!(last_line(b"abc"), None);
        assert_eq!(last_line(b"\r\n").as_deref(), Some(""));
        assert_eq!(last_line(b"OK\r\nWAKE\r\n").as_deref(), Some("WAKE"));
        assert_eq!(last_line(b"WAKE\n").as_deref(), Some("WAKE"));
    }

    #[test]
    fn test_offer_applies_side_effects() {
        let dispatcher = UrcDispatcher::new();
        let mut session = Session::new(8);
        session.network_connected = true;
        session.low_power_mode = true;

        assert!(dispatcher.offer(&Quiet, b"\r\nWAKE\r\n", &mut session));
        assert!(!session.low_power_mode);

        assert!(dispatcher.offer(&Quiet, b"GONE\r\n", &mut session));
        assert!(!session.network_connected);

        assert!(dispatcher.offer(&Quiet, b"RX 0a0B\r\n", &mut session));
        assert_eq!(session.downlink.size(), 2);
        assert_eq!(session.downlink.peek(), Some(0x0A));
        assert_eq!(session.last_port, Some(9));
        assert_eq!(session.statistics.urcs_handled, 3);
    }

    #[test]
    fn test_unrecognized_text_is_left_alone() {
        let dispatcher = UrcDispatcher::new();
        let mut session = Session::new(8);
        assert!(!dispatcher.offer(&Quiet, b"WAK", &mut session));
        assert!(!dispatcher.offer(&Quiet, b"+AT: OK\r\n", &mut session));
        assert_eq!(session.statistics.urcs_handled, 0);
    }

    #[test]
    fn test_malformed_hex_downlink_is_consumed_but_dropped() {
        let dispatcher = UrcDispatcher::new();
        let mut session = Session::new(8);
        assert!(dispatcher.offer(&Quiet, b"RX zz\r\n", &mut session));
        assert!(session.downlink.is_empty());
    }

    #[test]
    fn test_signal_and_link_check() {
        let dispatcher = UrcDispatcher::new();
        let mut session = Session::default();
        dispatcher.apply(Urc::Signal { rssi: -106 }, &mut session);
        dispatcher.apply(Urc::LinkCheck { margin: 20, gateways: 1 }, &mut session);
        assert_eq!(session.signal_quality, Some(-106));
        assert_eq!(session.link_margin, Some(20));
    }
}
