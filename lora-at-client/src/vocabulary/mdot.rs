//! MultiTech mDOT command vocabulary
//!
//! Classic `OK`/`ERROR` terminated replies. Downlinks are printed inside the
//! reply to the uplink that opened the receive window, hex encoded
//! (`AT+RXO=0`).

use super::{
    AbpCredentials, ChannelPlan, DeviceClass, DeviceControl, DeviceInfo, DutyCycle, LinkCheck,
    LowPower, NetworkClock, OtaaCredentials, RadioTuning, SubBand, UplinkReplies, Vocabulary,
    first_number,
};
use lora_at_core::{ChannelMask, EpochValue, hex};
use lora_at_session::{Dialect, Exchange, JoinOutcome, Reply, Trailer, Urc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

pub const OK: &str = "OK\r\n";
pub const ERROR: &str = "ERROR\r\n";
pub const NOT_JOINED: &str = "Network Not Joined";

const PROBE_TIMEOUT: Duration = Duration::from_millis(200);
const LINK_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const GPS_TIME_TIMEOUT: Duration = Duration::from_secs(15);

/// The module is silent for about this long after `ATZ`
const RESET_SETTLE: Duration = Duration::from_secs(3);

/// Mask characters carried by one `AT+CHM` write
const MASK_CHUNK: usize = 4;

/// Offset of the most significant mask chunk
const MASK_TOP_OFFSET: usize = 4;

static LINK_CHECK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+),\s*(\d+)").expect("link check pattern"));

static SIGNED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+").expect("signed number pattern"));

static MASK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([0-9A-Fa-f]{20}|[0-9A-Fa-f]{18}|[0-9A-Fa-f]{4})\b").expect("mask pattern")
});

static DUTY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Max\s+(\d+)").expect("duty cycle pattern"));

static DATA_RATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"DR(\d+)").expect("data rate pattern"));

/// MultiTech mDOT modem
#[derive(Debug, Clone)]
pub struct MDot {
    channel_count: usize,
    ack_retries: u8,
}

impl MDot {
    /// US915 module (72 channels), 3 retries for confirmed uplinks
    pub fn new() -> Self {
        Self {
            channel_count: 72,
            ack_retries: 3,
        }
    }

    /// 16 for EU868 modules
    pub fn with_channel_count(mut self, channels: usize) -> Self {
        self.channel_count = channels;
        self
    }

    /// Retransmissions of an unacknowledged confirmed uplink (1..=15)
    pub fn with_ack_retries(mut self, retries: u8) -> Self {
        self.ack_retries = retries.clamp(1, 15);
        self
    }

    fn command(command: impl AsRef<str>) -> Exchange {
        Exchange::at(command).expect(&[OK, ERROR])
    }
}

impl Default for MDot {
    fn default() -> Self {
        Self::new()
    }
}

/// Reply body without the final `OK` and surrounding blank lines
fn body(reply: &Reply) -> Option<&str> {
    if !reply.is_success() {
        return None;
    }
    let text = reply.text.strip_suffix(OK).unwrap_or(&reply.text);
    Some(text.trim_matches(|c| c == '\r' || c == '\n' || c == ' '))
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    let caps = re.captures(text)?;
    caps.get(1).map(|m| m.as_str().to_string())
}

/// First line of the reply body
fn first_line(reply: &Reply) -> Option<&str> {
    let line = body(reply)?.lines().next()?.trim();
    (!line.is_empty()).then_some(line)
}

fn body_number<T: TryFrom<u64>>(reply: &Reply) -> Option<T> {
    first_number(body(reply)?).and_then(|value| T::try_from(value).ok())
}

/// `1` / `0` reply body
fn body_flag(reply: &Reply) -> Option<bool> {
    match first_line(reply)? {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

impl Dialect for MDot {
    fn recognize_urc(&self, line: &str) -> Option<Urc> {
        match line.trim() {
            "Network Not Joined" | "Failed to join network" => Some(Urc::NotJoined),
            _ => None,
        }
    }
}

impl Vocabulary for MDot {
    fn model(&self) -> &'static str {
        "mDOT"
    }

    fn probe(&self) -> Exchange {
        Self::command("").with_timeout(PROBE_TIMEOUT)
    }

    fn init_sequence(&self) -> Vec<Exchange> {
        vec![
            Self::command("E0").required(),
            Self::command("V0"),
            Self::command("+LOG=0"),
            Self::command("+RXO=0"),
        ]
    }

    fn uplink_budget_query(&self) -> Exchange {
        Self::command("+TXS?")
    }

    fn parse_uplink_budget(&self, reply: &Reply) -> Option<usize> {
        first_number(body(reply)?).map(|budget| budget as usize)
    }

    fn uplink(&self, payload: &[u8], _confirmed: bool) -> Exchange {
        if payload.is_empty() {
            Exchange::at("+SEND")
        } else {
            Exchange::at(format!("+SENDB={}", hex::encode(payload)))
        }
    }

    fn uplink_replies(&self) -> UplinkReplies {
        UplinkReplies {
            start: None,
            ack: OK,
            done: OK,
            error: ERROR,
            trailer: Trailer::None,
        }
    }

    fn downlink_in_reply(&self, reply: &Reply) -> Option<Vec<u8>> {
        let text = body(reply)?;
        if text.is_empty() {
            return None;
        }
        match hex::decode(text) {
            Ok(payload) => Some(payload),
            Err(e) => {
                log::warn!("ignoring non-hex uplink reply {:?}: {}", text, e);
                None
            }
        }
    }

    fn confirmation(&self, required: bool) -> Vec<Exchange> {
        let retries = if required { self.ack_retries } else { 0 };
        vec![Self::command(format!("+ACK={}", retries)).required()]
    }

    fn join_request(&self, _force: bool) -> Exchange {
        Exchange::at("+JOIN").expect(&["Successfully joined network", "Join backoff", ERROR])
    }

    fn classify_join(&self, index: u8) -> JoinOutcome {
        match index {
            1 => JoinOutcome::Success,
            2 => JoinOutcome::Busy,
            3 => JoinOutcome::Failure,
            _ => JoinOutcome::Timeout,
        }
    }

    fn join_trailer(&self, outcome: JoinOutcome, _timeout: Duration) -> Option<Exchange> {
        match outcome {
            JoinOutcome::Success | JoinOutcome::Busy => Some(Exchange::wait().expect(&[OK, ERROR])),
            _ => None,
        }
    }

    fn channel_free_query(&self) -> Option<Exchange> {
        Some(Self::command("+TXN?"))
    }

    fn parse_channel_free(&self, reply: &Reply) -> Option<Duration> {
        first_number(body(reply)?).map(Duration::from_millis)
    }

    fn provision_otaa(&self, credentials: &OtaaCredentials<'_>) -> Vec<Exchange> {
        let mut steps = vec![
            Self::command("+NJM=1").required(),
            Self::command(format!("+NI=0,{}", credentials.app_eui)).required(),
            Self::command(format!("+NK=0,{}", credentials.app_key)).required(),
        ];
        if let Some(dev_eui) = credentials.dev_eui {
            steps.push(Self::command(format!("+DI={}", dev_eui)).required());
        }
        steps.push(Self::command("&W"));
        steps
    }

    fn provision_abp(&self, credentials: &AbpCredentials<'_>) -> Vec<Exchange> {
        let mut steps = vec![
            Self::command("+NJM=0").required(),
            Self::command(format!("+NA={}", credentials.dev_addr)).required(),
            Self::command(format!("+NSK={}", credentials.nwk_skey)).required(),
            Self::command(format!("+DSK={}", credentials.app_skey)).required(),
        ];
        if let Some(counter) = credentials.uplink_counter {
            steps.push(Self::command(format!("+ULC={}", counter)).required());
        }
        if let Some(counter) = credentials.downlink_counter {
            steps.push(Self::command(format!("+DLC={}", counter)).required());
        }
        steps.push(Self::command("&W"));
        steps
    }

    fn link_check_request(&self) -> Exchange {
        Exchange::at("+NLC")
            .expect(&[OK, ERROR, NOT_JOINED])
            .with_timeout(LINK_CHECK_TIMEOUT)
    }

    fn link_check_refused(&self, reply: &Reply) -> Option<Exchange> {
        (reply.index == 3).then(|| Exchange::wait().expect(&[ERROR]))
    }

    fn verify_join(&self) -> bool {
        true
    }

    /// `20,1` (margin, gateways) ahead of the `OK`
    fn parse_link_check(&self, reply: &Reply) -> Option<LinkCheck> {
        let text = body(reply)?;
        let caps = LINK_CHECK_RE.captures(text)?;
        Some(LinkCheck {
            margin: caps[1].parse().ok()?,
            gateways: caps[2].parse().ok()?,
        })
    }

    fn signal_query(&self) -> Option<Exchange> {
        Some(Self::command("+RSSI"))
    }

    /// Last, min, max and average RSSI; the first is kept
    fn parse_signal(&self, reply: &Reply) -> Option<i8> {
        let text = body(reply)?;
        let value = SIGNED_RE.find(text)?.as_str().parse::<i32>().ok()?;
        Some(value.clamp(i8::MIN as i32, i8::MAX as i32) as i8)
    }
}

impl ChannelPlan for MDot {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn channel_mask_query(&self) -> Exchange {
        Self::command("+CHM?")
    }

    fn parse_channel_mask(&self, reply: &Reply) -> Option<ChannelMask> {
        let mask = capture(&MASK_RE, body(reply)?)?;
        ChannelMask::from_hex(&mask).ok()
    }

    /// Written in 4-character chunks, most significant first, at offsets
    /// counting down from 4; a 72-channel mask is padded to 20 characters
    fn write_channel_mask(&self, mask: &ChannelMask) -> Vec<Exchange> {
        let hex = mask.to_hex();
        if hex.len() == MASK_CHUNK {
            return vec![Self::command(format!("+CHM=0,{}", hex)).required()];
        }
        let padded = format!("{:0>20}", hex);
        padded
            .as_bytes()
            .chunks(MASK_CHUNK)
            .enumerate()
            .map(|(index, chunk)| {
                let offset = MASK_TOP_OFFSET.saturating_sub(index);
                Self::command(format!("+CHM={},{}", offset, String::from_utf8_lossy(chunk))).required()
            })
            .collect()
    }
}

impl RadioTuning for MDot {
    /// Limits can only be lifted (max 0), not switched back on
    fn set_duty_cycle(&self, enabled: bool) -> Option<Exchange> {
        (!enabled).then(|| self.set_max_duty_cycle(0))
    }

    fn duty_cycle_query(&self) -> Exchange {
        Self::command("+DUTY?")
    }

    /// `Max 1` followed by the per-band table
    fn parse_duty_cycle(&self, reply: &Reply) -> Option<DutyCycle> {
        let max = capture(&DUTY_RE, body(reply)?)?.parse().ok()?;
        Some(DutyCycle {
            enabled: max > 0,
            max,
        })
    }

    fn set_max_duty_cycle(&self, max: u8) -> Exchange {
        Self::command(format!("+DUTY={}", max))
    }

    fn set_data_rate(&self, data_rate: u8) -> Exchange {
        Self::command(format!("+TXDR={}", data_rate))
    }

    fn data_rate_query(&self) -> Exchange {
        Self::command("+TXDR?")
    }

    /// `DR0 - SF12BW125`
    fn parse_data_rate(&self, reply: &Reply) -> Option<u8> {
        capture(&DATA_RATE_RE, body(reply)?)?.parse().ok()
    }

    fn set_adaptive_data_rate(&self, enabled: bool) -> Exchange {
        Self::command(format!("+ADR={}", u8::from(enabled)))
    }

    fn adaptive_data_rate_query(&self) -> Exchange {
        Self::command("+ADR?")
    }

    fn parse_adaptive_data_rate(&self, reply: &Reply) -> Option<bool> {
        body_flag(reply)
    }
}

impl NetworkClock for MDot {
    fn time_query(&self) -> Exchange {
        Self::command("+GPSTIME").with_timeout(GPS_TIME_TIMEOUT)
    }

    /// Milliseconds on the GPS time scale
    fn parse_time(&self, reply: &Reply) -> Option<EpochValue> {
        let millis = first_number(body(reply)?)?;
        let seconds = u32::try_from(millis / 1000).ok()?;
        (seconds != 0).then(|| EpochValue::gps(seconds))
    }

    fn time_query_attempts(&self) -> u8 {
        5
    }
}

impl LowPower for MDot {
    fn auto_sleep(&self, enabled: bool) -> Exchange {
        Self::command(format!("+AS={}", u8::from(enabled)))
    }

    /// Interval wake, whole seconds
    fn sleep(&self, duration: Duration) -> Vec<Exchange> {
        vec![
            Self::command("+WM=0").required(),
            Self::command(format!("+WI={}", duration.as_secs())).required(),
            Self::command("+SLEEP=0"),
        ]
    }

    /// Wake pin 1 is the UART receive line, no pull-up, either edge
    fn uart_sleep(&self) -> Vec<Exchange> {
        vec![
            Self::command("+WM=1").required(),
            Self::command("+WP=1,0,0").required(),
            Self::command("+SLEEP=0"),
        ]
    }
}

impl DeviceControl for MDot {
    fn set_port(&self, port: u8) -> Exchange {
        Self::command(format!("+AP={}", port))
    }

    fn port_query(&self) -> Exchange {
        Self::command("+AP?")
    }

    fn parse_port(&self, reply: &Reply) -> Option<u8> {
        body_number(reply)
    }

    fn set_class(&self, class: DeviceClass) -> Exchange {
        Self::command(format!("+DC={}", class.as_char()))
    }

    fn class_query(&self) -> Exchange {
        Self::command("+DC?")
    }

    fn parse_class(&self, reply: &Reply) -> Option<DeviceClass> {
        first_line(reply)?.chars().next().and_then(DeviceClass::from_char)
    }

    fn set_public_network(&self, public: bool) -> Exchange {
        Self::command(format!("+PN={}", u8::from(public)))
    }

    fn public_network_query(&self) -> Exchange {
        Self::command("+PN?")
    }

    fn parse_public_network(&self, reply: &Reply) -> Option<bool> {
        body_flag(reply)
    }

    fn set_confirmation_retries(&self, retries: u8) -> Exchange {
        Self::command(format!("+ACK={}", retries))
    }

    fn confirmation_retries_query(&self) -> Exchange {
        Self::command("+ACK?")
    }

    fn parse_confirmation_retries(&self, reply: &Reply) -> Option<u8> {
        body_number(reply)
    }

    /// Fixed by the module part number
    fn set_band(&self, _band: &str) -> Option<Exchange> {
        None
    }

    fn info_query(&self, info: DeviceInfo) -> Option<Exchange> {
        let command = match info {
            DeviceInfo::DevEui => "+DI?",
            DeviceInfo::AppEui => "+NI?",
            DeviceInfo::AppKey => "+NK?",
            DeviceInfo::DevAddr => "+NA?",
            DeviceInfo::NwkSKey => "+NSK?",
            DeviceInfo::AppSKey => "+DSK?",
            DeviceInfo::Firmware => "I",
            DeviceInfo::Band => "+FREQ?",
            DeviceInfo::MacVersion => return None,
        };
        Some(Self::command(command))
    }

    fn parse_info(&self, _info: DeviceInfo, reply: &Reply) -> Option<String> {
        first_line(reply).map(str::to_string)
    }

    /// Unsaved settings are written before the reset
    fn restart(&self) -> Vec<Exchange> {
        vec![Self::command("&W"), Self::command("Z")]
    }

    fn factory_default(&self) -> Vec<Exchange> {
        vec![
            Self::command("&F").required(),
            Self::command("&W").required(),
            Self::command("Z").required(),
        ]
    }

    fn reset_settle_time(&self) -> Duration {
        RESET_SETTLE
    }
}

impl SubBand for MDot {
    fn set_frequency_sub_band(&self, sub_band: u8) -> Exchange {
        Self::command(format!("+FSB={}", sub_band.min(8)))
    }

    fn frequency_sub_band_query(&self) -> Exchange {
        Self::command("+FSB?")
    }

    fn parse_frequency_sub_band(&self, reply: &Reply) -> Option<u8> {
        body_number(reply).filter(|sub_band| *sub_band <= 8)
    }
}
