//! Seeed LoRa-E5 (Wio-E5) command vocabulary
//!
//! Every reply is prefixed with the command name (`+JOIN: ...`), so most
//! exchanges match the echo and then read the rest of the line.

use super::{
    AbpCredentials, ChannelPlan, DeviceClass, DeviceControl, DeviceInfo, DutyCycle, LowPower,
    NetworkClock, OtaaCredentials, RadioTuning, UplinkReplies, Vocabulary, first_number,
};
use lora_at_core::{ChannelMask, EpochKind, EpochValue, hex};
use lora_at_session::{Dialect, Exchange, JoinOutcome, PayloadEncoding, Reply, Trailer, Urc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

pub const AT_OK: &str = "+AT: OK";
pub const AT_ERROR: &str = "+AT: ERROR";

const PROBE_TIMEOUT: Duration = Duration::from_millis(200);
const RTC_TIMEOUT: Duration = Duration::from_millis(2000);

/// Offset from the `+RTC` second count to UNIX time. The count is
/// reported as-is for the GPS epoch.
pub const RTC_UNIX_OFFSET: u32 = 315_878_400;

/// Written before each command so that a sleeping module wakes up
const WAKE_PREAMBLE: [u8; 4] = [0xFF; 4];

const JOIN_PATTERNS: [&str; 5] = [
    "+JOIN: Network joined",
    "+JOIN: Join failed",
    "+JOIN: Joined already",
    "+JOIN: LoRaWAN modem is busy",
    "+JOIN: Not in OTAA mode",
];

static DOWNLINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"PORT:\s*(\d+);\s*RX:\s*"([^"]*)""#).expect("downlink pattern")
});

static SIGNAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"RXWIN\d*,\s*RSSI\s*(-?\d+)").expect("signal pattern"));

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*Link\s*(\d+),\s*(\d+)").expect("link check pattern"));

/// Seeed LoRa-E5 modem
#[derive(Debug, Clone)]
pub struct LoraE5 {
    hex_uplinks: bool,
    channel_count: usize,
}

impl LoraE5 {
    /// Hex-encoded uplinks on a 72-channel plan
    pub fn new() -> Self {
        Self {
            hex_uplinks: true,
            channel_count: 72,
        }
    }

    /// Send payloads as quoted text (`AT+MSG="..."`) instead of hex
    pub fn with_raw_uplinks(mut self) -> Self {
        self.hex_uplinks = false;
        self
    }

    /// 16 for EU-style plans, 72 for US-style plans
    pub fn with_channel_count(mut self, channels: usize) -> Self {
        self.channel_count = channels;
        self
    }

    fn echo(command: impl AsRef<str>, echo: &'static str) -> Exchange {
        Exchange::at(command).expect(&[echo, AT_ERROR]).then_line()
    }

    fn on_off(enabled: bool) -> &'static str {
        if enabled { "ON" } else { "OFF" }
    }

    /// `+LOWPOWER` reply followed by the `SLEEP` notice
    fn enter_sleep(command: String, confirm_sleep: bool) -> Vec<Exchange> {
        let sleep = Exchange::wait().expect(&["SLEEP"]).then_line();
        vec![
            Exchange::at(command).expect(&["+LOWPOWER:", AT_ERROR]).required(),
            if confirm_sleep { sleep.required() } else { sleep },
        ]
    }
}

/// Trimmed trailer of a successful reply
fn trailer_text(reply: &Reply) -> Option<String> {
    if !reply.is_success() {
        return None;
    }
    let text = reply.trailer.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn trailer_number<T: TryFrom<u64>>(reply: &Reply) -> Option<T> {
    if !reply.is_success() {
        return None;
    }
    first_number(&reply.trailer).and_then(|value| T::try_from(value).ok())
}

impl Default for LoraE5 {
    fn default() -> Self {
        Self::new()
    }
}

/// Saturating conversion of a parsed RSSI
fn to_rssi(text: &str) -> Option<i8> {
    text.parse::<i32>()
        .ok()
        .map(|value| value.clamp(i8::MIN as i32, i8::MAX as i32) as i8)
}

impl Dialect for LoraE5 {
    fn recognize_urc(&self, line: &str) -> Option<Urc> {
        if line.ends_with("+LOWPOWER: WAKEUP") {
            return Some(Urc::Wake);
        }
        if line.contains(": Please join network first") {
            return Some(Urc::NotJoined);
        }
        if let Some(caps) = DOWNLINK_RE.captures(line) {
            return Some(Urc::Downlink {
                port: caps[1].parse().ok(),
                encoding: PayloadEncoding::Hex,
                data: caps[2].to_string(),
            });
        }
        if let Some(caps) = SIGNAL_RE.captures(line) {
            return to_rssi(&caps[1]).map(|rssi| Urc::Signal { rssi });
        }
        if let Some(caps) = LINK_RE.captures(line) {
            let margin = caps[1].parse().ok()?;
            let gateways = caps[2].parse().ok()?;
            return Some(Urc::LinkCheck { margin, gateways });
        }
        None
    }

    fn wake_preamble(&self) -> &[u8] {
        &WAKE_PREAMBLE
    }
}

impl Vocabulary for LoraE5 {
    fn model(&self) -> &'static str {
        "LoRa-E5"
    }

    fn probe(&self) -> Exchange {
        Exchange::at("")
            .expect(&[AT_OK, AT_ERROR])
            .with_timeout(PROBE_TIMEOUT)
            .then_line()
    }

    fn init_sequence(&self) -> Vec<Exchange> {
        vec![Self::echo("+LOG=QUIET", "+LOG: QUIET")]
    }

    fn uplink_budget_query(&self) -> Exchange {
        Self::echo("+LW=LEN", "+LW: LEN,")
    }

    fn parse_uplink_budget(&self, reply: &Reply) -> Option<usize> {
        if !reply.is_success() {
            return None;
        }
        first_number(&reply.trailer).map(|budget| budget as usize)
    }

    fn uplink(&self, payload: &[u8], confirmed: bool) -> Exchange {
        // an empty confirmed frame always goes through the hex command
        let command = match (self.hex_uplinks || payload.is_empty(), confirmed) {
            (true, false) => "+MSGHEX",
            (true, true) => "+CMSGHEX",
            (false, false) => "+MSG",
            (false, true) => "+CMSG",
        };
        if payload.is_empty() {
            return Exchange::at(command);
        }
        if self.hex_uplinks {
            return Exchange::at(format!("{}=\"{}\"", command, hex::encode(payload)));
        }
        let mut line = format!("AT{}=\"", command).into_bytes();
        line.extend_from_slice(payload);
        line.push(b'"');
        Exchange::raw(line)
    }

    fn uplink_replies(&self) -> UplinkReplies {
        UplinkReplies {
            start: Some(": Start"),
            ack: ": ACK Received",
            done: ": Done",
            error: ": ERROR",
            trailer: Trailer::Line,
        }
    }

    fn join_request(&self, force: bool) -> Exchange {
        let command = if force { "+JOIN=FORCE" } else { "+JOIN" };
        Exchange::at(command).expect(&JOIN_PATTERNS)
    }

    fn classify_join(&self, index: u8) -> JoinOutcome {
        match index {
            1 => JoinOutcome::Success,
            2 => JoinOutcome::Failure,
            3 => JoinOutcome::AlreadyJoined,
            4 => JoinOutcome::Busy,
            5 => JoinOutcome::WrongMode,
            _ => JoinOutcome::Timeout,
        }
    }

    fn join_trailer(&self, outcome: JoinOutcome, timeout: Duration) -> Option<Exchange> {
        match outcome {
            JoinOutcome::Success | JoinOutcome::Failure | JoinOutcome::WrongMode => Some(
                Exchange::wait()
                    .expect(&["+JOIN: Done"])
                    .with_timeout(timeout)
                    .then_line(),
            ),
            _ => None,
        }
    }

    fn provision_otaa(&self, credentials: &OtaaCredentials<'_>) -> Vec<Exchange> {
        let mut steps = vec![
            Self::echo(format!("+ID=AppEui, \"{}\"", credentials.app_eui), "+ID: AppEui").required(),
            Self::echo(format!("+KEY=APPKEY, \"{}\"", credentials.app_key), "+KEY: APPKEY").required(),
        ];
        if let Some(dev_eui) = credentials.dev_eui {
            steps.push(Self::echo(format!("+ID=DevEui, \"{}\"", dev_eui), "+ID: DevEui").required());
        }
        steps.push(Self::echo("+MODE=LWOTAA", "+MODE: LWOTAA").required());
        steps
    }

    fn provision_abp(&self, credentials: &AbpCredentials<'_>) -> Vec<Exchange> {
        let mut steps = vec![
            Self::echo(format!("+ID=DevAddr, \"{}\"", credentials.dev_addr), "+ID: DevAddr").required(),
            Self::echo(format!("+KEY=APPSKEY, \"{}\"", credentials.app_skey), "+KEY: APPSKEY").required(),
            Self::echo(format!("+KEY=NWKSKEY, \"{}\"", credentials.nwk_skey), "+KEY: NWKSKEY").required(),
        ];
        let uplink = credentials.uplink_counter.unwrap_or(1);
        let downlink = credentials.downlink_counter.unwrap_or(0);
        if (uplink, downlink) != (1, 0) {
            steps.push(Self::echo(format!("+LW=ULDL, {},{}", uplink, downlink), "+LW: ULDL").required());
        }
        steps.push(Self::echo("+MODE=LWABP", "+MODE: LWABP").required());
        steps
    }

    fn link_check_request(&self) -> Exchange {
        Self::echo("+LW=LCR", "+LW: LCR")
    }

    fn link_check_via_uplink(&self) -> bool {
        true
    }
}

impl ChannelPlan for LoraE5 {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn channel_mask_query(&self) -> Exchange {
        Self::echo("+CH", "+CH: ")
    }

    /// `+CH: 3; 0,868100000,DR0:DR5; 1,868300000,DR0:DR5; 2,...`
    fn parse_channel_mask(&self, reply: &Reply) -> Option<ChannelMask> {
        if !reply.is_success() {
            return None;
        }
        let mut mask = ChannelMask::new(self.channel_count).ok()?;
        let mut fields = reply.trailer.split(';');
        let active = first_number(fields.next()?).unwrap_or(0);
        for entry in fields.take(active as usize) {
            let Some(channel) = entry.split(',').next().and_then(|c| c.trim().parse::<usize>().ok())
            else {
                continue;
            };
            if channel < mask.channel_count() {
                mask.set_enabled(channel, true).ok()?;
            }
        }
        Some(mask)
    }

    fn write_channel_mask(&self, mask: &ChannelMask) -> Vec<Exchange> {
        (0..mask.channel_count())
            .filter_map(|channel| {
                let enabled = mask.is_enabled(channel).ok()?;
                self.channel_toggle(channel, enabled)
            })
            .collect()
    }

    fn channel_toggle(&self, channel: usize, enabled: bool) -> Option<Exchange> {
        Some(Self::echo(format!("+CH={},{}", channel, Self::on_off(enabled)), "+CH: CH"))
    }
}

impl RadioTuning for LoraE5 {
    fn set_duty_cycle(&self, enabled: bool) -> Option<Exchange> {
        Some(Self::echo(format!("+LW=DC, {}", Self::on_off(enabled)), "+LW: DC"))
    }

    fn duty_cycle_query(&self) -> Exchange {
        Self::echo("+LW=DC", "+LW: DC")
    }

    /// `+LW: DC, ON, 1000`
    fn parse_duty_cycle(&self, reply: &Reply) -> Option<DutyCycle> {
        if !reply.is_success() {
            return None;
        }
        let text = reply.trailer.to_ascii_uppercase();
        let enabled = text.contains("ON");
        let max = first_number(&text).unwrap_or(0).min(u8::MAX as u64) as u8;
        Some(DutyCycle { enabled, max })
    }

    fn set_max_duty_cycle(&self, max: u8) -> Exchange {
        Self::echo(format!("+LW=DC, {}", max), "+LW: DC")
    }

    fn set_data_rate(&self, data_rate: u8) -> Exchange {
        Self::echo(format!("+DR={}", data_rate), "+DR: DR")
    }

    fn data_rate_query(&self) -> Exchange {
        Self::echo("+DR", "+DR: DR")
    }

    fn parse_data_rate(&self, reply: &Reply) -> Option<u8> {
        if !reply.is_success() {
            return None;
        }
        first_number(&reply.trailer).and_then(|dr| u8::try_from(dr).ok())
    }

    fn set_adaptive_data_rate(&self, enabled: bool) -> Exchange {
        Self::echo(format!("+ADR={}", Self::on_off(enabled)), "+ADR:")
    }

    fn adaptive_data_rate_query(&self) -> Exchange {
        Self::echo("+ADR?", "+ADR:")
    }

    fn parse_adaptive_data_rate(&self, reply: &Reply) -> Option<bool> {
        if !reply.is_success() {
            return None;
        }
        let text = reply.trailer.trim().to_ascii_uppercase();
        match text.as_str() {
            "ON" => Some(true),
            "OFF" => Some(false),
            _ => None,
        }
    }
}

impl NetworkClock for LoraE5 {
    fn time_sync_request(&self) -> Option<Exchange> {
        Some(Self::echo("+LW=DTR", "+LW: DTR"))
    }

    fn time_sync_via_uplink(&self) -> bool {
        true
    }

    fn time_query(&self) -> Exchange {
        Self::echo("+RTC=FULL", "+RTC: ").with_timeout(RTC_TIMEOUT)
    }

    /// `+RTC: 2024-05-06 12:00:00 +00:00, 1399032018, 12` where the middle
    /// field is a second count [`RTC_UNIX_OFFSET`] behind UNIX time
    fn parse_time(&self, reply: &Reply) -> Option<EpochValue> {
        if !reply.is_success() {
            return None;
        }
        let seconds = reply.trailer.split(',').nth(1)?.trim().parse::<u32>().ok()?;
        (seconds != 0).then(|| EpochValue::unix(seconds.saturating_add(RTC_UNIX_OFFSET)))
    }

    fn epoch_seconds(&self, value: EpochValue, kind: EpochKind) -> u32 {
        match kind {
            EpochKind::Gps => value.to_unix().saturating_sub(RTC_UNIX_OFFSET),
            _ => value.convert(kind).seconds,
        }
    }
}

impl LowPower for LoraE5 {
    fn auto_sleep(&self, enabled: bool) -> Exchange {
        Self::echo(
            format!("+LOWPOWER={}", if enabled { "AUTOON" } else { "AUTOOFF" }),
            "+LOWPOWER:",
        )
    }

    fn sleep(&self, duration: Duration) -> Vec<Exchange> {
        Self::enter_sleep(format!("+LOWPOWER={}", duration.as_millis()), true)
    }

    /// Woken by the four 0xFF bytes ahead of the next command
    fn uart_sleep(&self) -> Vec<Exchange> {
        Self::enter_sleep("+LOWPOWER".to_string(), false)
    }
}

impl DeviceControl for LoraE5 {
    fn set_port(&self, port: u8) -> Exchange {
        Self::echo(format!("+PORT={}", port), "+PORT: ")
    }

    fn port_query(&self) -> Exchange {
        Self::echo("+PORT", "+PORT: ")
    }

    fn parse_port(&self, reply: &Reply) -> Option<u8> {
        trailer_number(reply)
    }

    fn set_class(&self, class: DeviceClass) -> Exchange {
        Self::echo(format!("+CLASS={}", class.as_char()), "+CLASS: ")
    }

    fn class_query(&self) -> Exchange {
        Self::echo("+CLASS", "+CLASS: ")
    }

    fn parse_class(&self, reply: &Reply) -> Option<DeviceClass> {
        trailer_text(reply)?.chars().next().and_then(DeviceClass::from_char)
    }

    fn set_public_network(&self, public: bool) -> Exchange {
        Self::echo(format!("+LW=NET, {}", Self::on_off(public)), "+LW: NET")
    }

    fn public_network_query(&self) -> Exchange {
        Self::echo("+LW=NET", "+LW: NET")
    }

    /// `+LW: NET, ON`
    fn parse_public_network(&self, reply: &Reply) -> Option<bool> {
        let text = trailer_text(reply)?.to_ascii_uppercase();
        if text.contains("ON") {
            Some(true)
        } else if text.contains("OFF") {
            Some(false)
        } else {
            None
        }
    }

    fn set_confirmation_retries(&self, retries: u8) -> Exchange {
        Self::echo(format!("+RETRY={}", retries), "+RETRY: ")
    }

    fn confirmation_retries_query(&self) -> Exchange {
        Self::echo("+RETRY", "+RETRY: ")
    }

    fn parse_confirmation_retries(&self, reply: &Reply) -> Option<u8> {
        trailer_number(reply)
    }

    fn set_band(&self, band: &str) -> Option<Exchange> {
        Some(Self::echo(format!("+DR={}", band), "+DR: "))
    }

    /// Keys are write-only
    fn info_query(&self, info: DeviceInfo) -> Option<Exchange> {
        let (command, echo) = match info {
            DeviceInfo::DevEui => ("+ID=DevEui", "+ID: DevEui, "),
            DeviceInfo::AppEui => ("+ID=AppEui", "+ID: AppEui, "),
            DeviceInfo::DevAddr => ("+ID=DevAddr", "+ID: DevAddr, "),
            DeviceInfo::Firmware => ("+VER", "+VER: "),
            DeviceInfo::MacVersion => ("+LW=VER", "+LW: VER, "),
            DeviceInfo::Band => ("+DR=SCHEME", "+DR: "),
            DeviceInfo::AppKey | DeviceInfo::NwkSKey | DeviceInfo::AppSKey => return None,
        };
        Some(Self::echo(command, echo))
    }

    fn parse_info(&self, _info: DeviceInfo, reply: &Reply) -> Option<String> {
        trailer_text(reply)
    }

    fn restart(&self) -> Vec<Exchange> {
        vec![Exchange::at("+RESET").expect(&["+RESET: OK", AT_ERROR]).then_line().required()]
    }

    fn factory_default(&self) -> Vec<Exchange> {
        vec![Exchange::at("+FDEFAULT").expect(&["+FDEFAULT: OK", AT_ERROR]).then_line().required()]
    }
}
