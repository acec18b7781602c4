//! Epoch converter
//!
//! Converts 32-bit second counts between the UNIX epoch (1970-01-01), the
//! Y2K epoch (2000-01-01) and the GPS epoch (1980-01-06). GPS time has no
//! leap seconds, so GPS <-> UNIX needs the count of leap seconds announced
//! since 1980, taken from [`LEAP_SECONDS`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// UNIX time of the GPS epoch
pub const GPS_UNIX_OFFSET: u32 = 315_964_800;

/// UNIX time of the Y2K epoch
pub const Y2K_UNIX_OFFSET: u32 = 946_684_800;

/// Leap second instants expressed in GPS seconds, ascending
pub const LEAP_SECONDS: [u32; 18] = [
    46_828_800,    // 1981-07-01
    78_364_801,    // 1982-07-01
    109_900_802,   // 1983-07-01
    173_059_203,   // 1985-07-01
    252_028_804,   // 1988-01-01
    315_187_205,   // 1990-01-01
    346_723_206,   // 1991-01-01
    393_984_007,   // 1992-07-01
    425_520_008,   // 1993-07-01
    457_056_009,   // 1994-07-01
    504_489_610,   // 1996-01-01
    551_750_411,   // 1997-07-01
    599_184_012,   // 1999-01-01
    820_108_813,   // 2006-01-01
    914_803_214,   // 2009-01-01
    1_025_136_015, // 2012-07-01
    1_119_744_016, // 2015-07-01
    1_167_264_017, // 2017-01-01
];

/// Epoch a second count is relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EpochKind {
    Unix,
    Y2k,
    Gps,
}

impl EpochKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochKind::Unix => "UNIX",
            EpochKind::Y2k => "Y2K",
            EpochKind::Gps => "GPS",
        }
    }
}

impl fmt::Display for EpochKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Saturate a widened result back into 32 bits
fn clamp(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

/// Whether `gps` is itself one of the inserted leap second instants
pub fn is_leap_second(gps: u32) -> bool {
    LEAP_SECONDS.binary_search(&gps).is_ok()
}

/// Leap seconds in effect at GPS time `gps`
pub fn leap_seconds_at(gps: u32) -> u32 {
    LEAP_SECONDS.partition_point(|&leap| leap <= gps) as u32
}

/// Convert GPS seconds to UNIX seconds
///
/// On a leap second instant the exact result lies half a second later;
/// the half second is dropped.
pub fn gps_to_unix(gps: u32) -> u32 {
    clamp(gps as i64 + GPS_UNIX_OFFSET as i64 - leap_seconds_at(gps) as i64)
}

/// Convert UNIX seconds to GPS seconds
///
/// Inverse of [`gps_to_unix`] for every GPS time that is not a leap second
/// instant. UNIX times before the GPS epoch saturate to 0.
pub fn unix_to_gps(unix: u32) -> u32 {
    let nominal = unix as i64 - GPS_UNIX_OFFSET as i64;
    if nominal < 0 {
        return 0;
    }
    let leaps = LEAP_SECONDS
        .iter()
        .enumerate()
        .filter(|&(index, &leap)| leap as i64 - index as i64 <= nominal)
        .count();
    clamp(nominal + leaps as i64)
}

/// Convert UNIX seconds to Y2K seconds, saturating at 0 before 2000
pub fn unix_to_y2k(unix: u32) -> u32 {
    unix.saturating_sub(Y2K_UNIX_OFFSET)
}

/// Convert Y2K seconds to UNIX seconds
pub fn y2k_to_unix(y2k: u32) -> u32 {
    y2k.saturating_add(Y2K_UNIX_OFFSET)
}

/// A 32-bit second count tagged with its epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpochValue {
    pub seconds: u32,
    pub kind: EpochKind,
}

impl EpochValue {
    pub fn new(seconds: u32, kind: EpochKind) -> Self {
        Self { seconds, kind }
    }

    pub fn unix(seconds: u32) -> Self {
        Self::new(seconds, EpochKind::Unix)
    }

    pub fn gps(seconds: u32) -> Self {
        Self::new(seconds, EpochKind::Gps)
    }

    pub fn y2k(seconds: u32) -> Self {
        Self::new(seconds, EpochKind::Y2k)
    }

    /// Same instant in UNIX seconds
    pub fn to_unix(&self) -> u32 {
        match self.kind {
            EpochKind::Unix => self.seconds,
            EpochKind::Y2k => y2k_to_unix(self.seconds),
            EpochKind::Gps => gps_to_unix(self.seconds),
        }
    }

    /// Same instant relative to another epoch
    pub fn convert(&self, kind: EpochKind) -> EpochValue {
        if kind == self.kind {
            return *self;
        }
        let unix = self.to_unix();
        let seconds = match kind {
            EpochKind::Unix => unix,
            EpochKind::Y2k => unix_to_y2k(unix),
            EpochKind::Gps => unix_to_gps(unix),
        };
        EpochValue::new(seconds, kind)
    }
}

impl fmt::Display for EpochValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seconds, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_gps_epoch_start() {
        assert_eq!(gps_to_unix(0), GPS_UNIX_OFFSET);
        assert_eq!(unix_to_gps(GPS_UNIX_OFFSET), 0);
        assert_eq!(unix_to_gps(0), 0);
    }

    #[test]
    fn test_current_leap_offset() {
        // 18 leap seconds since 2017
        assert_eq!(gps_to_unix(1_400_000_000), 1_715_964_782);
        assert_eq!(unix_to_gps(1_715_964_782), 1_400_000_000);
    }

    #[test]
    fn test_leap_second_boundary() {
        let leap = LEAP_SECONDS[0];
        assert!(is_leap_second(leap));
        assert!(!is_leap_second(leap - 1));
        assert_eq!(gps_to_unix(leap - 1), leap - 1 + GPS_UNIX_OFFSET);
        // leap instant and the second after both map to the same UNIX second
        assert_eq!(gps_to_unix(leap), leap + GPS_UNIX_OFFSET - 1);
        assert_eq!(gps_to_unix(leap + 1), leap + GPS_UNIX_OFFSET);
    }

    #[test]
    fn test_round_trip_random_gps() {
        let mut rng = rand::thread_rng();
        let mut checked = 0;
        while checked < 1000 {
            let gps: u32 = rng.gen_range(0..3_900_000_000);
            if is_leap_second(gps) {
                continue;
            }
            assert_eq!(unix_to_gps(gps_to_unix(gps)), gps, "gps {}", gps);
            checked += 1;
        }
    }

    #[test]
    fn test_round_trip_around_every_leap() {
        for &leap in LEAP_SECONDS.iter() {
            for gps in [leap - 2, leap - 1, leap + 1, leap + 2] {
                assert_eq!(unix_to_gps(gps_to_unix(gps)), gps, "gps {}", gps);
            }
        }
    }

    #[test]
    fn test_y2k() {
        assert_eq!(unix_to_y2k(Y2K_UNIX_OFFSET + 42), 42);
        assert_eq!(unix_to_y2k(1000), 0);

        let value = EpochValue::unix(1_715_964_782);
        assert_eq!(value.convert(EpochKind::Y2k), EpochValue::y2k(1_715_964_782 - Y2K_UNIX_OFFSET));
        assert_eq!(value.convert(EpochKind::Gps), EpochValue::gps(1_400_000_000));
        assert_eq!(EpochValue::gps(1_400_000_000).convert(EpochKind::Unix), value);
    }
}
