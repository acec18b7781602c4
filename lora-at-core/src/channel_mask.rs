//! Channel mask codec
//!
//! A channel mask is a bit array of 16 or 72 bits stored as 2 or 9 rows of
//! eight bits. Channel `n` lives in row `n / 8`, bit `1 << (n % 8)`. The
//! wire form is hex, row 0 first, two digits per row.

use crate::error::{LoraError, LoraResult};
use crate::hex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of channels addressed by one mask row
pub const BITS_PER_ROW: usize = 8;

/// Rows in a 16-channel (EU-style) mask
pub const SHORT_MASK_ROWS: usize = 2;

/// Rows in a 72-channel (US-style) mask
pub const LONG_MASK_ROWS: usize = 9;

/// Hex length of a 72-channel mask carrying two leading pad digits
const PADDED_MASK_DIGITS: usize = 20;

fn check_rows(rows: usize) -> LoraResult<()> {
    if rows == SHORT_MASK_ROWS || rows == LONG_MASK_ROWS {
        Ok(())
    } else {
        Err(LoraError::InvalidData(format!(
            "Channel mask must have {} or {} rows, got {}",
            SHORT_MASK_ROWS, LONG_MASK_ROWS, rows
        )))
    }
}

fn locate(rows: &[u8], channel: usize) -> LoraResult<(usize, u8)> {
    let row = channel / BITS_PER_ROW;
    if row >= rows.len() {
        return Err(LoraError::InvalidData(format!(
            "Channel {} out of range (0..{})",
            channel,
            rows.len() * BITS_PER_ROW
        )));
    }
    Ok((row, 1 << (channel % BITS_PER_ROW)))
}

/// Decode a hex mask into its rows
///
/// A 20-digit input is an 18-digit mask behind two pad digits; the pad is
/// skipped.
///
/// # Errors
///
/// Returns `InvalidData` for malformed hex or a size other than 16 or 72
/// channels.
pub fn decode(text: &str) -> LoraResult<Vec<u8>> {
    let text = text.trim();
    let digits = if text.len() == PADDED_MASK_DIGITS {
        text.get(2..).ok_or_else(|| {
            LoraError::InvalidData(format!("Channel mask {:?} is not ASCII", text))
        })?
    } else {
        text
    };
    let rows = hex::decode(digits)?;
    check_rows(rows.len())?;
    Ok(rows)
}

/// Encode mask rows as upper-case hex, row 0 first
pub fn encode(rows: &[u8]) -> String {
    hex::encode(rows)
}

/// Test the enable bit of one channel
pub fn get_channel(rows: &[u8], channel: usize) -> LoraResult<bool> {
    let (row, bit) = locate(rows, channel)?;
    Ok(rows[row] & bit != 0)
}

/// Set or clear the enable bit of one channel
pub fn set_channel(rows: &mut [u8], channel: usize, enabled: bool) -> LoraResult<()> {
    let (row, bit) = locate(rows, channel)?;
    if enabled {
        rows[row] |= bit;
    } else {
        rows[row] &= !bit;
    }
    Ok(())
}

/// Per-channel enable state of a LoRaWAN radio
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelMask {
    rows: Vec<u8>,
}

impl ChannelMask {
    /// Create a mask with every channel disabled
    ///
    /// # Arguments
    /// * `channels` - 16 or 72
    pub fn new(channels: usize) -> LoraResult<Self> {
        if channels % BITS_PER_ROW != 0 {
            return Err(LoraError::InvalidData(format!(
                "Channel count {} is not a multiple of {}",
                channels, BITS_PER_ROW
            )));
        }
        Self::from_rows(vec![0; channels / BITS_PER_ROW])
    }

    /// Wrap raw rows (2 or 9 bytes)
    pub fn from_rows(rows: Vec<u8>) -> LoraResult<Self> {
        check_rows(rows.len())?;
        Ok(Self { rows })
    }

    /// Parse the wire form, see [`decode`]
    pub fn from_hex(text: &str) -> LoraResult<Self> {
        Ok(Self { rows: decode(text)? })
    }

    /// Wire form, see [`encode`]
    pub fn to_hex(&self) -> String {
        encode(&self.rows)
    }

    pub fn as_rows(&self) -> &[u8] {
        &self.rows
    }

    /// Number of addressable channels
    pub fn channel_count(&self) -> usize {
        self.rows.len() * BITS_PER_ROW
    }

    pub fn is_enabled(&self, channel: usize) -> LoraResult<bool> {
        get_channel(&self.rows, channel)
    }

    pub fn set_enabled(&mut self, channel: usize, enabled: bool) -> LoraResult<()> {
        set_channel(&mut self.rows, channel, enabled)
    }

    /// Iterate over the indices of enabled channels, ascending
    pub fn enabled_channels(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.channel_count())
            .filter(move |&channel| self.rows[channel / BITS_PER_ROW] & (1 << (channel % BITS_PER_ROW)) != 0)
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_encode_channel_64_only() {
        let mut mask = ChannelMask::new(72).unwrap();
        mask.set_enabled(64, true).unwrap();
        assert_eq!(mask.as_rows()[8], 0x01);
        assert_eq!(mask.to_hex(), "000000000000000001");
    }

    #[test]
    fn test_decode_skips_padding() {
        assert!(decode("00FF00000000000000000001").is_err());

        let rows = decode("00FF0000000000000001").unwrap();
        assert_eq!(rows.len(), LONG_MASK_ROWS);
        assert_eq!(rows[0], 0xFF);
        assert_eq!(rows[8], 0x01);
    }

    #[test]
    fn test_round_trip_both_sizes() {
        for rows in [vec![0xA5, 0x3C], vec![0xFF, 0x00, 0x01, 0x80, 0x7E, 0x00, 0x10, 0x00, 0x02]] {
            let decoded = decode(&encode(&rows)).unwrap();
            assert_eq!(decoded, rows);
        }
    }

    #[test]
    fn test_round_trip_random_masks() {
        let mut rng = StdRng::seed_from_u64(0x4C6F_5261);
        for rows_len in [SHORT_MASK_ROWS, LONG_MASK_ROWS] {
            for _ in 0..500 {
                let rows: Vec<u8> = (0..rows_len).map(|_| rng.r#gen()).collect();
                let text = encode(&rows);
                assert_eq!(text.len(), rows_len * 2);
                assert_eq!(decode(&text).unwrap(), rows, "mask {}", text);

                let mut mask = ChannelMask::from_rows(rows.clone()).unwrap();
                let channel = rng.gen_range(0..mask.channel_count());
                let enabled = rng.r#gen();
                mask.set_enabled(channel, enabled).unwrap();
                assert_eq!(mask.is_enabled(channel).unwrap(), enabled);
                let changed: Vec<usize> = (0..mask.channel_count())
                    .filter(|&c| get_channel(&rows, c).unwrap() != mask.is_enabled(c).unwrap())
                    .collect();
                assert!(changed.is_empty() || changed == vec![channel]);
            }
        }
    }

    #[test]
    fn test_toggle_leaves_other_channels_alone() {
        let mut mask = ChannelMask::from_hex("FF00FF00FF00FF00FF").unwrap();
        let before = mask.clone();
        mask.set_enabled(9, true).unwrap();
        assert!(mask.is_enabled(9).unwrap());
        for channel in (0..72).filter(|&c| c != 9) {
            assert_eq!(
                mask.is_enabled(channel).unwrap(),
                before.is_enabled(channel).unwrap(),
                "channel {} changed",
                channel
            );
        }

        mask.set_enabled(0, false).unwrap();
        assert!(!mask.is_enabled(0).unwrap());
        assert!(mask.is_enabled(1).unwrap());
    }

    #[test]
    fn test_out_of_range_channel() {
        let mut rows = vec![0u8; SHORT_MASK_ROWS];
        assert!(get_channel(&rows, 15).is_ok());
        assert!(matches!(get_channel(&rows, 16), Err(LoraError::InvalidData(_))));
        assert!(set_channel(&mut rows, 16, true).is_err());
        assert_eq!(rows, vec![0, 0]);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(ChannelMask::new(24).is_err());
        assert!(ChannelMask::new(10).is_err());
        assert!(ChannelMask::from_hex("00FF00").is_err());
    }

    #[test]
    fn test_enabled_channels() {
        let mask = ChannelMask::from_hex("0380").unwrap();
        assert_eq!(mask.enabled_channels().collect::<Vec<_>>(), vec![0, 1, 15]);
    }
}
