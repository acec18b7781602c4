//! Hex helpers shared by the downlink decoder and the channel mask codec

use crate::error::{LoraError, LoraResult};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Marker for bytes that are not hex digits in [`NIBBLE_TABLE`]
const INVALID: u8 = 0xFF;

static NIBBLE_TABLE: once_cell::sync::Lazy<[u8; 256]> = once_cell::sync::Lazy::new(|| {
    let mut table = [INVALID; 256];
    for (value, digit) in HEX_DIGITS.iter().enumerate() {
        table[*digit as usize] = value as u8;
        table[digit.to_ascii_lowercase() as usize] = value as u8;
    }
    table
});

/// Value of a single hex digit, or `None` for any other byte
pub fn nibble(digit: u8) -> Option<u8> {
    match NIBBLE_TABLE[digit as usize] {
        INVALID => None,
        value => Some(value),
    }
}

/// Encode bytes as upper-case hex, two digits per byte
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        out.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
    }
    out
}

/// Decode a hex string (either case) into bytes
///
/// # Errors
///
/// Returns `InvalidData` if the input has an odd number of digits or
/// contains a character that is not a hex digit.
pub fn decode(text: &str) -> LoraResult<Vec<u8>> {
    let digits = text.as_bytes();
    if digits.len() % 2 != 0 {
        return Err(LoraError::InvalidData(format!(
            "Hex string has odd length {}",
            digits.len()
        )));
    }

    digits
        .chunks_exact(2)
        .map(|pair| match (nibble(pair[0]), nibble(pair[1])) {
            (Some(high), Some(low)) => Ok((high << 4) | low),
            _ => Err(LoraError::InvalidData(format!(
                "Invalid hex digits {:?}",
                String::from_utf8_lossy(pair)
            ))),
        })
        .collect()
}

/// Check that `text` is exactly `digits` hex characters long
pub fn is_hex_of_len(text: &str, digits: usize) -> bool {
    text.len() == digits && text.bytes().all(|b| nibble(b).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_upper_case_and_padded() {
        assert_eq!(encode(&[0x00, 0x0A, 0xFF, 0x10]), "000AFF10");
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_decode_accepts_both_cases() {
        assert_eq!(decode("0aFf").unwrap(), vec![0x0A, 0xFF]);
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert!(matches!(decode("ABC"), Err(LoraError::InvalidData(_))));
        assert!(matches!(decode("0G"), Err(LoraError::InvalidData(_))));
    }

    #[test]
    fn test_is_hex_of_len() {
        assert!(is_hex_of_len("0011223344556677", 16));
        assert!(!is_hex_of_len("001122334455667", 16));
        assert!(!is_hex_of_len("00112233445566ZZ", 16));
    }
}
