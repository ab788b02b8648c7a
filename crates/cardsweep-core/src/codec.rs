//! Hexadecimal conversion helpers.
//!
//! Keys, AIDs and block payloads all travel as uppercase hex in logs and
//! on the command line. Decoding is strict: odd-length input or a character
//! outside `[0-9A-Fa-f]` is rejected instead of being silently misread.

use crate::error::Result;

/// Encode bytes as uppercase hex, two characters per byte.
pub fn bytes_to_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode_upper(bytes)
}

/// Decode a hex string into bytes.
///
/// Both upper and lower case digits are accepted.
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_bytes_to_hex_uppercase() {
        assert_eq!(bytes_to_hex([0xABu8, 0x01]), "AB01");
        assert_eq!(bytes_to_hex([0x00u8, 0xff, 0x7f]), "00FF7F");
    }

    #[test]
    fn test_bytes_to_hex_empty() {
        assert_eq!(bytes_to_hex(&[] as &[u8]), "");
        assert!(hex_to_bytes("").unwrap().is_empty());
    }

    #[test]
    fn test_hex_to_bytes_mixed_case() {
        assert_eq!(hex_to_bytes("f2A0").unwrap(), vec![0xF2, 0xA0]);
    }

    #[test]
    fn test_round_trip_all_byte_values() {
        let all: Vec<u8> = (0..=255).collect();
        assert_eq!(hex_to_bytes(&bytes_to_hex(&all)).unwrap(), all);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert!(matches!(
            hex_to_bytes("ABC"),
            Err(Error::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn test_non_hex_digit_rejected() {
        match hex_to_bytes("00ZZ") {
            Err(Error::InvalidEncoding { offset, .. }) => assert_eq!(offset, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
