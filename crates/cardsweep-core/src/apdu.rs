//! SELECT-by-AID command frames (ISO/IEC 7816-4).
//!
//! Frame layout: `[CLA | INS | P1 | P2 | Lc | AID...]` with the fixed header
//! `00 A4 04 00`. A service answering the SELECT appends the status word
//! `90 00` on success.

use crate::codec::{bytes_to_hex, hex_to_bytes};
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;

/// Class byte of the SELECT command
pub const SELECT_CLA: u8 = 0x00;
/// Instruction byte of the SELECT command
pub const SELECT_INS: u8 = 0xA4;
/// P1: select by DF name (AID)
pub const SELECT_P1_BY_NAME: u8 = 0x04;
/// P2: first or only occurrence
pub const SELECT_P2_FIRST: u8 = 0x00;

/// Header shared by every SELECT-by-AID frame
pub const SELECT_APDU_HEADER: [u8; 4] =
    [SELECT_CLA, SELECT_INS, SELECT_P1_BY_NAME, SELECT_P2_FIRST];

/// Status word returned by a service that accepted the SELECT
pub const SELECT_OK_SW: [u8; 2] = [0x90, 0x00];

/// AID of the sample loyalty card service
pub const SAMPLE_LOYALTY_AID: &str = "F222222222";

/// Largest AID that fits a short Lc byte
pub const MAX_AID_LEN: usize = 255;

/// Build the SELECT APDU for the given hex-encoded AID.
///
/// The AID must be non-empty, have an even number of hex digits and decode
/// to at most [`MAX_AID_LEN`] bytes.
pub fn build_select_apdu(aid: &str) -> Result<Bytes> {
    if aid.is_empty() {
        return Err(Error::invalid_argument("AID must not be empty"));
    }
    if aid.len() % 2 != 0 {
        return Err(Error::invalid_argument(format!(
            "AID '{}' has an odd number of hex digits",
            aid
        )));
    }
    if aid.len() / 2 > MAX_AID_LEN {
        return Err(Error::invalid_argument(format!(
            "AID is {} bytes long, at most {} fit the length byte",
            aid.len() / 2,
            MAX_AID_LEN
        )));
    }

    let aid = hex_to_bytes(aid)?;
    let mut buffer = BytesMut::with_capacity(SELECT_APDU_HEADER.len() + 1 + aid.len());
    buffer.put_slice(&SELECT_APDU_HEADER);
    buffer.put_u8(aid.len() as u8);
    buffer.put_slice(&aid);

    Ok(buffer.freeze())
}

/// Response to a SELECT command, split into payload and status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectResponse {
    payload: Bytes,
    sw1: u8,
    sw2: u8,
}

impl SelectResponse {
    /// Split raw response bytes into payload and trailing status word
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < 2 {
            return Err(Error::invalid_argument(format!(
                "response too short: expected at least 2 bytes, got {}",
                raw.len()
            )));
        }
        let (payload, sw) = raw.split_at(raw.len() - 2);
        Ok(Self {
            payload: Bytes::copy_from_slice(payload),
            sw1: sw[0],
            sw2: sw[1],
        })
    }

    /// Status word bytes
    pub fn status(&self) -> [u8; 2] {
        [self.sw1, self.sw2]
    }

    /// Status word as uppercase hex
    pub fn status_hex(&self) -> String {
        bytes_to_hex(self.status())
    }

    /// Whether the service accepted the SELECT
    pub fn is_ok(&self) -> bool {
        self.status() == SELECT_OK_SW
    }

    /// Response payload without the status word
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The account identifier carried by a successful response.
    ///
    /// Returns `None` if the status word is not `90 00`. Payload bytes that
    /// are not valid UTF-8 are replaced rather than rejected.
    pub fn account(&self) -> Option<Cow<'_, str>> {
        self.is_ok().then(|| String::from_utf8_lossy(&self.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_sample_aid_frame() {
        let apdu = build_select_apdu(SAMPLE_LOYALTY_AID).unwrap();
        assert_eq!(
            &apdu[..],
            &[0x00, 0xA4, 0x04, 0x00, 0x05, 0xF2, 0x22, 0x22, 0x22, 0x22]
        );
        assert_eq!(bytes_to_hex(&apdu), "00A4040005F222222222");
    }

    #[test]
    fn test_length_byte_tracks_aid() {
        let apdu = build_select_apdu("A0000000041010").unwrap();
        assert_eq!(apdu[4], 7);
        assert_eq!(apdu.len(), 5 + 7);
    }

    #[test]
    fn test_max_aid_len() {
        let aid = "AB".repeat(MAX_AID_LEN);
        let apdu = build_select_apdu(&aid).unwrap();
        assert_eq!(apdu[4], 0xFF);

        let too_long = "AB".repeat(MAX_AID_LEN + 1);
        let err = build_select_apdu(&too_long).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_invalid_aid() {
        assert_eq!(
            build_select_apdu("").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            build_select_apdu("F22").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            build_select_apdu("F2XX").unwrap_err().kind(),
            ErrorKind::InvalidEncoding
        );
    }

    #[test]
    fn test_select_response_account() {
        let mut raw = b"1234-5678".to_vec();
        raw.extend_from_slice(&SELECT_OK_SW);
        let response = SelectResponse::parse(&raw).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.account().as_deref(), Some("1234-5678"));
    }

    #[test]
    fn test_select_response_error_status() {
        let response = SelectResponse::parse(&[0x6A, 0x82]).unwrap();
        assert!(!response.is_ok());
        assert_eq!(response.status_hex(), "6A82");
        assert!(response.payload().is_empty());
        assert!(response.account().is_none());
    }

    #[test]
    fn test_select_response_too_short() {
        assert!(SelectResponse::parse(&[0x90]).is_err());
    }
}
