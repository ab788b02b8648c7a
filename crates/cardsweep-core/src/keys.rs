//! Candidate authentication keys.
//!
//! The default table is the public set of manufacturer and transport keys
//! that ship on MIFARE Classic cards. Probe order is the table order.

use crate::codec::{bytes_to_hex, hex_to_bytes};
use crate::error::{Error, Result};
use std::fmt;
use std::ops::Index;

/// Length of a MIFARE Classic sector key in bytes
pub const KEY_LEN: usize = 6;

/// A 6-byte sector key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateKey([u8; KEY_LEN]);

impl CandidateKey {
    /// Creates a key from its raw bytes
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a key from 12 hex digits
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex_to_bytes(s)?;
        Self::try_from(bytes.as_slice())
    }

    /// Returns the raw key bytes
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for CandidateKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            Error::invalid_argument(format!(
                "key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bytes_to_hex(self.0))
    }
}

impl fmt::Debug for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CandidateKey({})", self)
    }
}

/// Well-known default keys, in probe order
pub const DEFAULT_KEYS: [CandidateKey; 13] = [
    CandidateKey::new([0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]),
    CandidateKey::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]),
    CandidateKey::new([0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7]),
    CandidateKey::new([0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
    CandidateKey::new([0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5]),
    CandidateKey::new([0x4D, 0x3A, 0x99, 0xC3, 0x51, 0xDD]),
    CandidateKey::new([0x1A, 0x98, 0x2C, 0x7E, 0x45, 0x9A]),
    CandidateKey::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
    CandidateKey::new([0x71, 0x4C, 0x5C, 0x88, 0x6E, 0x97]),
    CandidateKey::new([0x58, 0x7E, 0xE5, 0xF9, 0x35, 0x0F]),
    CandidateKey::new([0xA0, 0x47, 0x8C, 0xC3, 0x90, 0x91]),
    CandidateKey::new([0x53, 0x3C, 0xB6, 0xC7, 0x23, 0xF6]),
    CandidateKey::new([0x8F, 0xD0, 0xA4, 0xF2, 0x56, 0xE9]),
];

/// Ordered, non-empty list of keys to probe each sector with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTable {
    keys: Vec<CandidateKey>,
}

impl Default for KeyTable {
    fn default() -> Self {
        Self {
            keys: DEFAULT_KEYS.to_vec(),
        }
    }
}

impl KeyTable {
    /// Creates a table from an ordered key list
    pub fn new(keys: Vec<CandidateKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::invalid_argument("key table must not be empty"));
        }
        Ok(Self { keys })
    }

    /// Parses a key file: one hex key per line.
    ///
    /// Blank lines and lines starting with `#` are skipped; trailing `#`
    /// comments are stripped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut keys = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let key = CandidateKey::from_hex(line).map_err(|e| {
                Error::invalid_argument(format!("line {}: {}", line_no + 1, e))
            })?;
            keys.push(key);
        }
        Self::new(keys)
    }

    /// Number of keys in the table
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the table holds no keys; never true after construction
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key at `index`
    pub fn get(&self, index: usize) -> Option<&CandidateKey> {
        self.keys.get(index)
    }

    /// Iterate keys in probe order
    pub fn iter(&self) -> std::slice::Iter<'_, CandidateKey> {
        self.keys.iter()
    }
}

impl Index<usize> for KeyTable {
    type Output = CandidateKey;

    fn index(&self, index: usize) -> &CandidateKey {
        &self.keys[index]
    }
}

impl<'a> IntoIterator for &'a KeyTable {
    type Item = &'a CandidateKey;
    type IntoIter = std::slice::Iter<'a, CandidateKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
