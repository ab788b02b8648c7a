//! Card handle abstraction.
//!
//! A [`CardHandle`] is the capability a discovered tag exposes to the
//! scanner: sector geometry, per-sector key A authentication and block
//! reads. Transport-level failures surface as [`std::io::Error`]; the
//! session turns them into typed [`crate::Error`]s.

mod dump;
mod layout;
#[cfg(test)]
pub(crate) mod mock;

use bytes::Bytes;
use std::fmt;
use std::io;

use crate::keys::CandidateKey;

pub use dump::DumpCard;
pub use layout::{ClassicLayout, BLOCK_SIZE};

/// Technology family a discovered tag belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFamily {
    /// MIFARE Classic (sector/block memory with key authentication)
    MifareClassic,
    /// ISO 14443-4 (ISO-DEP) application card
    IsoDep,
    /// Anything else
    Other,
}

impl fmt::Display for CardFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MifareClassic => "MIFARE Classic",
            Self::IsoDep => "ISO-DEP",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Operations a sector-addressed card exposes while it is in range.
///
/// Implementations block until the card answers or the transport gives up;
/// no timeout or retry is layered on top.
pub trait CardHandle {
    /// Technology family of this card
    fn family(&self) -> CardFamily;

    /// Open the connection to the card
    fn connect(&mut self) -> io::Result<()>;

    /// Release the connection. Called exactly once per session.
    fn close(&mut self) -> io::Result<()>;

    /// Number of sectors on the card
    fn sector_count(&self) -> usize;

    /// Number of blocks in `sector`
    fn block_count_in_sector(&self, sector: usize) -> usize;

    /// Absolute index of the first block of `sector`
    fn sector_to_block(&self, sector: usize) -> usize;

    /// Authenticate `sector` with `key` as key A.
    ///
    /// `Ok(false)` means the card rejected the key; `Err` means the card
    /// could not be reached.
    fn authenticate_sector_with_key_a(
        &mut self,
        sector: usize,
        key: &CandidateKey,
    ) -> io::Result<bool>;

    /// Read one block by absolute index
    fn read_block(&mut self, block: usize) -> io::Result<Bytes>;
}
