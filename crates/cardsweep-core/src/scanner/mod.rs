//! Sector scanning: key search and block extraction.
//!
//! ## Algorithm Overview
//!
//! 1. Walk every sector of a connected card in index order
//! 2. Probe the sector with the [`KeyTable`] until one key authenticates
//! 3. Read every block of an authenticated sector, yielding one
//!    [`ScanResult`] per block
//! 4. Skip sectors no key opens; they are expected on most cards
//!
//! [`SectorScan`] is a lazy iterator over the results. It stops for good
//! after the first communication error, so everything it yielded before
//! that point remains valid.
//!
//! ```no_run
//! use cardsweep_core::{DumpCard, KeyTable, SectorScanner, CardHandle};
//!
//! let mut card = DumpCard::load("card.mfd")?;
//! card.connect()?;
//!
//! let scanner = SectorScanner::new(KeyTable::default());
//! for result in scanner.scan(&mut card) {
//!     let result = result?;
//!     println!("{} {}", result.block, result.text());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod probe;

use crate::card::CardHandle;
use crate::codec::bytes_to_hex;
use crate::error::{Error, Result};
use crate::keys::{CandidateKey, KeyTable};
use bytes::Bytes;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use probe::KeyOrder;
use probe::KeyProbe;

/// One block read from an authenticated sector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Sector the block belongs to
    pub sector: usize,
    /// Absolute block index
    pub block: usize,
    /// Position of the authenticating key in the key table
    pub key_index: usize,
    /// The authenticating key
    pub key: CandidateKey,
    /// Raw block contents
    pub data: Bytes,
}

impl ScanResult {
    /// Returns the data as a slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Block contents decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Whether the block contents are valid UTF-8
    pub fn is_valid_text(&self) -> bool {
        std::str::from_utf8(&self.data).is_ok()
    }

    /// Block contents as uppercase hex
    pub fn data_hex(&self) -> String {
        bytes_to_hex(&self.data)
    }
}

/// Counters collected while scanning one card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Sectors the scanner started probing
    pub sectors_visited: usize,
    /// Sectors some key opened
    pub sectors_authenticated: usize,
    /// Authentication commands sent
    pub auth_attempts: usize,
    /// Blocks read successfully
    pub blocks_read: usize,
}

/// Shared flag that stops a running scan before its next sector
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a lowered flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been raised
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration for the scanner
#[derive(Debug, Clone, Default)]
pub struct ScannerConfig {
    /// Key probe order
    pub key_order: KeyOrder,
    /// Optional cancellation flag checked between sectors
    pub cancel: Option<CancelFlag>,
}

impl ScannerConfig {
    /// Creates a new scanner config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key probe order
    pub fn key_order(mut self, order: KeyOrder) -> Self {
        self.key_order = order;
        self
    }

    /// Sets the cancellation flag
    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }
}

/// Scanner holding the key table and probe configuration
#[derive(Debug, Clone, Default)]
pub struct SectorScanner {
    keys: KeyTable,
    config: ScannerConfig,
}

impl SectorScanner {
    /// Creates a scanner with default configuration
    pub fn new(keys: KeyTable) -> Self {
        Self {
            keys,
            config: ScannerConfig::default(),
        }
    }

    /// Creates a scanner with custom configuration
    pub fn with_config(keys: KeyTable, config: ScannerConfig) -> Self {
        Self { keys, config }
    }

    /// The key table probed for each sector
    pub fn keys(&self) -> &KeyTable {
        &self.keys
    }

    /// The scanner configuration
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Start a lazy scan of a connected card
    pub fn scan<'a, H>(&'a self, card: &'a mut H) -> SectorScan<'a, H>
    where
        H: CardHandle + ?Sized,
    {
        let sector_count = card.sector_count();
        debug!("Starting scan of {} sectors", sector_count);
        SectorScan {
            scanner: self,
            card,
            probe: KeyProbe::new(self.config.key_order),
            sector_count,
            next_sector: 0,
            open: None,
            finished: false,
            cancelled: false,
            stats: ScanStats::default(),
        }
    }

    /// Scan a connected card to the end, failing on the first error
    pub fn scan_all<H>(&self, card: &mut H) -> Result<Vec<ScanResult>>
    where
        H: CardHandle + ?Sized,
    {
        self.scan(card).collect()
    }
}

/// Authenticated sector whose blocks are being read
#[derive(Debug, Clone, Copy)]
struct OpenSector {
    sector: usize,
    key_index: usize,
    next_block: usize,
    end_block: usize,
}

/// Lazy scan over one card.
///
/// Yields `Ok` for every block read and at most one `Err`, after which the
/// iterator is exhausted.
pub struct SectorScan<'a, H: CardHandle + ?Sized> {
    scanner: &'a SectorScanner,
    card: &'a mut H,
    probe: KeyProbe,
    sector_count: usize,
    next_sector: usize,
    open: Option<OpenSector>,
    finished: bool,
    cancelled: bool,
    stats: ScanStats,
}

impl<'a, H: CardHandle + ?Sized> SectorScan<'a, H> {
    /// Counters so far
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Whether the scan ended because the cancellation flag was raised
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn read_next(&mut self, open: OpenSector) -> Result<ScanResult> {
        let block = open.next_block;
        let data = self
            .card
            .read_block(block)
            .map_err(|e| Error::read_block(block, e))?;
        self.stats.blocks_read += 1;

        // `find_key` only returns indices inside the table
        let key = self.scanner.keys[open.key_index];
        info!("Sector: {} Block: {} Key: {}", open.sector, block, key);

        let result = ScanResult {
            sector: open.sector,
            block,
            key_index: open.key_index,
            key,
            data,
        };
        if result.is_valid_text() {
            info!("Data: {}", result.text());
        } else {
            warn!(
                "Block {} is not valid UTF-8, decoded best-effort: {}",
                block,
                result.text()
            );
        }
        Ok(result)
    }

    fn open_next_sector(&mut self) -> Result<Option<OpenSector>> {
        let sector = self.next_sector;
        self.next_sector += 1;
        self.stats.sectors_visited += 1;

        let found = self
            .probe
            .find_key(&mut *self.card, sector, &self.scanner.keys, &mut self.stats)?;
        let Some(key_index) = found else {
            debug!("Sector {}: no candidate key accepted", sector);
            return Ok(None);
        };

        self.stats.sectors_authenticated += 1;
        let block_count = self.card.block_count_in_sector(sector);
        let start = self.card.sector_to_block(sector);
        debug!(
            "Sector {}: authenticated with key #{}, blocks {}..{}",
            sector,
            key_index,
            start,
            start + block_count
        );
        Ok(Some(OpenSector {
            sector,
            key_index,
            next_block: start,
            end_block: start + block_count,
        }))
    }
}

impl<'a, H: CardHandle + ?Sized> Iterator for SectorScan<'a, H> {
    type Item = Result<ScanResult>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(open) = self.open {
                if open.next_block < open.end_block {
                    let item = self.read_next(open);
                    match &item {
                        Ok(_) => {
                            self.open = Some(OpenSector {
                                next_block: open.next_block + 1,
                                ..open
                            });
                        }
                        Err(_) => self.finished = true,
                    }
                    return Some(item);
                }
                self.open = None;
            }

            if self.next_sector >= self.sector_count {
                debug!(
                    "Scan complete: {} of {} sectors authenticated, {} blocks read",
                    self.stats.sectors_authenticated, self.sector_count, self.stats.blocks_read
                );
                self.finished = true;
                return None;
            }

            if let Some(cancel) = &self.scanner.config.cancel {
                if cancel.is_cancelled() {
                    debug!("Scan cancelled before sector {}", self.next_sector);
                    self.cancelled = true;
                    self.finished = true;
                    return None;
                }
            }

            match self.open_next_sector() {
                Ok(open) => self.open = open,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<'a, H: CardHandle + ?Sized> std::iter::FusedIterator for SectorScan<'a, H> {}
