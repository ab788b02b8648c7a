//! # cardsweep-core
//!
//! A library for scanning MIFARE Classic cards against a table of
//! well-known default keys.
//!
//! This crate provides the core functionality for:
//! - Probing each sector of a card with candidate keys
//! - Reading every block of the sectors a key opens
//! - Building ISO 7816-4 SELECT-by-AID command frames
//! - Hex encoding helpers used throughout
//!
//! The scan is best-effort and offers no security guarantees: the default
//! key table is public knowledge.
//!
//! ## Architecture
//!
//! - [`codec`]: Hex conversion
//! - [`apdu`]: SELECT command frames and responses
//! - [`keys`]: Candidate keys and key tables
//! - [`card`]: The [`CardHandle`] trait, Classic geometry, image-backed cards
//! - [`scanner`]: Sector key search and block extraction
//! - [`session`]: Connect/scan/release orchestration and report sinks
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use cardsweep_core::{CardReader, CollectingSink, DumpCard, KeyTable, SinkRef};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(CollectingSink::new());
//! let reader = CardReader::new(KeyTable::default()).sink(SinkRef::new(&sink));
//!
//! let mut card = DumpCard::load("card.mfd")?;
//! let report = reader.on_card_discovered(&mut card);
//!
//! for result in report.results() {
//!     println!("sector {} block {}: {}", result.sector, result.block, result.text());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod apdu;
pub mod card;
pub mod codec;
pub mod error;
pub mod keys;
pub mod scanner;
pub mod session;

// Re-export primary types for convenience
pub use apdu::{build_select_apdu, SelectResponse, SAMPLE_LOYALTY_AID, SELECT_OK_SW};
pub use card::{CardFamily, CardHandle, ClassicLayout, DumpCard};
pub use codec::{bytes_to_hex, hex_to_bytes};
pub use error::{Error, ErrorKind, Result};
pub use keys::{CandidateKey, KeyTable, DEFAULT_KEYS};
pub use scanner::{
    CancelFlag, KeyOrder, ScanResult, ScanStats, ScannerConfig, SectorScan, SectorScanner,
};
pub use session::{
    CardReader, CollectingSink, NullSink, ReportSink, SessionReport, SessionState, SinkRef,
};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
