//! Error types for the cardsweep-core library.
//!
//! All failures are local to a single scan. The variants are grouped into
//! coarse [`ErrorKind`]s so callers can tell a card that never connected
//! apart from one that dropped out mid-scan.

use crate::card::CardFamily;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cardsweep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The card could not be brought into a connected state
    Connection,
    /// The card stopped answering while a scan was running
    Communication,
    /// Malformed hexadecimal input
    InvalidEncoding,
    /// An argument or image violated a documented constraint
    InvalidArgument,
    /// Local file system failure
    Io,
}

/// Comprehensive error type for all cardsweep operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The discovered tag does not belong to the supported card family
    #[error("unsupported card family: {family}")]
    UnsupportedCard {
        /// Family reported by the handle
        family: CardFamily,
    },

    /// The transport connect call failed
    #[error("failed to connect to card: {source}")]
    Connect {
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Authentication attempt failed at the transport level
    #[error("error communicating with card while authenticating sector {sector}: {source}")]
    Authenticate {
        /// Sector being authenticated
        sector: usize,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Block read failed at the transport level
    #[error("error communicating with card while reading block {block}: {source}")]
    ReadBlock {
        /// Absolute block index
        block: usize,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Malformed hexadecimal input
    #[error("invalid hex encoding at offset {offset}: {details}")]
    InvalidEncoding {
        /// Character offset where decoding failed
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// An argument violated a documented constraint
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A card image does not match any known MIFARE Classic geometry
    #[error("invalid card image: {size} bytes does not match a known card layout")]
    InvalidDump {
        /// Size of the rejected image in bytes
        size: usize,
    },

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Creates a new connect error
    pub fn connect(source: std::io::Error) -> Self {
        Self::Connect { source }
    }

    /// Creates a new authentication communication error
    pub fn authenticate(sector: usize, source: std::io::Error) -> Self {
        Self::Authenticate { sector, source }
    }

    /// Creates a new block read communication error
    pub fn read_block(block: usize, source: std::io::Error) -> Self {
        Self::ReadBlock { block, source }
    }

    /// Creates a new encoding error
    pub fn invalid_encoding(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Returns the coarse classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedCard { .. } | Self::Connect { .. } => ErrorKind::Connection,
            Self::Authenticate { .. } | Self::ReadBlock { .. } => ErrorKind::Communication,
            Self::InvalidEncoding { .. } => ErrorKind::InvalidEncoding,
            Self::InvalidArgument(_) | Self::InvalidDump { .. } => ErrorKind::InvalidArgument,
            Self::FileRead { .. } => ErrorKind::Io,
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        match err {
            hex::FromHexError::InvalidHexCharacter { c, index } => {
                Self::invalid_encoding(index, format!("'{}' is not a hex digit", c))
            }
            hex::FromHexError::OddLength => Self::invalid_encoding(0, "odd number of digits"),
            hex::FromHexError::InvalidStringLength => {
                Self::invalid_encoding(0, "unexpected number of digits")
            }
        }
    }
}
