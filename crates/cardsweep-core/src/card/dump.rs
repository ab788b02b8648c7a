//! A card backed by a raw memory image.
//!
//! Images use the common `.mfd` layout: every block in order, 16 bytes
//! each, trailers included. Authentication compares the candidate with the
//! key A stored in the sector trailer, and reads are only allowed inside the
//! sector most recently authenticated, as on a real card. Trailer reads
//! return key A as zeros, the way the card hides it.

use super::layout::{ClassicLayout, BLOCK_SIZE};
use super::{CardFamily, CardHandle};
use crate::error::{Error, Result};
use crate::keys::{CandidateKey, KEY_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use std::path::Path;
use tracing::trace;

/// MIFARE Classic card emulated from a memory image
#[derive(Debug, Clone)]
pub struct DumpCard {
    layout: ClassicLayout,
    image: Bytes,
    connected: bool,
    authenticated: Option<usize>,
}

impl DumpCard {
    /// Creates a card from a raw image
    pub fn from_bytes(image: impl Into<Bytes>) -> Result<Self> {
        let image = image.into();
        let layout = ClassicLayout::from_image_len(image.len())?;
        Ok(Self {
            layout,
            image,
            connected: false,
            authenticated: None,
        })
    }

    /// Loads a card image from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_bytes(data)
    }

    /// Layout detected from the image size
    pub fn layout(&self) -> ClassicLayout {
        self.layout
    }

    /// Whether the card is currently connected
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn block(&self, block: usize) -> &[u8] {
        let start = block * BLOCK_SIZE;
        &self.image[start..start + BLOCK_SIZE]
    }

    fn key_a(&self, sector: usize) -> &[u8] {
        &self.block(self.layout.trailer_block(sector))[..KEY_LEN]
    }

    fn ensure_connected(&self) -> io::Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotConnected, "card is not connected"))
        }
    }
}

impl CardHandle for DumpCard {
    fn family(&self) -> CardFamily {
        CardFamily::MifareClassic
    }

    fn connect(&mut self) -> io::Result<()> {
        self.connected = true;
        self.authenticated = None;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.connected = false;
        self.authenticated = None;
        Ok(())
    }

    fn sector_count(&self) -> usize {
        self.layout.sector_count()
    }

    fn block_count_in_sector(&self, sector: usize) -> usize {
        self.layout.block_count_in_sector(sector)
    }

    fn sector_to_block(&self, sector: usize) -> usize {
        self.layout.sector_to_block(sector)
    }

    fn authenticate_sector_with_key_a(
        &mut self,
        sector: usize,
        key: &CandidateKey,
    ) -> io::Result<bool> {
        self.ensure_connected()?;
        if sector >= self.layout.sector_count() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector {} out of range", sector),
            ));
        }

        let matched = self.key_a(sector) == key.as_bytes();
        trace!("Sector {} key {} matched: {}", sector, key, matched);
        self.authenticated = matched.then_some(sector);
        Ok(matched)
    }

    fn read_block(&mut self, block: usize) -> io::Result<Bytes> {
        self.ensure_connected()?;
        let sector = self.layout.block_to_sector(block).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block {} out of range", block),
            )
        })?;
        if self.authenticated != Some(sector) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("sector {} is not authenticated", sector),
            ));
        }

        let start = block * BLOCK_SIZE;
        let data = self.image.slice(start..start + BLOCK_SIZE);
        if block != self.layout.trailer_block(sector) {
            return Ok(data);
        }

        let mut trailer = BytesMut::with_capacity(BLOCK_SIZE);
        trailer.put_bytes(0, KEY_LEN);
        trailer.put_slice(&data[KEY_LEN..]);
        Ok(trailer.freeze())
    }
}
