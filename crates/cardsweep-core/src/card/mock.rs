//! Scripted card used by scanner and session tests.

use super::{CardFamily, CardHandle};
use crate::keys::CandidateKey;
use bytes::Bytes;
use std::io;

#[derive(Debug, Clone)]
pub(crate) struct MockSector {
    pub(crate) first_block: usize,
    pub(crate) block_count: usize,
    pub(crate) accepts: Vec<CandidateKey>,
}

/// Card whose sectors accept a fixed set of keys and whose blocks contain
/// their own index as text (`"block 3"`).
#[derive(Debug, Clone)]
pub(crate) struct MockCard {
    pub(crate) family: CardFamily,
    pub(crate) sectors: Vec<MockSector>,
    pub(crate) fail_connect: bool,
    pub(crate) fail_auth_at_sector: Option<usize>,
    pub(crate) fail_after_reads: Option<usize>,
    pub(crate) block_data: Option<Vec<u8>>,
    pub(crate) attempts: Vec<(usize, CandidateKey)>,
    pub(crate) reads: Vec<usize>,
    pub(crate) connects: usize,
    pub(crate) closes: usize,
}

impl MockCard {
    /// Contiguous 4-block sectors; `accepts[j]` lists the keys sector `j` takes
    pub(crate) fn new(accepts: Vec<Vec<CandidateKey>>) -> Self {
        let sectors = accepts
            .into_iter()
            .enumerate()
            .map(|(j, accepts)| MockSector {
                first_block: j * 4,
                block_count: 4,
                accepts,
            })
            .collect();
        Self {
            family: CardFamily::MifareClassic,
            sectors,
            fail_connect: false,
            fail_auth_at_sector: None,
            fail_after_reads: None,
            block_data: None,
            attempts: Vec::new(),
            reads: Vec::new(),
            connects: 0,
            closes: 0,
        }
    }

    pub(crate) fn attempts_for(&self, sector: usize) -> Vec<CandidateKey> {
        self.attempts
            .iter()
            .filter(|(s, _)| *s == sector)
            .map(|(_, k)| *k)
            .collect()
    }
}

fn lost() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "tag was lost")
}

impl CardHandle for MockCard {
    fn family(&self) -> CardFamily {
        self.family
    }

    fn connect(&mut self) -> io::Result<()> {
        self.connects += 1;
        if self.fail_connect {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"));
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closes += 1;
        Ok(())
    }

    fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    fn block_count_in_sector(&self, sector: usize) -> usize {
        self.sectors[sector].block_count
    }

    fn sector_to_block(&self, sector: usize) -> usize {
        self.sectors[sector].first_block
    }

    fn authenticate_sector_with_key_a(
        &mut self,
        sector: usize,
        key: &CandidateKey,
    ) -> io::Result<bool> {
        if self.fail_auth_at_sector == Some(sector) {
            return Err(lost());
        }
        self.attempts.push((sector, *key));
        Ok(self.sectors[sector].accepts.contains(key))
    }

    fn read_block(&mut self, block: usize) -> io::Result<Bytes> {
        if self.fail_after_reads == Some(self.reads.len()) {
            return Err(lost());
        }
        self.reads.push(block);
        Ok(match &self.block_data {
            Some(data) => Bytes::copy_from_slice(data),
            None => Bytes::from(format!("block {}", block)),
        })
    }
}
