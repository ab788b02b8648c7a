//! MIFARE Classic memory geometry.
//!
//! The first 32 sectors hold 4 blocks each; sectors from 32 upwards (4K
//! cards only) hold 16. Every block is 16 bytes and the last block of a
//! sector is its trailer, carrying key A in bytes 0..6 and key B in 10..16.

use crate::error::{Error, Result};

/// Size of one block in bytes
pub const BLOCK_SIZE: usize = 16;

const SMALL_SECTOR_BLOCKS: usize = 4;
const LARGE_SECTOR_BLOCKS: usize = 16;
const SMALL_SECTOR_COUNT: usize = 32;

/// Known MIFARE Classic capacities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassicLayout {
    /// 320 bytes, 5 sectors
    Mini,
    /// 1024 bytes, 16 sectors
    OneK,
    /// 2048 bytes, 32 sectors
    TwoK,
    /// 4096 bytes, 40 sectors
    FourK,
}

impl ClassicLayout {
    /// Identify the layout matching a raw image of `len` bytes
    pub fn from_image_len(len: usize) -> Result<Self> {
        match len {
            320 => Ok(Self::Mini),
            1024 => Ok(Self::OneK),
            2048 => Ok(Self::TwoK),
            4096 => Ok(Self::FourK),
            size => Err(Error::InvalidDump { size }),
        }
    }

    /// Number of sectors
    pub const fn sector_count(self) -> usize {
        match self {
            Self::Mini => 5,
            Self::OneK => 16,
            Self::TwoK => 32,
            Self::FourK => 40,
        }
    }

    /// Total capacity in bytes
    pub const fn size(self) -> usize {
        self.block_count() * BLOCK_SIZE
    }

    /// Total number of blocks
    pub const fn block_count(self) -> usize {
        let sectors = self.sector_count();
        if sectors <= SMALL_SECTOR_COUNT {
            sectors * SMALL_SECTOR_BLOCKS
        } else {
            SMALL_SECTOR_COUNT * SMALL_SECTOR_BLOCKS
                + (sectors - SMALL_SECTOR_COUNT) * LARGE_SECTOR_BLOCKS
        }
    }

    /// Blocks in `sector`
    pub const fn block_count_in_sector(self, sector: usize) -> usize {
        if sector < SMALL_SECTOR_COUNT {
            SMALL_SECTOR_BLOCKS
        } else {
            LARGE_SECTOR_BLOCKS
        }
    }

    /// First block of `sector`
    pub const fn sector_to_block(self, sector: usize) -> usize {
        if sector < SMALL_SECTOR_COUNT {
            sector * SMALL_SECTOR_BLOCKS
        } else {
            SMALL_SECTOR_COUNT * SMALL_SECTOR_BLOCKS
                + (sector - SMALL_SECTOR_COUNT) * LARGE_SECTOR_BLOCKS
        }
    }

    /// Sector containing `block`, if the block exists
    pub fn block_to_sector(self, block: usize) -> Option<usize> {
        if block >= self.block_count() {
            return None;
        }
        let small_blocks = SMALL_SECTOR_COUNT * SMALL_SECTOR_BLOCKS;
        if block < small_blocks {
            Some(block / SMALL_SECTOR_BLOCKS)
        } else {
            Some(SMALL_SECTOR_COUNT + (block - small_blocks) / LARGE_SECTOR_BLOCKS)
        }
    }

    /// Absolute index of the trailer block of `sector`
    pub const fn trailer_block(self, sector: usize) -> usize {
        self.sector_to_block(sector) + self.block_count_in_sector(sector) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(ClassicLayout::Mini.size(), 320);
        assert_eq!(ClassicLayout::OneK.size(), 1024);
        assert_eq!(ClassicLayout::TwoK.size(), 2048);
        assert_eq!(ClassicLayout::FourK.size(), 4096);
    }

    #[test]
    fn test_from_image_len() {
        assert_eq!(
            ClassicLayout::from_image_len(1024).unwrap(),
            ClassicLayout::OneK
        );
        assert!(matches!(
            ClassicLayout::from_image_len(1000),
            Err(Error::InvalidDump { size: 1000 })
        ));
    }

    #[test]
    fn test_four_k_geometry() {
        let layout = ClassicLayout::FourK;
        assert_eq!(layout.block_count_in_sector(31), 4);
        assert_eq!(layout.sector_to_block(31), 124);
        assert_eq!(layout.block_count_in_sector(32), 16);
        assert_eq!(layout.sector_to_block(32), 128);
        assert_eq!(layout.sector_to_block(39), 240);
        assert_eq!(layout.trailer_block(39), 255);
    }

    #[test]
    fn test_block_to_sector() {
        let layout = ClassicLayout::FourK;
        assert_eq!(layout.block_to_sector(0), Some(0));
        assert_eq!(layout.block_to_sector(127), Some(31));
        assert_eq!(layout.block_to_sector(128), Some(32));
        assert_eq!(layout.block_to_sector(255), Some(39));
        assert_eq!(layout.block_to_sector(256), None);
        assert_eq!(ClassicLayout::OneK.block_to_sector(64), None);
    }
}
