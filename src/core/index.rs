use std::io::{Read, Write};

use bytemuck::{Pod, Zeroable};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{HeaderError, IndexError, Result};

use super::{BlockHeader, FileHeader, INDEX_MAGIC};

/// The header of the compressed side tables.
///
/// This is stored identically in memory and on disk.
#[derive(Debug, Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct IndexHeader {
    /// Magic number identifying the trailer
    magic: [u8; 8],

    /// Number of bytes in the uncompressed side tables
    pub(crate) u_bytes: u64,

    /// Number of bytes in the compressed side tables
    pub(crate) z_bytes: u64,
}
impl IndexHeader {
    #[must_use]
    pub fn new(u_bytes: u64, z_bytes: u64) -> Self {
        Self {
            magic: *INDEX_MAGIC,
            u_bytes,
            z_bytes,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != size_of::<Self>() {
            return Err(HeaderError::InvalidSize(bytes.len(), size_of::<Self>()).into());
        }
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        if header.magic != *INDEX_MAGIC {
            return Err(IndexError::InvalidIndexHeaderMagic.into());
        }
        Ok(header)
    }
}

/// The footer closing every file.
///
/// This is stored identically in memory and on disk.
#[derive(Debug, Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct IndexFooter {
    /// Number of bytes in the compressed side tables
    pub(crate) bytes: u64,

    /// Magic number identifying the trailer
    magic: [u8; 8],
}
impl IndexFooter {
    #[must_use]
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes,
            magic: *INDEX_MAGIC,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != size_of::<Self>() {
            return Err(HeaderError::InvalidSize(bytes.len(), size_of::<Self>()).into());
        }
        let footer: Self = bytemuck::pod_read_unaligned(bytes);
        if footer.magic != *INDEX_MAGIC {
            return Err(IndexError::InvalidIndexFooterMagic.into());
        }
        Ok(footer)
    }
}

/// An index of block ranges for row lookups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    ranges: Vec<BlockRange>,
}
impl Index {
    /// Builds the index from a list of block headers
    #[must_use]
    pub fn from_block_headers(block_headers: &[BlockHeader]) -> Self {
        let mut offset = size_of::<FileHeader>() as u64;
        let mut cumulative_records = 0;
        let mut ranges = Vec::with_capacity(block_headers.len());
        for block_header in block_headers {
            cumulative_records += block_header.num_records;
            ranges.push(BlockRange::new(offset, cumulative_records));
            offset += (size_of::<BlockHeader>() + block_header.block_len()) as u64;
        }
        Self { ranges }
    }

    /// Returns the number of records in the index
    #[must_use]
    pub fn num_records(&self) -> u64 {
        self.ranges
            .last()
            .map_or(0, |range| range.cumulative_records)
    }

    /// Returns the number of blocks in the index
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.ranges.len()
    }

    pub fn iter_blocks(&self) -> impl Iterator<Item = BlockRange> + '_ {
        self.ranges.iter().copied()
    }

    /// Finds the block holding a row
    ///
    /// Returns the block number, its range, and the row of its first record.
    #[must_use]
    pub fn locate(&self, row: u64) -> Option<(usize, BlockRange, u64)> {
        let block_idx = self
            .ranges
            .partition_point(|range| range.cumulative_records <= row);
        let range = *self.ranges.get(block_idx)?;
        let first_row = block_idx
            .checked_sub(1)
            .map_or(0, |prev| self.ranges[prev].cumulative_records);
        Some((block_idx, range, first_row))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.ranges.len() as u64)?;
        for range in &self.ranges {
            writer.write_u64::<LittleEndian>(range.offset)?;
            writer.write_u64::<LittleEndian>(range.cumulative_records)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let num_blocks = reader.read_u64::<LittleEndian>()?;
        let mut ranges = Vec::new();
        for _ in 0..num_blocks {
            let offset = reader.read_u64::<LittleEndian>()?;
            let cumulative_records = reader.read_u64::<LittleEndian>()?;
            ranges.push(BlockRange::new(offset, cumulative_records));
        }
        Ok(Self { ranges })
    }
}

/// The location of a block and the number of records up to and including it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BlockRange {
    /// Byte offset of this block
    pub(crate) offset: u64,

    /// Number of records up to and including this block
    pub(crate) cumulative_records: u64,
}
impl BlockRange {
    #[must_use]
    pub fn new(offset: u64, cumulative_records: u64) -> Self {
        Self {
            offset,
            cumulative_records,
        }
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn cumulative_records(&self) -> u64 {
        self.cumulative_records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NUM_COLUMNS;

    fn sample_index() -> Index {
        let headers = [
            BlockHeader::new(3, [10; NUM_COLUMNS], [0; NUM_COLUMNS]),
            BlockHeader::new(2, [5; NUM_COLUMNS], [0; NUM_COLUMNS]),
            BlockHeader::new(4, [1; NUM_COLUMNS], [0; NUM_COLUMNS]),
        ];
        Index::from_block_headers(&headers)
    }

    #[test]
    fn test_from_block_headers() {
        let index = sample_index();
        let ranges: Vec<_> = index.iter_blocks().collect();
        let block_bytes = size_of::<BlockHeader>() as u64;
        assert_eq!(ranges[0], BlockRange::new(64, 3));
        assert_eq!(ranges[1], BlockRange::new(64 + block_bytes + 170, 5));
        assert_eq!(
            ranges[2],
            BlockRange::new(64 + 2 * block_bytes + 170 + 85, 9)
        );
        assert_eq!(index.num_records(), 9);
    }

    #[test]
    fn test_locate() {
        let index = sample_index();
        assert_eq!(index.locate(0).map(|(idx, _, first)| (idx, first)), Some((0, 0)));
        assert_eq!(index.locate(2).map(|(idx, _, first)| (idx, first)), Some((0, 0)));
        assert_eq!(index.locate(3).map(|(idx, _, first)| (idx, first)), Some((1, 3)));
        assert_eq!(index.locate(8).map(|(idx, _, first)| (idx, first)), Some((2, 5)));
        assert_eq!(index.locate(9), None);
        assert_eq!(Index::default().locate(0), None);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let index = sample_index();
        let mut buffer = Vec::new();
        index.write_to(&mut buffer).unwrap();
        let loaded = Index::read_from(&mut buffer.as_slice()).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_trailer_magic() {
        let header = IndexHeader::new(10, 5);
        assert!(IndexHeader::from_bytes(header.as_bytes()).is_ok());
        assert!(IndexFooter::from_bytes(header.as_bytes()).is_err());
        assert!(IndexFooter::from_bytes(&header.as_bytes()[..16]).is_err());
        let footer = IndexFooter::new(5);
        assert_eq!(IndexFooter::from_bytes(footer.as_bytes()).unwrap().bytes, 5);
    }
}
