use std::io;

use bytemuck::{Pod, Zeroable};

use crate::error::{ReadError, Result};

use super::{BLOCK_MAGIC, Column, NUM_COLUMNS};

/// Version of the block layout
pub const BLOCK_VERSION: u8 = 1;

/// Header written before the compressed columns of a block
///
/// This is stored identically in memory and on disk.
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct BlockHeader {
    magic: [u8; 3],
    version: u8,
    padding: [u8; 4],

    /// number of records in the block
    pub num_records: u64,

    // compressed length of each column (0 for empty columns)
    pub(crate) z_len: [u64; NUM_COLUMNS],

    // decompressed length of each column in bytes
    pub(crate) u_len: [u64; NUM_COLUMNS],
}
impl BlockHeader {
    #[must_use]
    pub fn new(
        num_records: u64,
        z_len: [u64; NUM_COLUMNS],
        u_len: [u64; NUM_COLUMNS],
    ) -> Self {
        Self {
            magic: *BLOCK_MAGIC,
            version: BLOCK_VERSION,
            padding: [0; 4],
            num_records,
            z_len,
            u_len,
        }
    }

    /// Calculate the length of the compressed block body in bytes.
    #[must_use]
    pub fn block_len(&self) -> usize {
        self.z_len.iter().sum::<u64>() as usize
    }

    /// Returns the compressed length of a column
    #[must_use]
    pub fn z_len(&self, column: Column) -> u64 {
        self.z_len[column as usize]
    }

    /// Returns the decompressed length of a column
    #[must_use]
    pub fn u_len(&self, column: Column) -> u64 {
        self.u_len[column as usize]
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads a block header found at byte `offset` of its file
    pub fn from_bytes(bytes: &[u8], offset: usize) -> Result<Self> {
        if bytes.len() < size_of::<Self>() {
            return Err(ReadError::FileTruncation(offset + bytes.len()).into());
        }
        let header: Self = bytemuck::pod_read_unaligned(&bytes[..size_of::<Self>()]);
        if header.magic != *BLOCK_MAGIC {
            return Err(ReadError::InvalidBlockHeaderMagic(offset).into());
        }
        if header.version != BLOCK_VERSION {
            return Err(ReadError::UnsupportedBlockVersion(header.version).into());
        }
        Ok(header)
    }

    pub fn write<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_block_header_size() {
        assert_eq!(size_of::<BlockHeader>(), 16 + 2 * 8 * NUM_COLUMNS);
    }

    #[test]
    fn test_block_len_sums_columns() {
        let mut z_len = [0; NUM_COLUMNS];
        z_len[Column::Pos as usize] = 10;
        z_len[Column::Qual as usize] = 32;
        let header = BlockHeader::new(4, z_len, [0; NUM_COLUMNS]);
        assert_eq!(header.block_len(), 42);
        assert_eq!(header.z_len(Column::Qual), 32);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let header = BlockHeader::new(7, [3; NUM_COLUMNS], [9; NUM_COLUMNS]);
        let loaded = BlockHeader::from_bytes(header.as_bytes(), 0).unwrap();
        assert_eq!(loaded, header);
    }

    #[test]
    fn test_invalid_magic_reports_offset() {
        let mut bytes = BlockHeader::new(1, [0; NUM_COLUMNS], [0; NUM_COLUMNS])
            .as_bytes()
            .to_vec();
        bytes[0] = 0;
        assert!(matches!(
            BlockHeader::from_bytes(&bytes, 64),
            Err(Error::ReadError(ReadError::InvalidBlockHeaderMagic(64)))
        ));
        assert!(matches!(
            BlockHeader::from_bytes(&bytes[..10], 64),
            Err(Error::ReadError(ReadError::FileTruncation(74)))
        ));
    }
}
