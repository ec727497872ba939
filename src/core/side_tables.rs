use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use log::debug;
use zstd::stream::{copy_decode, copy_encode};

use crate::error::{IndexError, Result};
use crate::position::PositionIndex;
use crate::refs::References;

use super::{Index, SIDE_TABLE_VERSION};

/// The tables written after the last block
///
/// Every table is encoded field by field behind a schema version byte, and
/// the whole payload is zstd-compressed.
#[derive(Debug, Clone, Default)]
pub struct SideTables {
    /// Block offsets and cumulative record counts
    pub index: Index,

    /// RNAME and RNEXT tables
    pub refs: References,

    /// Sparse `(refid, pos)` to row index
    pub positions: PositionIndex,
}
impl SideTables {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(SIDE_TABLE_VERSION)?;
        self.index.write_to(writer)?;
        self.refs.write_to(writer)?;
        self.positions.write_to(writer)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let version = reader.read_u8()?;
        if version != SIDE_TABLE_VERSION {
            return Err(IndexError::UnsupportedVersion(version).into());
        }
        let index = Index::read_from(reader)?;
        let refs = References::read_from(reader)?;
        let positions = PositionIndex::read_from(reader)?;
        Ok(Self {
            index,
            refs,
            positions,
        })
    }

    /// Encodes the tables into a ZSTD-compressed byte array
    ///
    /// Returns the uncompressed size together with the compressed bytes.
    pub fn encoded(&self, level: i32) -> Result<(u64, Vec<u8>)> {
        let mut raw = Vec::new();
        self.write_to(&mut raw)?;
        let mut encoded = Vec::new();
        copy_encode(raw.as_slice(), &mut encoded, level)?;
        debug!(
            "Encoded side tables: {} blocks, {} references, {} index entries ({} -> {} bytes)",
            self.index.num_blocks(),
            self.refs.rname.len(),
            self.positions.len(),
            raw.len(),
            encoded.len()
        );
        Ok((raw.len() as u64, encoded))
    }

    /// Decodes tables produced by [`encoded`](Self::encoded)
    pub fn decoded(bytes: &[u8], u_bytes: u64) -> Result<Self> {
        let mut raw = Vec::new();
        copy_decode(bytes, &mut raw)?;
        if raw.len() as u64 != u_bytes {
            return Err(IndexError::ByteSizeMismatch(raw.len() as u64, u_bytes).into());
        }
        Self::read_from(&mut raw.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BlockHeader, NUM_COLUMNS};
    use crate::Error;

    fn sample_tables() -> SideTables {
        let mut refs = References::new();
        refs.rname.intern("chr1");
        refs.rname.intern("chr2");
        refs.rnext.intern("chr2");

        let mut positions = PositionIndex::new();
        positions.add(0, 99, 0);
        positions.add(1, 9, 3);

        let headers = [BlockHeader::new(5, [4; NUM_COLUMNS], [8; NUM_COLUMNS])];
        SideTables {
            index: Index::from_block_headers(&headers),
            refs,
            positions,
        }
    }

    #[test]
    fn test_encode_decode() {
        let tables = sample_tables();
        let (u_bytes, z_bytes) = tables.encoded(0).unwrap();
        let loaded = SideTables::decoded(&z_bytes, u_bytes).unwrap();
        assert_eq!(loaded.index, tables.index);
        assert_eq!(loaded.positions, tables.positions);
        assert_eq!(loaded.refs.rname.name_of(1).unwrap(), "chr2");
        assert_eq!(loaded.refs.rnext.len(), 1);
    }

    #[test]
    fn test_size_mismatch() {
        let (u_bytes, z_bytes) = sample_tables().encoded(0).unwrap();
        assert!(matches!(
            SideTables::decoded(&z_bytes, u_bytes + 1),
            Err(Error::IndexError(IndexError::ByteSizeMismatch(_, _)))
        ));
    }

    #[test]
    fn test_unknown_version() {
        let mut raw = Vec::new();
        sample_tables().write_to(&mut raw).unwrap();
        raw[0] = SIDE_TABLE_VERSION + 1;
        assert!(matches!(
            SideTables::read_from(&mut raw.as_slice()),
            Err(Error::IndexError(IndexError::UnsupportedVersion(_)))
        ));
    }
}
