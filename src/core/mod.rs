//! On-disk columnar format
//!
//! ```text
//! FileHeader (64 B)
//! [BlockHeader][column 0]..[column 16]   repeated per block
//! IndexHeader
//! zstd(side tables)
//! IndexFooter
//! ```

mod block;
mod block_header;
mod header;
mod index;
mod side_tables;
pub(crate) mod utils;

pub use block::ColumnarBlock;
pub use block_header::BlockHeader;
pub use header::{FileHeader, FileHeaderBuilder, PRESENCE_SORT_CHECKED};
pub use index::{BlockRange, Index, IndexFooter, IndexHeader};
pub use side_tables::SideTables;

use super::{
    BLOCK_MAGIC, DEFAULT_BLOCK_SIZE, DEFAULT_COMPRESSION_LEVEL, DEFAULT_INDEX_INTERVAL,
    FILE_MAGIC, FILE_VERSION, INDEX_MAGIC, SIDE_TABLE_VERSION,
};
use crate::store::Projection;

/// Number of columns stored per block
pub const NUM_COLUMNS: usize = 17;

/// The columns of a block in on-disk order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    QnameLen = 0,
    Qname,
    Flag,
    RefId,
    Pos,
    Mapq,
    CigarLen,
    Cigar,
    RefNext,
    PNext,
    TLen,
    SeqLen,
    Seq,
    Qual,
    OptCount,
    OptLen,
    Opt,
}
impl Column {
    pub const ALL: [Self; NUM_COLUMNS] = [
        Self::QnameLen,
        Self::Qname,
        Self::Flag,
        Self::RefId,
        Self::Pos,
        Self::Mapq,
        Self::CigarLen,
        Self::Cigar,
        Self::RefNext,
        Self::PNext,
        Self::TLen,
        Self::SeqLen,
        Self::Seq,
        Self::Qual,
        Self::OptCount,
        Self::OptLen,
        Self::Opt,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::QnameLen => "qname_len",
            Self::Qname => "qname",
            Self::Flag => "flag",
            Self::RefId => "refid",
            Self::Pos => "pos",
            Self::Mapq => "mapq",
            Self::CigarLen => "cigar_len",
            Self::Cigar => "cigar",
            Self::RefNext => "refnext",
            Self::PNext => "pnext",
            Self::TLen => "tlen",
            Self::SeqLen => "seq_len",
            Self::Seq => "seq",
            Self::Qual => "qual",
            Self::OptCount => "opt_count",
            Self::OptLen => "opt_len",
            Self::Opt => "opt",
        }
    }

    /// Checks if the column must be decoded to populate a projection
    #[must_use]
    pub fn is_needed(self, projection: Projection) -> bool {
        match self {
            Self::QnameLen | Self::Qname => projection.contains(Projection::QNAME),
            Self::Flag => projection.contains(Projection::FLAG),
            Self::RefId => projection.contains(Projection::REFID),
            Self::Pos => projection.contains(Projection::POS),
            Self::Mapq => projection.contains(Projection::MAPQ),
            Self::CigarLen | Self::Cigar => projection.contains(Projection::CIGAR),
            Self::RefNext => projection.contains(Projection::REFNEXT),
            Self::PNext => projection.contains(Projection::PNEXT),
            Self::TLen => projection.contains(Projection::TLEN),
            Self::SeqLen => projection.needs_seq_len(),
            Self::Seq => projection.contains(Projection::SEQ),
            Self::Qual => projection.contains(Projection::QUAL),
            Self::OptCount | Self::OptLen | Self::Opt => projection.contains(Projection::OPT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_order_matches_discriminants() {
        for (idx, column) in Column::ALL.iter().enumerate() {
            assert_eq!(*column as usize, idx);
        }
    }

    #[test]
    fn test_location_needs_three_columns() {
        let needed: Vec<_> = Column::ALL
            .into_iter()
            .filter(|column| column.is_needed(Projection::LOCATION))
            .collect();
        assert_eq!(needed, [Column::RefId, Column::Pos, Column::SeqLen]);
        assert!(Column::ALL
            .into_iter()
            .all(|column| column.is_needed(Projection::ALL)));
    }

    #[test]
    fn test_quality_needs_sequence_length() {
        assert!(Column::SeqLen.is_needed(Projection::QUAL));
        assert!(!Column::Seq.is_needed(Projection::QUAL));
    }
}
