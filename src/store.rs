//! Row-store contract
//!
//! Records are addressed by their 0-based row ordinal in append order.
//! Readers ask for a [`Projection`] of the fields they need so that
//! columnar stores only decode the columns covering them.

use std::ops::{BitOr, BitOrAssign};

use auto_impl::auto_impl;

use crate::error::{ReadError, Result};
use crate::record::AlignmentRecord;

/// A set of record fields to populate on retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Projection(u32);
impl Projection {
    pub const NONE: Self = Self(0);
    pub const QNAME: Self = Self(1 << 0);
    pub const FLAG: Self = Self(1 << 1);
    pub const REFID: Self = Self(1 << 2);
    pub const POS: Self = Self(1 << 3);
    pub const MAPQ: Self = Self(1 << 4);
    pub const CIGAR: Self = Self(1 << 5);
    pub const REFNEXT: Self = Self(1 << 6);
    pub const PNEXT: Self = Self(1 << 7);
    pub const TLEN: Self = Self(1 << 8);
    pub const SEQ_LEN: Self = Self(1 << 9);
    pub const SEQ: Self = Self(1 << 10);
    pub const QUAL: Self = Self(1 << 11);
    pub const OPT: Self = Self(1 << 12);

    /// Every field
    pub const ALL: Self = Self((1 << 13) - 1);

    /// The fields needed to place a record on a reference
    pub const LOCATION: Self = Self(Self::REFID.0 | Self::POS.0 | Self::SEQ_LEN.0);

    /// Checks if every field of `other` is in this projection
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Checks if the sequence length must be loaded
    ///
    /// Sequence and quality bytes cannot be sliced without it.
    #[must_use]
    pub const fn needs_seq_len(self) -> bool {
        self.0 & (Self::SEQ_LEN.0 | Self::SEQ.0 | Self::QUAL.0) != 0
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}
impl Default for Projection {
    fn default() -> Self {
        Self::ALL
    }
}
impl BitOr for Projection {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}
impl BitOrAssign for Projection {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// Random access to stored records by row ordinal
#[auto_impl(&mut, Box)]
pub trait RowStore {
    /// Returns the number of stored records
    fn entry_count(&self) -> u64;

    /// Populates `record` with the projected fields of a row
    ///
    /// Fields outside the projection are left unpopulated. Rows at or past
    /// [`entry_count`](Self::entry_count) are an error.
    fn get(&mut self, row: u64, projection: Projection, record: &mut AlignmentRecord)
        -> Result<()>;
}

/// Append-only record storage
#[auto_impl(&mut, Box)]
pub trait RowSink {
    /// Appends a record and returns its row ordinal
    fn append(&mut self, record: &AlignmentRecord) -> Result<u64>;
}

/// An in-memory row store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<AlignmentRecord>,
}
impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> &[AlignmentRecord] {
        &self.records
    }
}
impl FromIterator<AlignmentRecord> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = AlignmentRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
impl RowStore for MemoryStore {
    fn entry_count(&self) -> u64 {
        self.records.len() as u64
    }

    fn get(
        &mut self,
        row: u64,
        projection: Projection,
        record: &mut AlignmentRecord,
    ) -> Result<()> {
        let stored = usize::try_from(row)
            .ok()
            .and_then(|idx| self.records.get(idx))
            .ok_or(ReadError::OutOfRange {
                requested_index: row,
                max_index: self.records.len() as u64,
            })?;
        record.clone_from(stored);
        record.retain(projection);
        Ok(())
    }
}
impl RowSink for MemoryStore {
    fn append(&mut self, record: &AlignmentRecord) -> Result<u64> {
        self.records.push(record.clone());
        Ok(self.records.len() as u64 - 1)
    }
}
